//! Turn controller
//!
//! One user turn runs as a sequence of passes. Each pass submits input to
//! the reasoning process and drains its event stream, rendering output as
//! it arrives and collecting any suspensions. If the pass suspended, every
//! suspension is resolved in order and the decisions are submitted as the
//! next pass. The turn ends with the first pass that does not suspend.

use futures::StreamExt;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::console::Console;
use crate::decision::{Resume, TurnInput};
use crate::harness::{Harness, SessionKey, StreamEvent};
use crate::resolver::Resolver;
use crate::suspension::Suspension;
use crate::Result;

/// Where a turn currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    /// Input submitted, stream being drained
    Executing,
    /// Stream ended with suspensions pending
    Collecting,
    /// Asking resolvers for decisions
    Resolving,
    /// Decisions submitted as the next pass
    Resuming,
    /// No suspensions left
    Done,
}

impl fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TurnPhase::Executing => "executing",
            TurnPhase::Collecting => "collecting",
            TurnPhase::Resolving => "resolving",
            TurnPhase::Resuming => "resuming",
            TurnPhase::Done => "done",
        };
        write!(f, "{}", name)
    }
}

/// What a finished turn went through
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnSummary {
    /// Passes submitted, the initial message included
    pub passes: usize,
    /// Resume payloads submitted, in order
    pub resumes: Vec<Resume>,
}

impl TurnSummary {
    /// Total decisions across every resume
    pub fn decision_count(&self) -> usize {
        self.resumes.iter().map(|r| r.decisions().len()).sum()
    }
}

/// Submit one input and drain the resulting stream.
///
/// Output is rendered as it arrives. Returns every suspension raised
/// during the pass, in arrival order.
pub async fn run_pass(
    harness: &dyn Harness,
    session: &SessionKey,
    input: TurnInput,
    console: &mut dyn Console,
) -> Result<Vec<Suspension>> {
    let mut stream = harness.stream(session, input).await?;
    let mut suspensions = Vec::new();

    while let Some(event) = stream.next().await {
        match event? {
            StreamEvent::Output(messages) => {
                for message in messages {
                    console.agent(&message.to_string()).await?;
                }
            }
            StreamEvent::Suspended(raised) => {
                debug!(count = raised.len(), "Pass raised suspensions");
                suspensions.extend(raised);
            }
        }
    }

    Ok(suspensions)
}

/// Drives turns against a harness, resolving suspensions as they appear
pub struct TurnController {
    harness: Arc<dyn Harness>,
    resolver: Resolver,
}

impl TurnController {
    pub fn new(harness: Arc<dyn Harness>, resolver: Resolver) -> Self {
        Self { harness, resolver }
    }

    /// Name of the underlying harness
    pub fn harness_name(&self) -> &str {
        self.harness.name()
    }

    /// Run one user message to completion.
    ///
    /// Fails only when the harness does; resolver faults become denials.
    pub async fn run_turn(
        &self,
        session: &SessionKey,
        message: &str,
        console: &mut dyn Console,
    ) -> Result<TurnSummary> {
        let mut summary = TurnSummary::default();
        let mut input = TurnInput::user(message);

        loop {
            transition(TurnPhase::Executing, &summary);
            summary.passes += 1;
            let suspensions = run_pass(self.harness.as_ref(), session, input, console).await?;

            transition(TurnPhase::Collecting, &summary);
            if suspensions.is_empty() {
                break;
            }

            transition(TurnPhase::Resolving, &summary);
            let mut decisions = Vec::with_capacity(suspensions.len());
            for suspension in &suspensions {
                decisions.push(self.resolver.resolve(suspension, console).await);
            }

            let Some(resume) = Resume::from_decisions(decisions) else {
                break;
            };
            transition(TurnPhase::Resuming, &summary);
            summary.resumes.push(resume.clone());
            input = TurnInput::Resume(resume);
        }

        transition(TurnPhase::Done, &summary);
        info!(
            passes = summary.passes,
            decisions = summary.decision_count(),
            "Turn complete"
        );
        Ok(summary)
    }
}

fn transition(phase: TurnPhase, summary: &TurnSummary) {
    debug!(%phase, pass = summary.passes, "Turn phase");
}
