//! Interactive session controller
//!
//! Reads user lines, runs each one as a turn, and keeps going until the
//! user types the exit keyword or closes input.

use chrono::{DateTime, Utc};
use tracing::{debug, error, info};

use crate::config::Config;
use crate::console::{green, red, Console};
use crate::harness::SessionKey;
use crate::turn::TurnController;
use crate::Result;

/// Prompt shown when waiting for a user message
pub const INPUT_PROMPT: &str = "> ";

/// History kept per session before old turns are dropped
const MAX_HISTORY: usize = 1000;

/// How a turn ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed,
    Failed(String),
}

/// A turn as remembered by the session
#[derive(Debug, Clone)]
pub struct TurnRecord {
    /// User message that started the turn
    pub input: String,
    /// When the turn started
    pub started_at: DateTime<Utc>,
    /// Passes submitted
    pub passes: usize,
    /// Decisions submitted across all resumes
    pub decisions: usize,
    pub outcome: TurnOutcome,
}

/// State that lives as long as the session
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// Conversation key, fixed for the whole session
    pub key: SessionKey,
    /// Finished turns, oldest first
    pub history: Vec<TurnRecord>,
}

impl SessionContext {
    pub fn new(key: SessionKey) -> Self {
        Self {
            key,
            history: Vec::new(),
        }
    }

    /// Add a finished turn
    pub fn record(&mut self, record: TurnRecord) {
        self.history.push(record);

        // Keep history bounded
        if self.history.len() > MAX_HISTORY {
            self.history.drain(0..100);
        }
    }
}

/// Interactive session
pub struct Session<C: Console> {
    controller: TurnController,
    console: C,
    context: SessionContext,
    exit_keyword: String,
}

impl<C: Console> Session<C> {
    /// Create a new session. Uses the configured session id if there is
    /// one, otherwise a fresh key.
    pub fn new(config: &Config, controller: TurnController, console: C) -> Self {
        let key = config
            .session_id
            .as_deref()
            .map(SessionKey::new)
            .unwrap_or_else(SessionKey::generate);

        Self {
            controller,
            console,
            context: SessionContext::new(key),
            exit_keyword: config.exit_keyword.clone(),
        }
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn console(&self) -> &C {
        &self.console
    }

    /// True if the line asks to end the session
    pub fn is_exit(&self, line: &str) -> bool {
        line.to_lowercase() == self.exit_keyword.to_lowercase()
    }

    /// Run the interactive session
    pub async fn run(&mut self) -> Result<()> {
        info!(
            session = %self.context.key,
            harness = self.controller.harness_name(),
            "Starting interactive session"
        );
        self.print_welcome().await?;

        loop {
            let Some(line) = self.console.read_line(INPUT_PROMPT).await? else {
                debug!("Input closed");
                break;
            };

            if self.is_exit(&line) {
                break;
            }
            if line.trim().is_empty() {
                continue;
            }

            self.handle_turn(&line).await?;
        }

        self.console.write_line(&red("👋 Bye...")).await?;
        info!(turns = self.context.history.len(), "Session ended");
        Ok(())
    }

    /// Run one turn. A failed turn is reported and recorded; it does not
    /// end the session.
    async fn handle_turn(&mut self, input: &str) -> Result<()> {
        let started_at = Utc::now();
        let result = self
            .controller
            .run_turn(&self.context.key, input, &mut self.console)
            .await;

        let record = match result {
            Ok(summary) => TurnRecord {
                input: input.to_string(),
                started_at,
                passes: summary.passes,
                decisions: summary.decision_count(),
                outcome: TurnOutcome::Completed,
            },
            Err(e) => {
                error!("Turn failed: {}", e);
                self.console.write_line(&format!("Error: {}", e)).await?;
                TurnRecord {
                    input: input.to_string(),
                    started_at,
                    passes: 0,
                    decisions: 0,
                    outcome: TurnOutcome::Failed(e.to_string()),
                }
            }
        };

        self.context.record(record);
        Ok(())
    }

    async fn print_welcome(&mut self) -> Result<()> {
        let welcome = format!(
            "Welcome to the chatbot! Type '{}' to quit.",
            self.exit_keyword
        );
        self.console.write_line(&green(&welcome)).await
    }
}
