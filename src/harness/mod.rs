//! Harness abstraction for the reasoning process
//!
//! A harness accepts one [`TurnInput`] for a session and hands back the
//! events the reasoning process emits for it. The stream is live: it is
//! produced incrementally, ends when the submission is finished and
//! cannot be replayed.
//!
//! Supports:
//! - LangGraph-style agent servers over HTTP + SSE ([`GraphHarness`])

mod graph;

pub use graph::GraphHarness;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;

use crate::decision::TurnInput;
use crate::suspension::Suspension;
use crate::Result;

/// Stable key for the conversation; the reasoning process checkpoints
/// its memory under it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionKey(String);

impl SessionKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Fresh random key
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A message ready to show to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedMessage {
    /// Message type as reported by the reasoning process (`ai`, `tool`, ...)
    pub role: String,
    /// Tool or author name, when present
    #[serde(default)]
    pub name: Option<String>,
    /// Display text
    pub text: String,
}

impl RenderedMessage {
    pub fn new(role: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            name: None,
            text: text.into(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl fmt::Display for RenderedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut chars = self.role.chars();
        let title: String = match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => "Message".to_string(),
        };
        match &self.name {
            Some(name) => write!(f, "{} ({}): {}", title, name, self.text),
            None => write!(f, "{}: {}", title, self.text),
        }
    }
}

/// One event from a running submission
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Messages to render, in emission order
    Output(Vec<RenderedMessage>),
    /// The run paused on one or more suspensions
    Suspended(Vec<Suspension>),
}

/// Event stream for one submission
pub type EventStream = Pin<Box<dyn futures::Stream<Item = Result<StreamEvent>> + Send>>;

/// Core harness trait
#[async_trait]
pub trait Harness: Send + Sync {
    /// Name of this harness
    fn name(&self) -> &str;

    /// Submit input for a session and get the live event stream
    async fn stream(&self, session: &SessionKey, input: TurnInput) -> Result<EventStream>;
}
