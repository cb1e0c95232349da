//! Decisions and the inputs submitted to the reasoning process

use serde::{Deserialize, Serialize};

/// Answer to a single suspension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub authorized: bool,
}

impl Decision {
    pub const fn allow() -> Self {
        Self { authorized: true }
    }

    pub const fn deny() -> Self {
        Self { authorized: false }
    }
}

impl From<bool> for Decision {
    fn from(authorized: bool) -> Self {
        Self { authorized }
    }
}

/// Resumption payload for a suspended run.
///
/// The shape is part of the contract with the reasoning process: one
/// pending suspension is answered with a bare decision, several with an
/// ordered list. Serializes untagged, so `Single` is `{"authorized": ..}`
/// and `Many` is `[{"authorized": ..}, ..]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Resume {
    Single(Decision),
    Many(Vec<Decision>),
}

impl Resume {
    /// Build the payload for one pass worth of decisions, in suspension
    /// order. Returns `None` when there is nothing to resume.
    pub fn from_decisions(mut decisions: Vec<Decision>) -> Option<Self> {
        match decisions.len() {
            0 => None,
            1 => decisions.pop().map(Resume::Single),
            _ => Some(Resume::Many(decisions)),
        }
    }

    /// Decisions in submission order
    pub fn decisions(&self) -> &[Decision] {
        match self {
            Resume::Single(d) => std::slice::from_ref(d),
            Resume::Many(ds) => ds,
        }
    }
}

/// One submission to the reasoning process
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnInput {
    /// A fresh conversational message
    Message { role: String, content: String },
    /// Continue a suspended run
    Resume(Resume),
}

impl TurnInput {
    /// A message from the user
    pub fn user(content: impl Into<String>) -> Self {
        TurnInput::Message {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn is_resume(&self) -> bool {
        matches!(self, TurnInput::Resume(_))
    }
}
