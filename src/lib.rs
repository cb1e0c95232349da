//! Turnstile: an interactive agent REPL that stops at the gate
//!
//! Every user turn is driven through a reasoning process that may suspend
//! itself when a tool call needs out-of-band authorization or a human's
//! approval. Turnstile collects those suspensions, resolves each against
//! the right mechanism, and resumes the run until it completes.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │           Session loop (REPL)           │
//! │  read line → exit? → run turn → render  │
//! └────────────────────┬────────────────────┘
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │           Turn controller               │
//! │  execute → collect → resolve → resume   │
//! └────────────────────┬────────────────────┘
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │  Classifier → resolvers                 │
//! │  authorization wait  |  y/n approval    │
//! └─────────────────────────────────────────┘
//! ```

pub mod auth;
pub mod config;
pub mod console;
pub mod decision;
pub mod harness;
pub mod interactive;
pub mod resolver;
pub mod suspension;
pub mod turn;

#[cfg(test)]
mod test_support;

// Re-exports for convenience
pub use auth::{ArcadeAuth, AuthBackend};
pub use config::Config;
pub use console::{Console, LineConsole};
pub use decision::{Decision, Resume, TurnInput};
pub use harness::{EventStream, GraphHarness, Harness, RenderedMessage, StreamEvent};
pub use interactive::{Session, SessionContext, SessionKey, TurnOutcome, TurnRecord};
pub use resolver::Resolver;
pub use suspension::{classify, Suspension, SuspensionKind};
pub use turn::{run_pass, TurnController, TurnPhase, TurnSummary};

/// Crate-level error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Harness error: {0}")]
    Harness(String),

    #[error("Authorization error: {0}")]
    Auth(String),

    #[error("Console error: {0}")]
    Console(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
