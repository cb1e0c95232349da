//! Interactive session system
//!
//! The REPL around the turn controller: one conversation key per
//! session, a bounded turn history, and exit on keyword or closed input.

pub mod session;

pub use crate::harness::SessionKey;
pub use session::{Session, SessionContext, TurnOutcome, TurnRecord, INPUT_PROMPT};
