//! Game Logic Module
//!
//! Session lifecycle, pairing, and rule arbitration. Nothing in here touches
//! the network; the coordinator drives these types from behind its lock.
//!
//! ## Module Structure
//!
//! - `rules`: pluggable rules boundary, opaque state blobs, actions
//! - `session`: one live session, its clocks, and the action entry point
//! - `matchmaker`: pairing queue keyed on exact time control

pub mod rules;
pub mod session;
pub mod matchmaker;

// Re-export key types
pub use rules::{Action, FreePlay, RuleViolation, RulesAdapter, ScriptedRules, StateBlob, TerminalStatus};
pub use session::{ActionError, ParticipantId, Session, SessionId, SessionUpdate, TerminalInfo, TerminalKind};
pub use matchmaker::{JoinOutcome, Matchmaker, PendingJoin};
