//! Rules Adapter Boundary
//!
//! The coordinator never interprets session state or actions itself. A
//! `RulesAdapter` decides which side acts next, whether a proposed action is
//! legal, what the successor state is, and whether a state ends the session.
//! Two in-tree adapters satisfy the boundary: `FreePlay` accepts every action
//! and alternates turns (wiring/demo stand-in for a real rules engine), and
//! `ScriptedRules` lets tests trigger rejections and terminal outcomes from
//! markers on the submitted action.

use serde::{Deserialize, Serialize};

use crate::core::clock::{Side, TimeControl};

// =============================================================================
// Boundary Types
// =============================================================================

/// Opaque, transport-safe session state.
///
/// The coordinator stores and broadcasts it verbatim; only the rules adapter
/// reads its contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateBlob(pub String);

impl StateBlob {
    /// Wrap a textual state value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the raw text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One proposed action: source and destination locations plus an optional
/// promotion/choice tag. Opaque to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    /// Source location.
    pub from: String,
    /// Destination location.
    pub to: String,
    /// Optional promotion/choice tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promotion: Option<String>,
}

impl Action {
    /// Build a plain action with no promotion tag.
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            promotion: None,
        }
    }
}

/// Why the rules refused an action.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct RuleViolation {
    /// Human-readable refusal reason, relayed to the requester.
    pub reason: String,
}

impl RuleViolation {
    /// Build a violation from a reason string.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Terminal query result for a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalStatus {
    /// The session continues.
    NotTerminal,
    /// The given side has won.
    Win(Side),
    /// Drawn outcome, neither side wins.
    Draw,
}

/// External capability deciding action legality and terminal status.
///
/// Implementations must be stateless with respect to sessions: all session
/// state lives in the `StateBlob`, so one adapter instance serves every
/// session concurrently.
pub trait RulesAdapter: Send + Sync {
    /// Starting state for a fresh session under `control`.
    fn initial_state(&self, control: TimeControl) -> StateBlob;

    /// Which side must act next from `state`.
    fn side_to_move(&self, state: &StateBlob) -> Side;

    /// Validate `action` against `state`, producing the successor state.
    fn apply(&self, state: &StateBlob, action: &Action) -> Result<StateBlob, RuleViolation>;

    /// Whether `state` ends the session, and how.
    fn terminal_status(&self, state: &StateBlob) -> TerminalStatus;
}

// =============================================================================
// Shared Blob Encoding
// =============================================================================

// Both in-tree adapters encode the side to move as a blob prefix:
// "first:<n>" / "second:<n>" where n counts applied actions.

fn side_of(blob: &StateBlob) -> Side {
    if blob.as_str().starts_with("second") {
        Side::Second
    } else {
        Side::First
    }
}

fn turn_count(blob: &StateBlob) -> u64 {
    blob.as_str()
        .split_once(':')
        .and_then(|(_, n)| n.parse().ok())
        .unwrap_or(0)
}

fn turn_blob(side: Side, count: u64) -> StateBlob {
    let label = match side {
        Side::First => "first",
        Side::Second => "second",
    };
    StateBlob::new(format!("{label}:{count}"))
}

// =============================================================================
// FreePlay
// =============================================================================

/// Pass-through adapter: every action is legal, turns alternate starting
/// with `First`, and no state is ever terminal. Sessions under it end only
/// by timeout or disconnect.
#[derive(Debug, Default, Clone, Copy)]
pub struct FreePlay;

impl RulesAdapter for FreePlay {
    fn initial_state(&self, _control: TimeControl) -> StateBlob {
        turn_blob(Side::First, 0)
    }

    fn side_to_move(&self, state: &StateBlob) -> Side {
        side_of(state)
    }

    fn apply(&self, state: &StateBlob, _action: &Action) -> Result<StateBlob, RuleViolation> {
        Ok(turn_blob(side_of(state).opponent(), turn_count(state) + 1))
    }

    fn terminal_status(&self, _state: &StateBlob) -> TerminalStatus {
        TerminalStatus::NotTerminal
    }
}

// =============================================================================
// ScriptedRules
// =============================================================================

/// Test double driven by markers on the submitted action:
///
/// - destination `"reject"`: the action is refused
/// - promotion `"win"`: the resulting state is a win for the mover
/// - promotion `"draw"`: the resulting state is a draw
/// - anything else behaves like `FreePlay`
///
/// Keeps lifecycle and concurrency tests independent of any real rule set.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScriptedRules;

impl RulesAdapter for ScriptedRules {
    fn initial_state(&self, _control: TimeControl) -> StateBlob {
        turn_blob(Side::First, 0)
    }

    fn side_to_move(&self, state: &StateBlob) -> Side {
        side_of(state)
    }

    fn apply(&self, state: &StateBlob, action: &Action) -> Result<StateBlob, RuleViolation> {
        if action.to == "reject" {
            return Err(RuleViolation::new("scripted rejection"));
        }

        let mover = side_of(state);
        match action.promotion.as_deref() {
            Some("win") => Ok(StateBlob::new(match mover {
                Side::First => "won:first",
                Side::Second => "won:second",
            })),
            Some("draw") => Ok(StateBlob::new("drawn")),
            _ => Ok(turn_blob(mover.opponent(), turn_count(state) + 1)),
        }
    }

    fn terminal_status(&self, state: &StateBlob) -> TerminalStatus {
        match state.as_str() {
            "won:first" => TerminalStatus::Win(Side::First),
            "won:second" => TerminalStatus::Win(Side::Second),
            "drawn" => TerminalStatus::Draw,
            _ => TerminalStatus::NotTerminal,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
