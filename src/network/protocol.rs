//! Protocol Messages
//!
//! Wire format for participant-coordinator traffic over WebSocket. All
//! messages are JSON with an internal `type` tag. Session ids travel as hex
//! strings for JSON friendliness and are decoded back to bytes at the
//! boundary.

use serde::{Serialize, Deserialize};

use crate::core::clock::{ClockSnapshot, Side, TimeControl};
use crate::game::rules::{Action, StateBlob};
use crate::game::session::{ActionError, SessionId, SessionUpdate, TerminalInfo, TerminalKind};

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from participant to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Request pairing under a time control.
    Join(JoinRequest),

    /// Submit an action to a live session.
    Action(ActionRequest),

    /// Withdraw a pending join request.
    CancelJoin,

    /// Ping for latency measurement; clients need RTT to interpolate the
    /// countdown display between authoritative clock snapshots.
    Ping {
        /// Client timestamp, echoed back verbatim.
        timestamp: u64,
    },
}

/// Pairing request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRequest {
    /// Starting time per side, in seconds.
    pub base_secs: u64,
    /// Seconds credited after each completed turn.
    pub increment_secs: u64,
}

impl JoinRequest {
    /// The requested control.
    pub fn control(&self) -> TimeControl {
        TimeControl::new(self.base_secs, self.increment_secs)
    }
}

/// Action submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRequest {
    /// Target session (hex string of the 16-byte id).
    pub session_id: String,
    /// The proposed action, opaque to the coordinator.
    pub action: Action,
}

impl ActionRequest {
    /// Decode the session id from hex.
    pub fn session_id_bytes(&self) -> Option<SessionId> {
        let bytes = hex::decode(&self.session_id).ok()?;
        if bytes.len() != 16 {
            return None;
        }
        let mut arr = [0u8; 16];
        arr.copy_from_slice(&bytes);
        Some(arr)
    }
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Queued; no compatible opponent yet.
    Waiting,

    /// Paired into a session.
    Paired(PairedInfo),

    /// Authoritative session update, sent to both sides.
    Update(UpdateInfo),

    /// Request refused. Sent only to the offending connection.
    Rejected(Rejection),

    /// The opponent's connection dropped; the session is over.
    OpponentLeft {
        /// Session that ended (hex string).
        session_id: String,
    },

    /// Pending join withdrawn as requested.
    Cancelled,

    /// Pong response.
    Pong {
        /// Client timestamp from the ping.
        timestamp: u64,
        /// Server wall-clock milliseconds since the epoch.
        server_time: u64,
    },

    /// Server is shutting down.
    Shutdown {
        /// Why.
        reason: String,
    },
}

/// Everything a participant needs to start a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairedInfo {
    /// Session identifier (hex string).
    pub session_id: String,
    /// The side this participant was assigned.
    pub side: Side,
    /// Initial authoritative state.
    pub state: StateBlob,
    /// Initial clock values.
    pub clock: ClockSnapshot,
}

/// Authoritative state broadcast after an accepted action or a timeout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateInfo {
    /// Session identifier (hex string).
    pub session_id: String,
    /// Authoritative state after the event.
    pub state: StateBlob,
    /// The applied action; absent for timeout updates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    /// Clock values after the event.
    pub clock: ClockSnapshot,
    /// Present iff this update ends the session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal: Option<TerminalNotice>,
}

impl UpdateInfo {
    /// Build the wire view of a session update.
    pub fn from_update(update: &SessionUpdate) -> Self {
        Self {
            session_id: hex::encode(update.session_id),
            state: update.state.clone(),
            action: update.action.clone(),
            clock: update.clock,
            terminal: update.terminal.map(TerminalNotice::from_info),
        }
    }
}

/// Terminal outcome on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalNotice {
    /// What ended the session.
    pub reason: TerminalReason,
    /// Winning side; absent for draws.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<Side>,
}

impl TerminalNotice {
    /// Wire view of a terminal outcome.
    pub fn from_info(info: TerminalInfo) -> Self {
        Self {
            reason: match info.kind {
                TerminalKind::Win => TerminalReason::Win,
                TerminalKind::Draw => TerminalReason::Draw,
                TerminalKind::Timeout => TerminalReason::Timeout,
            },
            winner: info.winner,
        }
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalReason {
    /// The rules declared a winner.
    Win,
    /// The rules declared a draw.
    Draw,
    /// The side to move exhausted its clock.
    Timeout,
}

/// Refusal sent to the requester only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rejection {
    /// Machine-readable reason.
    pub code: RejectCode,
    /// Human-readable message.
    pub message: String,
}

impl Rejection {
    /// Build a rejection.
    pub fn new(code: RejectCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Wire view of an action refusal.
    pub fn from_action_error(err: &ActionError) -> Self {
        let code = match err {
            ActionError::NotInSession => RejectCode::NotInSession,
            ActionError::NoSuchSession => RejectCode::NoSuchSession,
            ActionError::OutOfTurn => RejectCode::OutOfTurn,
            ActionError::IllegalAction(_) => RejectCode::IllegalAction,
        };
        Self::new(code, err.to_string())
    }
}

/// Refusal codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectCode {
    /// Requester is not seated in the target session.
    NotInSession,
    /// No live session under that id.
    NoSuchSession,
    /// It is the other side's turn.
    OutOfTurn,
    /// The rules refused the action.
    IllegalAction,
    /// Join refused: the requester is already seated in a live session.
    AlreadyInSession,
    /// Join refused: unusable time control.
    InvalidControl,
    /// Unparseable or ill-formed message.
    Malformed,
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
