//! Session Lifecycle and Turn Arbitration
//!
//! A `Session` owns the authoritative state for one paired interaction: the
//! opaque state blob, the countdown clock, and the two seated participants.
//! `submit_action` is the only mutation entry point and checks in a fixed
//! order: membership, clock expiry, turn ownership, rules legality. An
//! exhausted clock preempts everything else, including submissions from the
//! side not on the clock.
//!
//! A session never latches a terminal flag of its own. Terminal outcomes are
//! reported in the returned update and the registry removes the session under
//! the same lock, which is what makes terminal states absorbing.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::core::clock::{Clock, ClockSnapshot, Side, TimeControl};
use crate::game::rules::{Action, RulesAdapter, StateBlob, TerminalStatus};

/// Unique session identifier (16 random bytes, collision-checked against the
/// live registry at creation).
pub type SessionId = [u8; 16];

/// Connection-scoped participant identity (UUID as bytes).
///
/// One id per connection for its lifetime; a new connection is a new
/// participant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ParticipantId(pub [u8; 16]);

impl ParticipantId {
    /// Create from raw bytes.
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Fresh random identity for a new connection.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().into_bytes())
    }
}

/// Why an action submission was refused.
///
/// Every variant is recoverable and requester-local: nothing is mutated and
/// only the offending connection hears about it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    /// Requester is not seated in this session.
    #[error("not a participant in this session")]
    NotInSession,

    /// No live session under that id (ended or never existed).
    #[error("no such session")]
    NoSuchSession,

    /// It is the other side's turn.
    #[error("not your turn")]
    OutOfTurn,

    /// The rules refused the action.
    #[error("illegal action: {0}")]
    IllegalAction(String),
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalKind {
    /// The rules declared a winner.
    Win,
    /// The rules declared a draw.
    Draw,
    /// The side to move exhausted its clock.
    Timeout,
}

/// Terminal outcome attached to a session's final update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalInfo {
    /// What ended the session.
    pub kind: TerminalKind,
    /// Winning side; `None` for draws.
    pub winner: Option<Side>,
}

/// Broadcast-worthy result of an accepted submission or a detected timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUpdate {
    /// Session this update belongs to.
    pub session_id: SessionId,
    /// Authoritative state after the event.
    pub state: StateBlob,
    /// The applied action; `None` when the event is a timeout.
    pub action: Option<Action>,
    /// Clock values after the event.
    pub clock: ClockSnapshot,
    /// Set iff this update ends the session.
    pub terminal: Option<TerminalInfo>,
}

impl SessionUpdate {
    /// Whether this update ends the session.
    pub fn is_terminal(&self) -> bool {
        self.terminal.is_some()
    }
}

/// One paired, turn-based interaction between two participants.
pub struct Session {
    /// Unique identifier, generated at pairing.
    pub id: SessionId,
    /// When the pairing was created.
    pub created_at: DateTime<Utc>,
    /// Seated participant per side, indexed by `Side` discriminant.
    seats: [ParticipantId; 2],
    /// Authoritative state; replaced only by `submit_action`.
    state: StateBlob,
    /// Countdown clock for both sides.
    clock: Clock,
    /// Rules capability, shared across sessions.
    rules: Arc<dyn RulesAdapter>,
}

impl Session {
    /// Create a session for a fresh pairing.
    ///
    /// The state starts at the rules' initial position and the clock starts
    /// running against whichever side the rules say moves first.
    pub fn new(
        id: SessionId,
        first: ParticipantId,
        second: ParticipantId,
        control: TimeControl,
        rules: Arc<dyn RulesAdapter>,
        now: Instant,
    ) -> Self {
        let state = rules.initial_state(control);
        let first_to_move = rules.side_to_move(&state);

        Self {
            id,
            created_at: Utc::now(),
            seats: [first, second],
            state,
            clock: Clock::new(control, first_to_move, now),
            rules,
        }
    }

    /// The side a participant is seated on, if any.
    pub fn side_of(&self, participant: ParticipantId) -> Option<Side> {
        if self.seats[Side::First as usize] == participant {
            Some(Side::First)
        } else if self.seats[Side::Second as usize] == participant {
            Some(Side::Second)
        } else {
            None
        }
    }

    /// The participant seated on a side.
    pub fn participant_on(&self, side: Side) -> ParticipantId {
        self.seats[side as usize]
    }

    /// Both seated participants, first side then second.
    pub fn participants(&self) -> [ParticipantId; 2] {
        self.seats
    }

    /// Whether a participant is seated in this session.
    pub fn contains(&self, participant: ParticipantId) -> bool {
        self.side_of(participant).is_some()
    }

    /// The other seat's participant, if the given one is seated here.
    pub fn opponent_of(&self, participant: ParticipantId) -> Option<ParticipantId> {
        self.side_of(participant)
            .map(|side| self.seats[side.opponent() as usize])
    }

    /// Authoritative state.
    pub fn state(&self) -> &StateBlob {
        &self.state
    }

    /// Current clock values.
    pub fn clock_snapshot(&self) -> ClockSnapshot {
        self.clock.snapshot()
    }

    /// The only mutation entry point.
    ///
    /// Check order: requester membership, then clock expiry, then turn
    /// ownership, then rules legality. The expiry check runs first because a
    /// dead clock ends the session no matter who asked or what they asked
    /// for; the settle it performs charges only genuinely elapsed time
    /// (floored, so partial seconds stay with the mover) and applies no
    /// increment and no turn flip on any rejection path.
    ///
    /// A returned update with `terminal` set obliges the caller to remove the
    /// session from the registry before releasing the lock.
    pub fn submit_action(
        &mut self,
        requester: ParticipantId,
        action: &Action,
        now: Instant,
    ) -> Result<SessionUpdate, ActionError> {
        let requester_side = self.side_of(requester).ok_or(ActionError::NotInSession)?;

        self.clock.settle(now);
        let to_move = self.rules.side_to_move(&self.state);
        if self.clock.is_expired(to_move) {
            return Ok(SessionUpdate {
                session_id: self.id,
                state: self.state.clone(),
                action: None,
                clock: self.clock.snapshot(),
                terminal: Some(TerminalInfo {
                    kind: TerminalKind::Timeout,
                    winner: Some(to_move.opponent()),
                }),
            });
        }

        if requester_side != to_move {
            return Err(ActionError::OutOfTurn);
        }

        let next = self
            .rules
            .apply(&self.state, action)
            .map_err(|violation| ActionError::IllegalAction(violation.reason))?;

        self.state = next;
        self.clock.complete_turn(requester_side, now);

        let terminal = match self.rules.terminal_status(&self.state) {
            TerminalStatus::NotTerminal => None,
            TerminalStatus::Win(side) => Some(TerminalInfo {
                kind: TerminalKind::Win,
                winner: Some(side),
            }),
            TerminalStatus::Draw => Some(TerminalInfo {
                kind: TerminalKind::Draw,
                winner: None,
            }),
        };

        Ok(SessionUpdate {
            session_id: self.id,
            state: self.state.clone(),
            action: Some(action.clone()),
            clock: self.clock.snapshot(),
            terminal,
        })
    }
}
