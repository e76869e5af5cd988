//! Session Clocks
//!
//! Per-session countdown clocks with post-move increments.
//! Pure time accounting with no I/O and no timers. Callers pass `Instant`s
//! in, which keeps every code path driveable from tests without sleeping.
//!
//! ## Accounting model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  remaining[First]   seconds left for the first side          │
//! │  remaining[Second]  seconds left for the second side         │
//! │  running            whose time is currently being spent      │
//! │  last_event         when time was last charged               │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Whole seconds only. Fractional elapsed time is floor-truncated, which
//! always favors the player on the clock; a side is expired only when its
//! remaining time is exactly zero (values are clamped, never negative).

use std::time::Instant;

use serde::{Serialize, Deserialize};

// =============================================================================
// SIDE
// =============================================================================

/// One of the two seats in a session.
///
/// Sides are assigned uniformly at random at pairing time, independent of
/// join order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// The seat that moves first in the rules' initial state.
    First = 0,
    /// The other seat.
    Second = 1,
}

impl Side {
    /// The opposing seat.
    #[inline]
    pub fn opponent(self) -> Side {
        match self {
            Side::First => Side::Second,
            Side::Second => Side::First,
        }
    }

    #[inline]
    fn index(self) -> usize {
        self as usize
    }
}

// =============================================================================
// TIME CONTROL
// =============================================================================

/// The base-time/increment pair a participant requests.
///
/// Two controls are compatible for pairing iff they are equal: exact match
/// on every field, no range widening.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeControl {
    /// Starting time per side, in seconds. Must be at least 1.
    pub base_secs: u64,
    /// Seconds credited to a side after each of its completed turns.
    pub increment_secs: u64,
}

impl TimeControl {
    /// Create a time control.
    pub const fn new(base_secs: u64, increment_secs: u64) -> Self {
        Self { base_secs, increment_secs }
    }

    /// A control is usable only with a non-zero base.
    pub fn is_valid(&self) -> bool {
        self.base_secs >= 1
    }
}

// =============================================================================
// CLOCK
// =============================================================================

/// Two countdown clocks sharing one accounting mark.
///
/// At most one side's remaining time decreases at any moment. The clock is
/// owned by exactly one session and mutated only through that session's
/// action handling.
#[derive(Clone, Debug)]
pub struct Clock {
    /// Remaining whole seconds, indexed by [`Side`].
    remaining: [u64; 2],
    /// The side currently spending time.
    running: Option<Side>,
    /// When time was last charged or credited.
    last_event: Instant,
    /// Post-turn credit in seconds.
    increment_secs: u64,
}

impl Clock {
    /// Start a clock for a fresh session: both sides at the base time, the
    /// first mover's time already running.
    pub fn new(control: TimeControl, first_to_move: Side, now: Instant) -> Self {
        Self {
            remaining: [control.base_secs, control.base_secs],
            running: Some(first_to_move),
            last_event: now,
            increment_secs: control.increment_secs,
        }
    }

    /// Whole seconds elapsed since the last accounting mark.
    ///
    /// Floored, and zero if `now` is not after the mark.
    pub fn elapsed_since(&self, now: Instant) -> u64 {
        now.saturating_duration_since(self.last_event).as_secs()
    }

    /// Charge elapsed time to the running side and advance the mark.
    ///
    /// Remaining time clamps at zero. Calling twice with the same `now` is
    /// idempotent: the second call sees zero elapsed. The mark only moves
    /// forward; a `now` earlier than the mark charges nothing and leaves the
    /// mark in place, so callers racing with out-of-order readings cannot
    /// re-charge a span an earlier settle already covered.
    pub fn settle(&mut self, now: Instant) {
        if let Some(side) = self.running {
            let elapsed = self.elapsed_since(now);
            let slot = &mut self.remaining[side.index()];
            *slot = slot.saturating_sub(elapsed);
        }
        self.last_event = self.last_event.max(now);
    }

    /// True when a side has exactly exhausted its time.
    pub fn is_expired(&self, side: Side) -> bool {
        self.remaining[side.index()] == 0
    }

    /// Close out a turn: settle, credit the mover's increment, hand the
    /// running clock to the opponent.
    ///
    /// The credit saturates at `u64::MAX` rather than overflowing, so any
    /// increment a control carries stays playable.
    pub fn complete_turn(&mut self, mover: Side, now: Instant) {
        self.settle(now);
        let slot = &mut self.remaining[mover.index()];
        *slot = slot.saturating_add(self.increment_secs);
        self.running = Some(mover.opponent());
    }

    /// Remaining whole seconds for a side, as of the last settle.
    pub fn remaining(&self, side: Side) -> u64 {
        self.remaining[side.index()]
    }

    /// The side currently on the clock.
    pub fn running(&self) -> Option<Side> {
        self.running
    }

    /// Wire-ready view of the clock.
    pub fn snapshot(&self) -> ClockSnapshot {
        ClockSnapshot {
            first_secs: self.remaining[Side::First.index()],
            second_secs: self.remaining[Side::Second.index()],
            running: self.running,
        }
    }
}

/// Point-in-time clock values broadcast to participants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockSnapshot {
    /// Remaining seconds for the first side.
    pub first_secs: u64,
    /// Remaining seconds for the second side.
    pub second_secs: u64,
    /// The side whose time is running, if any.
    pub running: Option<Side>,
}
