//! Configuration-Matched Pairing Queue
//!
//! Participants wait here until another participant requests the exact same
//! time control. Pairing scans in arrival order and matches on strict
//! equality, never widening to a nearby control. Entries do not expire; a
//! queued participant leaves only by pairing, cancelling, or disconnecting.
//!
//! The queue has no lock of its own. The coordinator mutates it under the
//! same lock that guards the session registry, which is what makes a join
//! atomic: a matched participant can never be observed both queued and
//! seated.

use crate::core::clock::TimeControl;
use crate::game::session::ParticipantId;

/// One participant awaiting a compatible opponent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingJoin {
    /// Who is waiting.
    pub participant: ParticipantId,
    /// The control they will accept, exactly.
    pub control: TimeControl,
}

/// Result of a join request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// No compatible opponent yet; the request is queued.
    Waiting,
    /// Paired with an earlier-waiting participant under the same control.
    Matched {
        /// The participant removed from the queue to form the pair.
        opponent: ParticipantId,
    },
}

/// Queue of pending joins, paired on exact control equality.
#[derive(Debug, Default)]
pub struct Matchmaker {
    queue: Vec<PendingJoin>,
}

impl Matchmaker {
    /// Empty queue.
    pub fn new() -> Self {
        Self { queue: Vec::new() }
    }

    /// Queue a participant or pair them with the first compatible waiter.
    ///
    /// A repeated join from the same participant replaces their earlier
    /// request instead of duplicating it, so a participant occupies at most
    /// one slot and can never pair with themselves.
    pub fn request_join(&mut self, participant: ParticipantId, control: TimeControl) -> JoinOutcome {
        self.queue.retain(|entry| entry.participant != participant);

        if let Some(pos) = self.queue.iter().position(|entry| entry.control == control) {
            let opponent = self.queue.remove(pos).participant;
            return JoinOutcome::Matched { opponent };
        }

        self.queue.push(PendingJoin { participant, control });
        JoinOutcome::Waiting
    }

    /// Remove a pending request. Returns whether one was present.
    pub fn cancel(&mut self, participant: ParticipantId) -> bool {
        let before = self.queue.len();
        self.queue.retain(|entry| entry.participant != participant);
        self.queue.len() != before
    }

    /// Whether a participant is currently queued.
    pub fn contains(&self, participant: ParticipantId) -> bool {
        self.queue.iter().any(|entry| entry.participant == participant)
    }

    /// Number of queued participants.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
