//! Session Coordination and Event Routing
//!
//! One `Coordinator` owns every piece of mutable state in the process and is
//! the single serialization point for all of it:
//!
//! ```text
//!   connection tasks ───► on_join / on_action / on_cancel / on_disconnect
//!                                        │
//!                              one tokio::sync::Mutex
//!                                        │
//!                 ┌──────────────────────┼──────────────────────┐
//!                 ▼                      ▼                      ▼
//!           Matchmaker        sessions: HashMap<id, Session>  SessionRng
//!                 │                      │
//!                 └──────────┬───────────┘
//!                            ▼  synchronous, non-blocking sends
//!                  outboxes: HashMap<ParticipantId, UnboundedSender>
//! ```
//!
//! Every handler runs start to finish inside one lock acquisition with no
//! await points: the rules call is pure CPU and outbound delivery is an
//! unbounded channel send, so a slow socket can never stall the lock.
//! Writing to both outboxes inside the same critical section that performed
//! the mutation is what gives both participants the same update order.
//!
//! Terminal outcomes remove the session from the registry under that same
//! lock, so a terminal session is unreachable before any later event can be
//! routed to it and every later reference is answered with `no_such_session`.
//!
//! Clock expiry is detected lazily, at the next action submitted to the
//! session. A session whose clock ran out but which never receives another
//! action stays registered indefinitely; there is no background sweep.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

use crate::core::clock::{Side, TimeControl};
use crate::core::rng::SessionRng;
use crate::game::matchmaker::{JoinOutcome, Matchmaker};
use crate::game::rules::{Action, RulesAdapter};
use crate::game::session::{ActionError, ParticipantId, Session, SessionId};
use crate::network::protocol::{PairedInfo, RejectCode, Rejection, ServerMessage, UpdateInfo};

/// Everything the coordinator guards with its one lock.
struct CoordinatorState {
    /// Live sessions, owned directly.
    sessions: HashMap<SessionId, Session>,
    /// Participants awaiting pairing.
    matchmaker: Matchmaker,
    /// Outbound channel per connected participant.
    outboxes: HashMap<ParticipantId, mpsc::UnboundedSender<ServerMessage>>,
    /// Source for session ids and side assignment.
    rng: SessionRng,
}

/// Process-wide registry, matchmaker and router.
///
/// Constructed once in `main` and handed to every connection task via `Arc`.
pub struct Coordinator {
    state: Mutex<CoordinatorState>,
    rules: Arc<dyn RulesAdapter>,
}

impl Coordinator {
    /// Create a coordinator with an empty registry and queue.
    pub fn new(rules: Arc<dyn RulesAdapter>, rng: SessionRng) -> Self {
        Self {
            state: Mutex::new(CoordinatorState {
                sessions: HashMap::new(),
                matchmaker: Matchmaker::new(),
                outboxes: HashMap::new(),
                rng,
            }),
            rules,
        }
    }

    /// Register a participant's outbound channel.
    ///
    /// The returned receiver is drained by the connection's writer task.
    /// Everything the coordinator ever tells this participant flows through
    /// it.
    pub async fn attach(&self, participant: ParticipantId) -> mpsc::UnboundedReceiver<ServerMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock().await;
        state.outboxes.insert(participant, tx);
        rx
    }

    /// Handle a join request: queue the participant or pair them.
    pub async fn on_join(&self, participant: ParticipantId, control: TimeControl, now: Instant) {
        let mut state = self.state.lock().await;

        if !control.is_valid() {
            Self::send_to(
                &state,
                participant,
                ServerMessage::Rejected(Rejection::new(
                    RejectCode::InvalidControl,
                    "base time must be at least 1 second",
                )),
            );
            return;
        }

        // A seated participant can never occupy the queue as well.
        if state.sessions.values().any(|s| s.contains(participant)) {
            Self::send_to(
                &state,
                participant,
                ServerMessage::Rejected(Rejection::new(
                    RejectCode::AlreadyInSession,
                    "finish or leave the current session first",
                )),
            );
            return;
        }

        match state.matchmaker.request_join(participant, control) {
            JoinOutcome::Waiting => {
                debug!(
                    "Participant {} waiting for {:?}",
                    hex::encode(&participant.0[..4]),
                    control
                );
                Self::send_to(&state, participant, ServerMessage::Waiting);
            }
            JoinOutcome::Matched { opponent } => {
                let id = Self::fresh_session_id(&mut state);
                let (first, second) = if state.rng.coin_flip() {
                    (participant, opponent)
                } else {
                    (opponent, participant)
                };

                let session = Session::new(id, first, second, control, Arc::clone(&self.rules), now);
                let state_blob = session.state().clone();
                let clock = session.clock_snapshot();
                state.sessions.insert(id, session);

                info!(
                    "Paired {} (first) and {} (second) into session {} under {:?}",
                    hex::encode(&first.0[..4]),
                    hex::encode(&second.0[..4]),
                    hex::encode(&id[..4]),
                    control
                );

                let wire_id = hex::encode(id);
                Self::send_to(
                    &state,
                    first,
                    ServerMessage::Paired(PairedInfo {
                        session_id: wire_id.clone(),
                        side: Side::First,
                        state: state_blob.clone(),
                        clock,
                    }),
                );
                Self::send_to(
                    &state,
                    second,
                    ServerMessage::Paired(PairedInfo {
                        session_id: wire_id,
                        side: Side::Second,
                        state: state_blob,
                        clock,
                    }),
                );
            }
        }
    }

    /// Route an action to its session and fan out the result.
    ///
    /// Accepted actions and timeouts go to both sides; refusals go to the
    /// requester only.
    pub async fn on_action(
        &self,
        participant: ParticipantId,
        session_id: SessionId,
        action: &Action,
        now: Instant,
    ) {
        let mut state = self.state.lock().await;

        let result = match state.sessions.get_mut(&session_id) {
            Some(session) => session
                .submit_action(participant, action, now)
                .map(|update| (session.participants(), update)),
            None => Err(ActionError::NoSuchSession),
        };

        match result {
            Ok((pair, update)) => {
                let info = UpdateInfo::from_update(&update);
                for side_participant in pair {
                    Self::send_to(&state, side_participant, ServerMessage::Update(info.clone()));
                }

                if let Some(terminal) = update.terminal {
                    if let Some(removed) = state.sessions.remove(&session_id) {
                        let lived = (Utc::now() - removed.created_at).num_seconds();
                        info!(
                            "Session {} ended ({:?}) after {}s",
                            hex::encode(&session_id[..4]),
                            terminal.kind,
                            lived
                        );
                    }
                }
            }
            Err(err) => {
                debug!(
                    "Action from {} refused: {}",
                    hex::encode(&participant.0[..4]),
                    err
                );
                Self::send_to(
                    &state,
                    participant,
                    ServerMessage::Rejected(Rejection::from_action_error(&err)),
                );
            }
        }
    }

    /// Withdraw a pending join request. Acknowledged whether or not one was
    /// queued, so a cancel that races its own pairing is not an error.
    pub async fn on_cancel(&self, participant: ParticipantId) {
        let mut state = self.state.lock().await;

        if state.matchmaker.cancel(participant) {
            debug!("Participant {} left the queue", hex::encode(&participant.0[..4]));
        }
        Self::send_to(&state, participant, ServerMessage::Cancelled);
    }

    /// Clean up after a dropped connection.
    ///
    /// Removes the outbox, clears any queue entry, and forfeits the
    /// participant's session if one is live. Calling this twice is harmless:
    /// the second call finds nothing to clean.
    pub async fn on_disconnect(&self, participant: ParticipantId) {
        let mut state = self.state.lock().await;

        state.outboxes.remove(&participant);
        state.matchmaker.cancel(participant);

        let ended = state
            .sessions
            .iter()
            .find(|(_, session)| session.contains(participant))
            .map(|(id, _)| *id);

        if let Some(session_id) = ended {
            if let Some(removed) = state.sessions.remove(&session_id) {
                let lived = (Utc::now() - removed.created_at).num_seconds();
                info!(
                    "Session {} forfeited by disconnect of {} after {}s",
                    hex::encode(&session_id[..4]),
                    hex::encode(&participant.0[..4]),
                    lived
                );

                if let Some(opponent) = removed.opponent_of(participant) {
                    Self::send_to(
                        &state,
                        opponent,
                        ServerMessage::OpponentLeft {
                            session_id: hex::encode(session_id),
                        },
                    );
                }
            }
        }
    }

    /// Refuse a request that never reached the routing layer, such as an
    /// unparseable frame.
    pub async fn reject(&self, participant: ParticipantId, code: RejectCode, message: &str) {
        let state = self.state.lock().await;
        Self::send_to(
            &state,
            participant,
            ServerMessage::Rejected(Rejection::new(code, message)),
        );
    }

    /// Answer a ping with the echoed timestamp and our wall clock.
    pub async fn pong(&self, participant: ParticipantId, timestamp: u64) {
        let server_time = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        let state = self.state.lock().await;
        Self::send_to(
            &state,
            participant,
            ServerMessage::Pong {
                timestamp,
                server_time,
            },
        );
    }

    /// Queue a shutdown notice for every attached participant.
    ///
    /// Writer tasks drain their channels before exiting, so the notice goes
    /// out ahead of the socket close.
    pub async fn broadcast_shutdown(&self, reason: &str) {
        let state = self.state.lock().await;
        for tx in state.outboxes.values() {
            let _ = tx.send(ServerMessage::Shutdown {
                reason: reason.to_string(),
            });
        }
    }

    /// Number of live sessions.
    pub async fn session_count(&self) -> usize {
        self.state.lock().await.sessions.len()
    }

    /// Number of participants awaiting pairing.
    pub async fn queue_len(&self) -> usize {
        self.state.lock().await.matchmaker.len()
    }

    /// Number of attached connections.
    pub async fn connection_count(&self) -> usize {
        self.state.lock().await.outboxes.len()
    }

    /// Generate a session id no live session is using.
    fn fresh_session_id(state: &mut CoordinatorState) -> SessionId {
        loop {
            let id = state.rng.session_id();
            if !state.sessions.contains_key(&id) {
                return id;
            }
        }
    }

    /// Deliver a message if the participant is still attached.
    ///
    /// An unbounded send never blocks, so this is safe inside the critical
    /// section; a closed channel means the connection is already down and
    /// its disconnect cleanup will run shortly.
    fn send_to(state: &CoordinatorState, to: ParticipantId, msg: ServerMessage) {
        if let Some(tx) = state.outboxes.get(&to) {
            let _ = tx.send(msg);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::rules::ScriptedRules;
    use crate::network::protocol::TerminalReason;
    use std::time::Duration;

    const A: ParticipantId = ParticipantId::new([1; 16]);
    const B: ParticipantId = ParticipantId::new([2; 16]);
    const C: ParticipantId = ParticipantId::new([3; 16]);

    fn scripted_coordinator(seed: u64) -> Coordinator {
        Coordinator::new(Arc::new(ScriptedRules), SessionRng::from_seed(seed))
    }

    fn next_msg(rx: &mut mpsc::UnboundedReceiver<ServerMessage>) -> ServerMessage {
        rx.try_recv().expect("expected a pending message")
    }

    fn expect_paired(msg: ServerMessage) -> PairedInfo {
        match msg {
            ServerMessage::Paired(info) => info,
            other => panic!("expected paired, got {:?}", other),
        }
    }

    fn expect_update(msg: ServerMessage) -> UpdateInfo {
        match msg {
            ServerMessage::Update(info) => info,
            other => panic!("expected update, got {:?}", other),
        }
    }

    /// Pair A and B and return their receivers with the queue traffic
    /// already drained, plus the session id.
    async fn paired_pair(
        coord: &Coordinator,
        now: Instant,
    ) -> (
        mpsc::UnboundedReceiver<ServerMessage>,
        mpsc::UnboundedReceiver<ServerMessage>,
        SessionId,
        Side,
    ) {
        let mut rx_a = coord.attach(A).await;
        let mut rx_b = coord.attach(B).await;

        coord.on_join(A, TimeControl::new(300, 2), now).await;
        coord.on_join(B, TimeControl::new(300, 2), now).await;

        assert!(matches!(next_msg(&mut rx_a), ServerMessage::Waiting));
        let info_a = expect_paired(next_msg(&mut rx_a));
        let info_b = expect_paired(next_msg(&mut rx_b));

        assert_eq!(info_a.session_id, info_b.session_id);
        assert_eq!(info_a.side, info_b.side.opponent());

        let mut id = [0u8; 16];
        id.copy_from_slice(&hex::decode(&info_a.session_id).unwrap());
        (rx_a, rx_b, id, info_a.side)
    }

    #[tokio::test]
    async fn test_join_waits_until_compatible() {
        let coord = scripted_coordinator(1);
        let mut rx_a = coord.attach(A).await;
        let mut rx_b = coord.attach(B).await;
        let mut rx_c = coord.attach(C).await;
        let now = Instant::now();

        coord.on_join(A, TimeControl::new(300, 2), now).await;
        coord.on_join(B, TimeControl::new(180, 0), now).await;

        assert!(matches!(next_msg(&mut rx_a), ServerMessage::Waiting));
        assert!(matches!(next_msg(&mut rx_b), ServerMessage::Waiting));
        assert_eq!(coord.queue_len().await, 2);
        assert_eq!(coord.session_count().await, 0);

        // C matches A's control; B keeps waiting.
        coord.on_join(C, TimeControl::new(300, 2), now).await;

        let info_a = expect_paired(next_msg(&mut rx_a));
        let info_c = expect_paired(next_msg(&mut rx_c));
        assert_eq!(info_a.session_id, info_c.session_id);
        assert!(rx_b.try_recv().is_err());
        assert_eq!(coord.queue_len().await, 1);
        assert_eq!(coord.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_mismatched_controls_never_pair() {
        let coord = scripted_coordinator(2);
        let mut rx_a = coord.attach(A).await;
        let mut rx_b = coord.attach(B).await;
        let now = Instant::now();

        coord.on_join(A, TimeControl::new(180, 0), now).await;
        coord.on_join(B, TimeControl::new(180, 2), now).await;

        assert!(matches!(next_msg(&mut rx_a), ServerMessage::Waiting));
        assert!(matches!(next_msg(&mut rx_b), ServerMessage::Waiting));
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_err());
        assert_eq!(coord.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_joins_pair_exactly_once() {
        let coord = Arc::new(scripted_coordinator(3));
        let control = TimeControl::new(60, 1);

        let participants: Vec<ParticipantId> =
            (0u8..8).map(|i| ParticipantId::new([i + 10; 16])).collect();

        let mut receivers = Vec::new();
        for &p in &participants {
            receivers.push(coord.attach(p).await);
        }

        let mut handles = Vec::new();
        for &p in &participants {
            let coord = Arc::clone(&coord);
            handles.push(tokio::spawn(async move {
                coord.on_join(p, control, Instant::now()).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // Eight compatible participants form exactly four sessions and
        // leave nobody queued or unanswered.
        assert_eq!(coord.session_count().await, 4);
        assert_eq!(coord.queue_len().await, 0);

        for mut rx in receivers {
            let mut paired = 0;
            while let Ok(msg) = rx.try_recv() {
                if matches!(msg, ServerMessage::Paired(_)) {
                    paired += 1;
                }
            }
            assert_eq!(paired, 1);
        }
    }

    #[tokio::test]
    async fn test_both_side_assignments_reachable() {
        let mut seen_first = false;
        let mut seen_second = false;

        for seed in 0..32 {
            let coord = scripted_coordinator(seed);
            let mut rx_a = coord.attach(A).await;
            let mut rx_b = coord.attach(B).await;
            let now = Instant::now();

            coord.on_join(A, TimeControl::new(300, 2), now).await;
            coord.on_join(B, TimeControl::new(300, 2), now).await;

            let _waiting = next_msg(&mut rx_a);
            let info_a = expect_paired(next_msg(&mut rx_a));
            let info_b = expect_paired(next_msg(&mut rx_b));
            assert_eq!(info_a.side, info_b.side.opponent());

            match info_a.side {
                Side::First => seen_first = true,
                Side::Second => seen_second = true,
            }
        }

        assert!(seen_first, "A was never assigned first across 32 seeds");
        assert!(seen_second, "A was never assigned second across 32 seeds");
    }

    #[tokio::test]
    async fn test_updates_broadcast_to_both_in_order() {
        let coord = scripted_coordinator(4);
        let now = Instant::now();
        let (mut rx_a, mut rx_b, id, side_a) = paired_pair(&coord, now).await;

        let (first, second) = if side_a == Side::First { (A, B) } else { (B, A) };

        coord.on_action(first, id, &Action::new("a", "b"), now).await;
        coord.on_action(second, id, &Action::new("b", "c"), now).await;

        for rx in [&mut rx_a, &mut rx_b] {
            let u1 = expect_update(next_msg(rx));
            let u2 = expect_update(next_msg(rx));
            assert_eq!(u1.state.as_str(), "second:1");
            assert_eq!(u2.state.as_str(), "first:2");
            assert!(rx.try_recv().is_err());
        }
        assert_eq!(coord.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_out_of_turn_rejection_reaches_requester_only() {
        let coord = scripted_coordinator(5);
        let now = Instant::now();
        let (mut rx_a, mut rx_b, id, side_a) = paired_pair(&coord, now).await;

        let (second, rx_second, rx_first) = if side_a == Side::Second {
            (A, &mut rx_a, &mut rx_b)
        } else {
            (B, &mut rx_b, &mut rx_a)
        };

        coord.on_action(second, id, &Action::new("a", "b"), now).await;

        match next_msg(rx_second) {
            ServerMessage::Rejected(rejection) => {
                assert_eq!(rejection.code, RejectCode::OutOfTurn);
            }
            other => panic!("expected rejection, got {:?}", other),
        }
        assert!(rx_first.try_recv().is_err());
        assert_eq!(coord.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_illegal_action_rejection_reaches_requester_only() {
        let coord = scripted_coordinator(6);
        let now = Instant::now();
        let (mut rx_a, mut rx_b, id, side_a) = paired_pair(&coord, now).await;

        let (first, rx_first, rx_second) = if side_a == Side::First {
            (A, &mut rx_a, &mut rx_b)
        } else {
            (B, &mut rx_b, &mut rx_a)
        };

        coord.on_action(first, id, &Action::new("a", "reject"), now).await;

        match next_msg(rx_first) {
            ServerMessage::Rejected(rejection) => {
                assert_eq!(rejection.code, RejectCode::IllegalAction);
            }
            other => panic!("expected rejection, got {:?}", other),
        }
        assert!(rx_second.try_recv().is_err());

        // The session is still usable for a correct follow-up.
        coord.on_action(first, id, &Action::new("a", "b"), now).await;
        assert!(matches!(next_msg(rx_first), ServerMessage::Update(_)));
    }

    #[tokio::test]
    async fn test_timeout_flagged_on_next_action() {
        let coord = scripted_coordinator(7);
        let now = Instant::now();
        let (mut rx_a, mut rx_b, id, _side_a) = paired_pair(&coord, now).await;

        // Nothing happens at expiry itself; the session is still live.
        assert_eq!(coord.session_count().await, 1);

        // First's 300s run out; either participant's submission flags it.
        let late = now + Duration::from_secs(301);
        coord.on_action(A, id, &Action::new("a", "b"), late).await;

        for rx in [&mut rx_a, &mut rx_b] {
            let update = expect_update(next_msg(rx));
            let terminal = update.terminal.expect("timeout update must be terminal");
            assert_eq!(terminal.reason, TerminalReason::Timeout);
            assert_eq!(terminal.winner, Some(Side::Second));
            assert!(update.action.is_none());
            assert_eq!(update.clock.first_secs, 0);
        }
        assert_eq!(coord.session_count().await, 0);

        // The id is gone for good.
        coord.on_action(A, id, &Action::new("a", "b"), late).await;
        match next_msg(&mut rx_a) {
            ServerMessage::Rejected(rejection) => {
                assert_eq!(rejection.code, RejectCode::NoSuchSession);
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_win_outcome_removes_session() {
        let coord = scripted_coordinator(8);
        let now = Instant::now();
        let (mut rx_a, mut rx_b, id, side_a) = paired_pair(&coord, now).await;

        let (first, second) = if side_a == Side::First { (A, B) } else { (B, A) };

        coord.on_action(first, id, &Action::new("a", "b"), now).await;
        let mut winning = Action::new("b", "c");
        winning.promotion = Some("win".to_string());
        coord.on_action(second, id, &winning, now).await;

        for rx in [&mut rx_a, &mut rx_b] {
            let _opening = expect_update(next_msg(rx));
            let closing = expect_update(next_msg(rx));
            let terminal = closing.terminal.expect("winning update must be terminal");
            assert_eq!(terminal.reason, TerminalReason::Win);
            assert_eq!(terminal.winner, Some(Side::Second));
        }
        assert_eq!(coord.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_unknown_session_id_rejected() {
        let coord = scripted_coordinator(9);
        let mut rx_a = coord.attach(A).await;

        coord
            .on_action(A, [9; 16], &Action::new("a", "b"), Instant::now())
            .await;

        match next_msg(&mut rx_a) {
            ServerMessage::Rejected(rejection) => {
                assert_eq!(rejection.code, RejectCode::NoSuchSession);
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_disconnect_forfeits_session() {
        let coord = scripted_coordinator(10);
        let now = Instant::now();
        let (mut rx_a, mut rx_b, id, _) = paired_pair(&coord, now).await;

        coord.on_disconnect(A).await;

        match next_msg(&mut rx_b) {
            ServerMessage::OpponentLeft { session_id } => {
                assert_eq!(session_id, hex::encode(id));
            }
            other => panic!("expected opponent_left, got {:?}", other),
        }
        assert_eq!(coord.session_count().await, 0);
        assert_eq!(coord.connection_count().await, 1);

        // Double disconnect: no second notification, no error.
        coord.on_disconnect(A).await;
        assert!(rx_b.try_recv().is_err());
        assert!(rx_a.try_recv().is_err());

        // A later action on the dead id is answered no_such_session.
        coord.on_action(B, id, &Action::new("a", "b"), now).await;
        match next_msg(&mut rx_b) {
            ServerMessage::Rejected(rejection) => {
                assert_eq!(rejection.code, RejectCode::NoSuchSession);
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_disconnect_clears_queue_entry() {
        let coord = scripted_coordinator(11);
        let _rx_a = coord.attach(A).await;
        let mut rx_b = coord.attach(B).await;
        let now = Instant::now();

        coord.on_join(A, TimeControl::new(300, 2), now).await;
        coord.on_disconnect(A).await;
        assert_eq!(coord.queue_len().await, 0);

        // B must not pair with the ghost.
        coord.on_join(B, TimeControl::new(300, 2), now).await;
        assert!(matches!(next_msg(&mut rx_b), ServerMessage::Waiting));
        assert_eq!(coord.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_join_while_seated_is_rejected() {
        let coord = scripted_coordinator(12);
        let now = Instant::now();
        let (mut rx_a, _rx_b, _id, _) = paired_pair(&coord, now).await;

        coord.on_join(A, TimeControl::new(60, 0), now).await;

        match next_msg(&mut rx_a) {
            ServerMessage::Rejected(rejection) => {
                assert_eq!(rejection.code, RejectCode::AlreadyInSession);
            }
            other => panic!("expected rejection, got {:?}", other),
        }
        assert_eq!(coord.queue_len().await, 0);
    }

    #[tokio::test]
    async fn test_invalid_control_rejected() {
        let coord = scripted_coordinator(13);
        let mut rx_a = coord.attach(A).await;

        coord.on_join(A, TimeControl::new(0, 5), Instant::now()).await;

        match next_msg(&mut rx_a) {
            ServerMessage::Rejected(rejection) => {
                assert_eq!(rejection.code, RejectCode::InvalidControl);
            }
            other => panic!("expected rejection, got {:?}", other),
        }
        assert_eq!(coord.queue_len().await, 0);
    }

    #[tokio::test]
    async fn test_pong_echoes_timestamp() {
        let coord = scripted_coordinator(15);
        let mut rx_a = coord.attach(A).await;

        coord.pong(A, 777).await;

        match next_msg(&mut rx_a) {
            ServerMessage::Pong { timestamp, .. } => assert_eq!(timestamp, 777),
            other => panic!("expected pong, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_shutdown_notice_reaches_all_attached() {
        let coord = scripted_coordinator(16);
        let mut rx_a = coord.attach(A).await;
        let mut rx_b = coord.attach(B).await;

        coord.broadcast_shutdown("maintenance").await;

        for rx in [&mut rx_a, &mut rx_b] {
            match next_msg(rx) {
                ServerMessage::Shutdown { reason } => assert_eq!(reason, "maintenance"),
                other => panic!("expected shutdown, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_bookkeeping_invariant_under_shuffled_joins() {
        use rand::rngs::StdRng;
        use rand::seq::SliceRandom;
        use rand::SeedableRng;

        let coord = scripted_coordinator(20);
        let controls = [
            TimeControl::new(60, 0),
            TimeControl::new(300, 2),
            TimeControl::new(180, 1),
        ];

        // Twelve participants, four per control, joining in shuffled order.
        let mut joins: Vec<(ParticipantId, TimeControl)> = (0u8..12)
            .map(|i| (ParticipantId::new([i + 50; 16]), controls[(i % 3) as usize]))
            .collect();
        joins.shuffle(&mut StdRng::seed_from_u64(42));

        let mut receivers = Vec::new();
        for &(p, _) in &joins {
            receivers.push(coord.attach(p).await);
        }
        for &(p, control) in &joins {
            coord.on_join(p, control, Instant::now()).await;
        }

        // Arrival order decides who pairs with whom, never the counts:
        // every participant ends up seated or queued, exactly once.
        let seated = 2 * coord.session_count().await;
        let queued = coord.queue_len().await;
        assert_eq!(seated + queued, joins.len());
        assert_eq!(queued, 0);
        assert_eq!(coord.session_count().await, 6);
    }

    #[tokio::test]
    async fn test_cancel_acknowledged_and_queue_cleared() {
        let coord = scripted_coordinator(14);
        let mut rx_a = coord.attach(A).await;
        let mut rx_b = coord.attach(B).await;
        let now = Instant::now();

        coord.on_join(A, TimeControl::new(300, 2), now).await;
        assert!(matches!(next_msg(&mut rx_a), ServerMessage::Waiting));

        coord.on_cancel(A).await;
        assert!(matches!(next_msg(&mut rx_a), ServerMessage::Cancelled));
        assert_eq!(coord.queue_len().await, 0);

        // Cancel with nothing pending still gets its ack.
        coord.on_cancel(A).await;
        assert!(matches!(next_msg(&mut rx_a), ServerMessage::Cancelled));

        coord.on_join(B, TimeControl::new(300, 2), now).await;
        assert!(matches!(next_msg(&mut rx_b), ServerMessage::Waiting));
    }
}
