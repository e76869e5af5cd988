//! # Turnstone Session Server
//!
//! Authoritative pairing and turn arbitration for two-player clocked games.
//! The server owns every session's state and clocks; clients only propose
//! actions and receive the outcome.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                      TURNSTONE SERVER                          │
//! ├───────────────────────────────────────────────────────────────┤
//! │  core/              - Time and randomness primitives           │
//! │  ├── clock.rs       - Two-sided countdown clock, increments    │
//! │  └── rng.rs         - Seedable Xorshift128+ RNG                │
//! │                                                                │
//! │  game/              - Session logic (transport-free)           │
//! │  ├── rules.rs       - Pluggable rules boundary, opaque state   │
//! │  ├── session.rs     - Live session, clock arbitration          │
//! │  └── matchmaker.rs  - Pairing queue on exact time control      │
//! │                                                                │
//! │  network/           - Networking (side-effectful)              │
//! │  ├── server.rs      - WebSocket server                         │
//! │  ├── protocol.rs    - Message types                            │
//! │  └── coordinator.rs - Single-lock state owner and fan-out      │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Authority Guarantee
//!
//! Every mutation of queue, session, or clock state happens while holding
//! the coordinator's one lock:
//! - Actions are validated against the server's own rules adapter
//! - Clocks are settled from the server's `Instant`, never a client value
//! - Outcome notices are queued to both participants inside the same
//!   critical section, so each participant observes updates in order
//!
//! Clock expiry is detected lazily at the next action on the session; there
//! is no background timer sweep.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use crate::core::clock::{Clock, ClockSnapshot, Side, TimeControl};
pub use crate::core::rng::SessionRng;
pub use crate::game::rules::{Action, FreePlay, RulesAdapter, StateBlob};
pub use crate::game::session::{ParticipantId, Session, SessionId, SessionUpdate};
pub use crate::network::coordinator::Coordinator;
pub use crate::network::server::{ServerConfig, SessionServer};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
