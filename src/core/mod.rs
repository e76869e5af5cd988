//! Core time and randomness primitives.
//!
//! Pure value types with no transport or storage concerns. The clock and the
//! RNG both take their inputs explicitly (an `Instant`, a seed) so every
//! caller, including tests, controls them fully.

pub mod clock;
pub mod rng;

// Re-export core types
pub use clock::{Clock, ClockSnapshot, Side, TimeControl};
pub use rng::SessionRng;
