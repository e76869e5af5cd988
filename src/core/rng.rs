//! Session Randomness
//!
//! Xorshift128+ random source behind every randomized decision the
//! coordinator makes: session id generation and seat assignment. The source
//! is a plain value handed to the coordinator at construction, so tests pin
//! a seed and drive both assignment branches deterministically, while the
//! production path seeds from process entropy.

use sha2::{Sha256, Digest};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Distinguishes seeds derived by this module from any other SHA-256 use.
const SEED_DOMAIN: &[u8] = b"TURNSTONE_SEED_V1";

/// Counter folded into entropy seeds so two sources created in the same
/// nanosecond still diverge.
static SEED_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Seedable random source for session ids and seat assignment.
///
/// Xorshift128+ with SplitMix64 state initialization: fast, well
/// distributed, and fully reproducible from a seed.
#[derive(Clone, Debug)]
pub struct SessionRng {
    state: [u64; 2],
}

impl SessionRng {
    /// Create a source from a 64-bit seed.
    ///
    /// SplitMix64 expands the seed into the internal state, so even
    /// near-identical seeds give unrelated sequences.
    pub fn from_seed(seed: u64) -> Self {
        let mut s = seed;
        let state0 = splitmix64(&mut s);
        let state1 = splitmix64(&mut s);

        // Xorshift is stuck forever at an all-zero state
        let state = if state0 == 0 && state1 == 0 {
            [1, 1]
        } else {
            [state0, state1]
        };

        Self { state }
    }

    /// Create a source seeded from process entropy.
    ///
    /// The seed is the first 8 bytes of a SHA-256 over a domain separator,
    /// the wall-clock nanosecond reading, the process id, and a
    /// process-wide sequence number.
    pub fn from_entropy() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let sequence = SEED_SEQUENCE.fetch_add(1, Ordering::Relaxed);

        let mut hasher = Sha256::new();
        hasher.update(SEED_DOMAIN);
        hasher.update(nanos.to_le_bytes());
        hasher.update(std::process::id().to_le_bytes());
        hasher.update(sequence.to_le_bytes());
        let hash = hasher.finalize();

        let mut seed_bytes = [0u8; 8];
        seed_bytes.copy_from_slice(&hash[..8]);
        Self::from_seed(u64::from_le_bytes(seed_bytes))
    }

    /// Next raw 64-bit value.
    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        let s0 = self.state[0];
        let mut s1 = self.state[1];
        let result = s0.wrapping_add(s1);

        s1 ^= s0;
        self.state[0] = s0.rotate_left(24) ^ s1 ^ (s1 << 16);
        self.state[1] = s1.rotate_left(37);

        result
    }

    /// Fair coin flip, used for seat assignment.
    #[inline]
    pub fn coin_flip(&mut self) -> bool {
        // Low bits of xorshift128+ are weakest; use the top bit.
        self.next_u64() >> 63 == 1
    }

    /// Fresh 16-byte session id.
    ///
    /// Uniqueness is not guaranteed here; the registry collision-checks
    /// each candidate against live sessions before accepting it.
    pub fn session_id(&mut self) -> [u8; 16] {
        let mut id = [0u8; 16];
        id[..8].copy_from_slice(&self.next_u64().to_le_bytes());
        id[8..].copy_from_slice(&self.next_u64().to_le_bytes());
        id
    }
}

/// SplitMix64 for seed expansion.
#[inline]
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}
