//! Deterministic counter-based random number generation.
//!
//! Each generator is keyed by `(scenario_seed, tick, stream_id)` and produces
//! its outputs by hashing a per-draw counter. Draw `n` of a stream is a pure
//! function of the key and `n`, so parallel jobs can each own a stream and
//! draw without any ordering between them.

use crate::fixed::Fixed;
use serde::{Deserialize, Serialize};

/// Well-known stream ids. Systems that draw in parallel must not share one.
pub mod streams {
    pub const COMBAT: u64 = 1;
    pub const AI: u64 = 2;
    pub const ECONOMY: u64 = 3;
}

/// splitmix64 finalizer. Full-avalanche, cheap, and identical everywhere.
#[inline]
const fn mix(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}

/// A counter-based random stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRng {
    key: u64,
    counter: u64,
}

impl StreamRng {
    /// Create the stream for `(seed, tick, stream_id)`.
    pub fn new(seed: u64, tick: u64, stream_id: u64) -> Self {
        // Rotations keep the three components from cancelling each other.
        let key = mix(mix(seed) ^ mix(tick).rotate_left(17) ^ mix(stream_id).rotate_left(31));
        Self { key, counter: 0 }
    }

    /// Next raw 64-bit value.
    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        let out = mix(self.key ^ self.counter.wrapping_mul(0x9e37_79b9_7f4a_7c15));
        self.counter = self.counter.wrapping_add(1);
        out
    }

    /// Uniform value in `[0, bound)`. `bound == 0` yields 0.
    #[inline]
    pub fn next_range(&mut self, bound: u64) -> u64 {
        if bound == 0 {
            return 0;
        }
        // Multiply-shift reduction avoids modulo bias skew for game-sized
        // bounds without a rejection loop.
        ((self.next_u64() as u128 * bound as u128) >> 64) as u64
    }

    /// Uniform [`Fixed`] in `[0, 1)`.
    #[inline]
    pub fn next_fixed(&mut self) -> Fixed {
        Fixed::from_raw((self.next_u64() >> 32) as i64)
    }

    /// How many values have been drawn from this stream.
    pub fn draws(&self) -> u64 {
        self.counter
    }
}
