//! Split-based pseudo-random keys.
//!
//! A [`PrngKey`] is a plain value that is passed down the call graph and
//! split before every stochastic operation. There is no global generator:
//! two calls given the same key produce the same numbers.

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

/// Domain tags keep the derivation stream separate from the sampling stream.
const SPLIT_TAG: u8 = 0x5b;
const SAMPLE_TAG: u8 = 0xa7;

/// Pseudo-random key, consumed by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PrngKey(u64);

impl PrngKey {
    /// Creates a root key from a seed.
    pub fn new(seed: u64) -> Self {
        Self(seed)
    }

    /// Raw 64-bit key material.
    pub fn raw(&self) -> u64 {
        self.0
    }

    /// Splits into two independent keys.
    pub fn split(self) -> (PrngKey, PrngKey) {
        let mut rng = self.stream(SPLIT_TAG);
        (PrngKey(rng.next_u64()), PrngKey(rng.next_u64()))
    }

    /// Splits into `n` independent keys.
    pub fn split_n(self, n: usize) -> Vec<PrngKey> {
        let mut rng = self.stream(SPLIT_TAG);
        (0..n).map(|_| PrngKey(rng.next_u64())).collect()
    }

    /// Generator for a single stochastic operation keyed by `self`.
    pub fn rng(self) -> StdRng {
        self.stream(SAMPLE_TAG)
    }

    fn stream(self, tag: u8) -> StdRng {
        let mut seed = [0u8; 32];
        seed[..8].copy_from_slice(&self.0.to_le_bytes());
        seed[8] = tag;
        StdRng::from_seed(seed)
    }
}

impl From<u64> for PrngKey {
    fn from(seed: u64) -> Self {
        PrngKey::new(seed)
    }
}
