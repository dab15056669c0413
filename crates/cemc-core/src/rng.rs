//! Deterministic RNG wrapper and seed-derivation helpers.

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use siphasher::sip::SipHasher13;
use std::hash::Hasher;

/// Deterministic RNG handle used by every CEMC kernel.
///
/// The handle is a thin wrapper around `StdRng` that documents the seeding
/// policy used throughout the project. A master `seed: u64` must be provided
/// by the caller. Substreams are derived by hashing `(master_seed, substream)`
/// with SipHash-1-3 configured with fixed zero keys. This rule is stable
/// across platforms and must be used whenever deterministic branching is
/// required (one substream per run in a series).
///
/// Kernels only require the narrow capability exposed here: raw `u64` draws,
/// uniform doubles on `[0, 1)` and uniform indices below a bound. Proposals
/// are drawn in a fixed order from a single handle per run, so the master
/// seed is sufficient to reproduce a run.
#[derive(Debug, Clone)]
pub struct RngHandle {
    rng: StdRng,
}

impl RngHandle {
    /// Creates a new RNG handle from a master seed.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Uniform double on `[0, 1)` using the 53-bit mantissa construction.
    pub fn uniform_f64(&mut self) -> f64 {
        (self.rng.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Uniform index in `[0, bound)`.
    ///
    /// Uses rejection below the largest multiple of `bound` so every index
    /// is equally likely. `bound` must be nonzero.
    pub fn uniform_index(&mut self, bound: usize) -> usize {
        debug_assert!(bound > 0);
        let bound = bound as u64;
        let zone = u64::MAX - (u64::MAX % bound);
        loop {
            let draw = self.rng.next_u64();
            if draw < zone {
                return (draw % bound) as usize;
            }
        }
    }

    /// Returns a mutable reference to the underlying RNG for advanced usage.
    pub fn inner_mut(&mut self) -> &mut StdRng {
        &mut self.rng
    }
}

impl RngCore for RngHandle {
    fn next_u32(&mut self) -> u32 {
        self.rng.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.rng.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.rng.fill_bytes(dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.rng.try_fill_bytes(dest)
    }
}

/// Derives the deterministic seed for a specific substream.
pub fn derive_substream_seed(master_seed: u64, substream: u64) -> u64 {
    let mut hasher = SipHasher13::new_with_keys(0, 0);
    hasher.write_u64(master_seed);
    hasher.write_u64(substream);
    hasher.finish()
}

/// Derives the deterministic seed used for run `run_index` of a series.
pub fn run_seed(master_seed: u64, run_index: u64) -> u64 {
    derive_substream_seed(master_seed, run_index)
}
