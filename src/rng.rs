//! Deterministic random streams.
//!
//! Every synthesis pass gets its own ChaCha8 stream seeded from
//! (master seed, tier, pass number), so a replay with the same seed and the
//! same event sequence reproduces identical geometry.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::zone::TierKind;

pub struct RngManager {
    master_seed: u64,
    passes: u64,
}

impl RngManager {
    pub fn new(seed: u64) -> Self {
        Self {
            master_seed: seed,
            passes: 0,
        }
    }

    pub fn seed(&self) -> u64 {
        self.master_seed
    }

    pub fn passes(&self) -> u64 {
        self.passes
    }

    /// Fresh stream for the next synthesis pass on `tier`.
    pub fn next_pass(&mut self, tier: TierKind) -> ChaCha8Rng {
        self.passes += 1;
        let seed = self.derive_seed(tier.stream_id(), self.passes);
        ChaCha8Rng::seed_from_u64(seed)
    }

    fn derive_seed(&self, stream_id: u32, pass: u64) -> u64 {
        let mut seed = self.master_seed;
        seed = seed
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        seed ^= (stream_id as u64).wrapping_mul(1103515245);
        seed = seed
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        seed ^= pass.wrapping_mul(69069);
        seed
    }
}

impl Default for RngManager {
    fn default() -> Self {
        Self::new(42)
    }
}
