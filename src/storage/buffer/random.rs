use super::replacer::{FrameId, Replacer};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const DEFAULT_SEED: u64 = 0x5EED_CAFE;

/// Randomized replacement: any evictable frame may be chosen with non-zero
/// probability. Selection is deterministic under a fixed PRNG seed.
#[derive(Debug)]
pub struct RandomReplacer {
    candidates: Vec<FrameId>,
    rng: StdRng,
}

impl RandomReplacer {
    pub fn new() -> Self {
        Self::with_seed(DEFAULT_SEED)
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            candidates: Vec::new(),
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomReplacer {
    fn default() -> Self {
        Self::new()
    }
}

impl Replacer for RandomReplacer {
    fn evict(&mut self) -> Option<FrameId> {
        if self.candidates.is_empty() {
            return None;
        }
        let index = self.rng.gen_range(0..self.candidates.len());
        Some(self.candidates.swap_remove(index))
    }

    fn pin(&mut self, frame_id: FrameId) {
        if let Some(index) = self.candidates.iter().position(|&f| f == frame_id) {
            self.candidates.swap_remove(index);
        }
    }

    fn unpin(&mut self, frame_id: FrameId) {
        if !self.candidates.contains(&frame_id) {
            self.candidates.push(frame_id);
        }
    }

    fn size(&self) -> usize {
        self.candidates.len()
    }
}
