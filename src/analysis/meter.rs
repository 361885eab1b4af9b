use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Latest published unrest score, readable from any thread.
#[derive(Clone, Debug)]
pub struct ScoreMeter {
    score_bits: Arc<AtomicU32>,
}

impl ScoreMeter {
    pub fn new() -> Self {
        Self {
            score_bits: Arc::new(AtomicU32::new(0.0f32.to_bits())),
        }
    }

    pub fn set(&self, score: f32) {
        self.score_bits.store(score.to_bits(), Ordering::Relaxed);
    }

    pub fn value(&self) -> f32 {
        f32::from_bits(self.score_bits.load(Ordering::Relaxed))
    }
}

impl Default for ScoreMeter {
    fn default() -> Self {
        Self::new()
    }
}
