use rand::Rng;

/// Source of the symmetric delay jitter applied to each settlement
pub trait JitterSource: Send + Sync {
    /// Uniform sample in `[-range_ms, +range_ms]`
    fn sample_ms(&self, range_ms: u64) -> i64;
}

/// Thread-local RNG jitter used in production
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomJitter;

impl JitterSource for RandomJitter {
    fn sample_ms(&self, range_ms: u64) -> i64 {
        if range_ms == 0 {
            return 0;
        }
        let range = range_ms as i64;
        rand::rng().random_range(-range..=range)
    }
}

/// Constant jitter, clamped to the requested range
#[derive(Debug, Clone, Copy)]
pub struct FixedJitter(pub i64);

impl JitterSource for FixedJitter {
    fn sample_ms(&self, range_ms: u64) -> i64 {
        let range = range_ms as i64;
        self.0.clamp(-range, range)
    }
}
