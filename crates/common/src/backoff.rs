//! Exponential backoff with jitter, used by any loop that retries against a
//! fallible dependency (the controller's restart recovery, the response
//! handler's poll loop) instead of busy-looping on error.
use std::time::Duration;

use rand::Rng;

#[derive(Clone, Debug)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    failures: u32,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            failures: 0,
        }
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn reset(&mut self) {
        self.failures = 0;
    }

    /// Record a failure and return how long to wait before retrying,
    /// with +/-20% jitter so that many callers backing off together don't
    /// retry in lockstep.
    pub fn fail(&mut self, rng: &mut impl Rng) -> Duration {
        let exp = self.failures.min(20);
        self.failures += 1;
        let base = self
            .initial
            .saturating_mul(1u32.checked_shl(exp).unwrap_or(u32::MAX))
            .min(self.max);
        let jitter_frac = rng.random_range(0.8..1.2);
        base.mul_f64(jitter_frac).min(self.max)
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn backoff_grows_and_caps_at_max() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(42);
        let mut backoff = Backoff::new(Duration::from_millis(10), Duration::from_secs(1));
        let mut last = Duration::ZERO;
        for _ in 0..30 {
            let delay = backoff.fail(&mut rng);
            assert!(delay <= Duration::from_secs(1));
            last = delay;
        }
        assert!(last <= Duration::from_secs(1));
        assert_eq!(backoff.failures(), 30);
        backoff.reset();
        assert_eq!(backoff.failures(), 0);
    }
}
