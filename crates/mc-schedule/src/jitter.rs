//! Jitter sampling for the scheduler's tick wait.
//!
//! spec.md §9 Open Question (ii): the ticker draws jitter from a
//! process-global PRNG; tests must be able to seed it deterministically.
//! The teacher's only randomness primitive is `ring::rand::SystemRandom`
//! (used for CSPRNG key/nonce material in `at-core::crypto`) — reused here
//! rather than pulling in a general-purpose `rand` dependency the teacher's
//! stack does not otherwise carry.

use ring::rand::{SecureRandom, SystemRandom};
use std::time::Duration;

/// A source of jitter durations in `[0, max]`.
pub trait JitterSource: Send + Sync {
    fn sample(&self, max: Duration) -> Duration;
}

/// CSPRNG-backed jitter for production use.
#[derive(Debug, Default)]
pub struct ProcessJitter {
    rng: SystemRandom,
}

impl JitterSource for ProcessJitter {
    fn sample(&self, max: Duration) -> Duration {
        if max.is_zero() {
            return Duration::ZERO;
        }
        let mut buf = [0u8; 8];
        // Falling back to zero jitter on entropy failure keeps the ticker
        // alive rather than propagating a fatal error for a cosmetic delay.
        if self.rng.fill(&mut buf).is_err() {
            return Duration::ZERO;
        }
        let r = u64::from_le_bytes(buf);
        let max_nanos = max.as_nanos().min(u128::from(u64::MAX)) as u64;
        let nanos = r % max_nanos.max(1);
        Duration::from_nanos(nanos)
    }
}

/// Deterministic jitter for tests — always returns the same fraction of
/// `max`.
#[derive(Debug, Clone, Copy)]
pub struct FixedJitter {
    pub fraction: f64,
}

impl FixedJitter {
    pub fn zero() -> Self {
        Self { fraction: 0.0 }
    }
}

impl JitterSource for FixedJitter {
    fn sample(&self, max: Duration) -> Duration {
        max.mul_f64(self.fraction.clamp(0.0, 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_jitter_is_deterministic() {
        let j = FixedJitter { fraction: 0.5 };
        let max = Duration::from_secs(10);
        assert_eq!(j.sample(max), Duration::from_secs(5));
        assert_eq!(j.sample(max), Duration::from_secs(5));
    }

    #[test]
    fn process_jitter_stays_within_bounds() {
        let j = ProcessJitter::default();
        let max = Duration::from_millis(250);
        for _ in 0..50 {
            assert!(j.sample(max) <= max);
        }
    }

    #[test]
    fn zero_max_yields_zero() {
        let j = ProcessJitter::default();
        assert_eq!(j.sample(Duration::ZERO), Duration::ZERO);
    }
}
