use std::time::Duration;

use rand::Rng;
use rt_core::TrackerError;
use tracing::warn;

/// Bounded exponential backoff for operations that lose an
/// optimistic-concurrency race.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
    pub jitter: bool,
}

impl RetryPolicy {
    pub fn no_wait(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            multiplier: 1.0,
            jitter: false,
        }
    }

    /// Delay before retry number `attempt` (1-based), without jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let secs = self.initial_backoff.as_secs_f64() * exp;
        Duration::from_secs_f64(secs.min(self.max_backoff.as_secs_f64()))
    }

    fn delay(&self, attempt: u32) -> Duration {
        let base = self.backoff(attempt);
        if !self.jitter || base.is_zero() {
            return base;
        }
        // Full jitter in [base/2, base].
        let half = base / 2;
        half + rand::thread_rng().gen_range(Duration::ZERO..=half)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent. `op` receives the 1-based attempt number.
    pub fn run<T>(
        &self,
        mut op: impl FnMut(u32) -> Result<T, TrackerError>,
    ) -> Result<T, TrackerError> {
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let wait = self.delay(attempt);
                    warn!(attempt, max = self.max_attempts, ?wait, error = %e, "retrying");
                    std::thread::sleep(wait);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rt_store::StoreError;
    use rt_types::TrackerId;

    fn conflict() -> TrackerError {
        TrackerError::Conflict {
            id: TrackerId::new("rbd", "vol").unwrap(),
        }
    }

    // ---- backoff ----

    #[test]
    fn backoff_grows_and_caps() {
        let p = RetryPolicy {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(50),
            multiplier: 2.0,
            jitter: false,
        };
        assert_eq!(p.backoff(1), Duration::from_millis(10));
        assert_eq!(p.backoff(2), Duration::from_millis(20));
        assert_eq!(p.backoff(3), Duration::from_millis(40));
        assert_eq!(p.backoff(4), Duration::from_millis(50));
        assert_eq!(p.backoff(30), Duration::from_millis(50));
    }

    #[test]
    fn jitter_stays_in_range() {
        let p = RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(8),
            max_backoff: Duration::from_millis(8),
            multiplier: 1.0,
            jitter: true,
        };
        for _ in 0..100 {
            let d = p.delay(1);
            assert!(d >= Duration::from_millis(4) && d <= Duration::from_millis(8));
        }
    }

    // ---- run ----

    #[test]
    fn retries_conflicts_until_success() {
        let mut calls = 0;
        let out = RetryPolicy::no_wait(5).run(|_| {
            calls += 1;
            if calls < 3 {
                Err(conflict())
            } else {
                Ok(calls)
            }
        });
        assert_eq!(out.unwrap(), 3);
    }

    #[test]
    fn gives_up_after_budget() {
        let mut calls = 0;
        let out: Result<(), _> = RetryPolicy::no_wait(4).run(|_| {
            calls += 1;
            Err(conflict())
        });
        assert!(matches!(out, Err(TrackerError::Conflict { .. })));
        assert_eq!(calls, 4);
    }

    #[test]
    fn busy_store_is_retried() {
        let mut seen = Vec::new();
        let out = RetryPolicy::no_wait(3).run(|attempt| {
            seen.push(attempt);
            if attempt == 1 {
                Err(TrackerError::Store(StoreError::Busy {
                    pool: "rbd".into(),
                    oid: "vol".into(),
                }))
            } else {
                Ok(())
            }
        });
        assert!(out.is_ok());
        assert_eq!(seen, vec![1, 2]);
    }

    #[test]
    fn fatal_errors_are_not_retried() {
        let mut calls = 0;
        let out: Result<(), _> = RetryPolicy::no_wait(5).run(|_| {
            calls += 1;
            Err(TrackerError::EmptyKeySet)
        });
        assert!(matches!(out, Err(TrackerError::EmptyKeySet)));
        assert_eq!(calls, 1);
    }
}
