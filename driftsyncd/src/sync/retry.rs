use std::time::Duration;

use rand::Rng;

/// Backoff schedule plus the attempt bound for one class of operation.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    base: Duration,
    cap: Duration,
    max_retries: u32,
    jitter: bool,
}

impl RetryPolicy {
    pub fn new(base: Duration, cap: Duration, max_retries: u32, jitter: bool) -> Self {
        Self {
            base,
            cap,
            max_retries,
            jitter,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// True while another attempt is allowed after `retry_count` failures.
    pub fn should_retry(&self, retry_count: u32) -> bool {
        retry_count < self.max_retries
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let mut rng = rand::thread_rng();
        self.delay_with_rng(attempt, &mut rng)
    }

    /// Doubling backoff capped at `cap`; with jitter the delay lands in the
    /// upper half of the window so retries still spread without collapsing
    /// to zero.
    pub fn delay_with_rng<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let base_ms = self.base.as_millis().min(u128::from(u64::MAX)) as u64;
        let cap_ms = self.cap.as_millis().min(u128::from(u64::MAX)) as u64;
        let window = base_ms
            .saturating_mul(1u64 << attempt.min(20))
            .min(cap_ms)
            .max(1);
        let delay_ms = if self.jitter {
            rng.gen_range(window.div_ceil(2)..=window)
        } else {
            window
        };
        Duration::from_millis(delay_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_secs(60), 3, true)
    }
}
