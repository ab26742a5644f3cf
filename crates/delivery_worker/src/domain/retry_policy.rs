use std::time::Duration;

/// One bounded retry policy per delivery task.
///
/// Transport failures consume the device's `retry_limit` and back off
/// exponentially. Internal failures (persistence errors around the attempt)
/// retry after a fixed delay and have their own ceiling.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub backoff_base: Duration,
    pub max_backoff: Duration,
    pub internal_retry_delay: Duration,
    pub max_internal_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff_base: Duration::from_secs(2),
            max_backoff: Duration::from_secs(3600),
            internal_retry_delay: Duration::from_secs(60),
            max_internal_retries: 5,
        }
    }
}

impl RetryPolicy {
    /// Delay before the next attempt once `attempts` transport failures have
    /// been recorded: base^attempts seconds, capped at `max_backoff`.
    pub fn backoff_for(&self, attempts: u32) -> Duration {
        let exponent = i32::try_from(attempts).unwrap_or(i32::MAX);
        let secs = self.backoff_base.as_secs_f64().powi(exponent);
        let cap = self.max_backoff.as_secs_f64();

        if !secs.is_finite() || secs >= cap {
            return self.max_backoff;
        }
        Duration::from_secs_f64(secs)
    }

    /// Delay before retrying after an internal failure, or None once the
    /// task has used up its internal budget.
    pub fn internal_retry_after(&self, internal_failures: u32) -> Option<Duration> {
        (internal_failures < self.max_internal_retries).then_some(self.internal_retry_delay)
    }
}
