use {
    crate::domain::error::SyncError,
    std::{future::Future, time::Duration},
};

/// Bounded exponential backoff for payment platform calls.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl BackoffPolicy {
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Delay before attempt `attempt + 1`, doubling from `base_delay`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    /// Longest a retried operation can take when each attempt is bounded
    /// by `per_attempt`: every attempt plus every backoff sleep between them.
    pub fn worst_case(&self, per_attempt: Duration) -> Duration {
        let sleeps: Duration = (1..self.max_attempts).map(|a| self.delay_after(a)).sum();
        per_attempt.saturating_mul(self.max_attempts) + sleeps
    }
}

/// The last error once retries are exhausted or the error is not retryable.
#[derive(Debug)]
pub struct GaveUp {
    pub error: SyncError,
    pub attempts: u32,
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy runs out of attempts.
pub async fn with_backoff<T, F, Fut>(
    policy: &BackoffPolicy,
    operation: &str,
    mut op: F,
) -> Result<T, GaveUp>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SyncError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_retryable() && attempt < policy.max_attempts => {
                let delay = policy.delay_after(attempt);
                tracing::warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "payment platform call failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(error) => {
                return Err(GaveUp {
                    error,
                    attempts: attempt,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        std::sync::atomic::{AtomicU32, Ordering},
    };

    #[test]
    fn delay_doubles_and_caps() {
        let policy = BackoffPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(400));
        assert_eq!(policy.delay_after(4), Duration::from_millis(500));
    }

    #[test]
    fn worst_case_counts_attempts_and_sleeps() {
        let policy = BackoffPolicy::with_max_attempts(3);
        // 3 x 10s attempts, then 200ms + 400ms of backoff.
        assert_eq!(
            policy.worst_case(Duration::from_secs(10)),
            Duration::from_millis(30_600)
        );
        assert_eq!(
            BackoffPolicy::with_max_attempts(1).worst_case(Duration::from_secs(10)),
            Duration::from_secs(10)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn retries_remote_errors_until_exhausted() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), GaveUp> =
            with_backoff(&BackoffPolicy::default(), "test", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(SyncError::Remote("boom".into()))
            })
            .await;

        let gave_up = result.unwrap_err();
        assert_eq!(gave_up.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn validation_errors_are_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), GaveUp> =
            with_backoff(&BackoffPolicy::default(), "test", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(SyncError::Validation("bad".into()))
            })
            .await;

        assert_eq!(result.unwrap_err().attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failure() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = with_backoff(&BackoffPolicy::default(), "test", || async move {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(SyncError::Timeout("slow".into()))
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
    }
}
