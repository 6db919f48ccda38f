//! 재시도 정책.
//!
//! 일괄 갱신과 온디맨드 조회가 같은 타입을 사용하며 설정만 다릅니다.

use std::future::Future;
use std::time::Duration;
use stockcache_core::{BackoffSettings, RetrySettings};
use tracing::{debug, warn};

use crate::error::Result;

/// 재시도 간 최대 대기 시간.
const MAX_DELAY: Duration = Duration::from_secs(600);

/// 재시도 정책.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// 최대 시도 횟수 (첫 시도 포함, 최소 1)
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff: BackoffSettings,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base_delay: Duration::from_millis(settings.base_delay_ms),
            backoff: settings.backoff,
        }
    }
}

impl RetryPolicy {
    /// 재시도 없이 한 번만 시도하는 정책.
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            backoff: BackoffSettings::Linear,
        }
    }

    /// `attempt`번째 시도가 실패한 뒤 대기할 시간.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let delay = match self.backoff {
            BackoffSettings::Linear => self.base_delay.checked_mul(attempt),
            BackoffSettings::Exponential { factor } => {
                let multiplier = factor.max(1.0).powi(attempt as i32 - 1);
                Duration::try_from_secs_f64(self.base_delay.as_secs_f64() * multiplier).ok()
            }
        };
        delay.unwrap_or(MAX_DELAY).min(MAX_DELAY)
    }

    /// 작업을 정책에 따라 실행합니다.
    ///
    /// 재시도할 수 없는 오류(`DataError::is_retryable`)는 즉시 반환합니다.
    pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_attempts && e.is_retryable() => {
                    let delay = self.delay_for(attempt);
                    debug!(
                        target_name = label,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "재시도 예정"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if self.max_attempts > 1 {
                        warn!(target_name = label, attempts = attempt, error = %e, "최종 실패");
                    }
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DataError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_linear_delays() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
    }

    #[test]
    fn test_exponential_delays_are_capped() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            backoff: BackoffSettings::Exponential { factor: 2.0 },
        };
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for(40), MAX_DELAY);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_retries_until_success() {
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();

        let result = RetryPolicy::default()
            .run("FPT", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(DataError::Fetch("503".into()))
                } else {
                    Ok(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 2초 + 4초
        assert_eq!(started.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = RetryPolicy::default()
            .run("FPT", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(DataError::Timeout("15s".into()))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_returns_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = RetryPolicy::default()
            .run("FPT", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(DataError::Parse("bad".into()))
            })
            .await;

        assert!(matches!(result, Err(DataError::Parse(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
