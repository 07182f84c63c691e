use crate::config::ConsistencyConfig;
use crate::replica::consistency::ConsistencyError;

use std::future::Future;
use tokio::time::Instant;

/// Re-runs `check` every retry interval until it passes or the timeout
/// elapses. Each attempt only gets the time left before the deadline. On
/// timeout the last failure is returned, or [`ConsistencyError::Timeout`]
/// when no attempt finished.
pub async fn eventually<T, F, Fut>(
    config: &ConsistencyConfig,
    mut check: F,
) -> Result<T, ConsistencyError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ConsistencyError>>,
{
    let deadline = Instant::now() + config.timeout();
    let mut attempts: u64 = 0;
    let mut last_err = None;
    loop {
        attempts += 1;
        let remaining = deadline.saturating_duration_since(Instant::now());
        let err = match tokio::time::timeout(remaining, check()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) => err,
            Err(_) => {
                let err = last_err.unwrap_or(ConsistencyError::Timeout { attempts });
                tracing::warn!(
                    "attempt {} still running at the deadline, giving up: {}",
                    attempts,
                    err
                );
                return Err(err);
            }
        };

        let now = Instant::now();
        if now >= deadline {
            tracing::warn!(
                "check still failing after {} attempts, giving up: {}",
                attempts,
                err
            );
            return Err(err);
        }
        tracing::debug!("attempt {} failed, retrying: {}", attempts, err);
        tokio::time::sleep(config.retry_interval().min(deadline - now)).await;
        last_err = Some(err);
    }
}

#[cfg(test)]
mod tests {
    use crate::config::ConsistencyConfig;
    use crate::replica::consistency::ConsistencyError;
    use crate::replica::polling::eventually;
    use std::cell::Cell;
    use std::time::Duration;

    fn config(timeout_ms: u64) -> ConsistencyConfig {
        ConsistencyConfig::new(
            Duration::from_millis(timeout_ms),
            Duration::from_millis(5),
        )
    }

    #[tokio::test]
    async fn passes_once_check_succeeds() {
        let calls = Cell::new(0);
        let result = eventually(&config(5_000), || {
            calls.set(calls.get() + 1);
            let current = calls.get();
            async move {
                if current < 3 {
                    Err(ConsistencyError::NoNodes)
                } else {
                    Ok(current)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 3);
    }

    #[tokio::test]
    async fn timeout_returns_last_failure() {
        let calls = Cell::new(0);
        let result: Result<(), _> = eventually(&config(30), || {
            calls.set(calls.get() + 1);
            async { Err(ConsistencyError::NoNodes) }
        })
        .await;
        assert!(matches!(result, Err(ConsistencyError::NoNodes)));
        assert!(calls.get() > 1);
    }

    #[tokio::test]
    async fn stalled_first_attempt_times_out() {
        let result: Result<(), _> = eventually(&config(30), || {
            futures::future::pending::<Result<(), ConsistencyError>>()
        })
        .await;
        assert!(matches!(
            result,
            Err(ConsistencyError::Timeout { attempts: 1 })
        ));
    }

    #[tokio::test]
    async fn stalled_retry_returns_previous_failure() {
        let calls = Cell::new(0);
        let result: Result<(), _> = eventually(&config(100), || {
            calls.set(calls.get() + 1);
            let first = calls.get() == 1;
            async move {
                if first {
                    Err(ConsistencyError::NoNodes)
                } else {
                    futures::future::pending().await
                }
            }
        })
        .await;
        assert!(matches!(result, Err(ConsistencyError::NoNodes)));
        assert_eq!(calls.get(), 2);
    }
}
