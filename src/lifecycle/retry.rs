//! Bounded startup operations: one timeout per attempt, one retry.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use super::StartupCancel;

/// Attempts per startup operation (the first try plus one retry).
pub const STARTUP_ATTEMPTS: u32 = 2;

/// Run `op` under `timeout`, retrying once on failure or timeout.
///
/// `on_timeout` builds the error for an attempt that ran out of time; it
/// receives the bound in seconds. The last error is returned when every
/// attempt fails. Once `cancel` is set no new attempt is started; an attempt
/// already running is left to finish.
pub async fn with_timeout_retry<T, E, F, Fut>(
    operation: &str,
    timeout: Duration,
    cancel: &StartupCancel,
    mut op: F,
    on_timeout: impl Fn(u64) -> E,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt = 1;
    loop {
        let outcome = match tokio::time::timeout(timeout, op()).await {
            Ok(outcome) => outcome,
            Err(_) => Err(on_timeout(timeout.as_secs())),
        };
        match outcome {
            Ok(value) => return Ok(value),
            Err(e) if attempt < STARTUP_ATTEMPTS && !cancel.is_cancelled() => {
                log::warn!(
                    "{} failed (attempt {}/{}): {}; retrying",
                    operation,
                    attempt,
                    STARTUP_ATTEMPTS,
                    e
                );
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_succeeds_on_retry() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = with_timeout_retry(
            "op",
            Duration::from_secs(1),
            &StartupCancel::new(),
            || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    Err("first".to_string())
                } else {
                    Ok(n)
                }
            },
            |secs| format!("timeout {}", secs),
        )
        .await;
        assert_eq!(result, Ok(1));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_second_failure() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = with_timeout_retry(
            "op",
            Duration::from_secs(1),
            &StartupCancel::new(),
            || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                Err(format!("failure {}", n))
            },
            |secs| format!("timeout {}", secs),
        )
        .await;
        assert_eq!(result, Err("failure 1".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), STARTUP_ATTEMPTS);
    }

    #[tokio::test]
    async fn test_hung_attempt_times_out_then_retries() {
        let calls = AtomicU32::new(0);
        let result: Result<&str, String> = with_timeout_retry(
            "op",
            Duration::from_millis(50),
            &StartupCancel::new(),
            || async {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                }
                Ok("done")
            },
            |secs| format!("timeout {}", secs),
        )
        .await;
        assert_eq!(result, Ok("done"));
    }

    #[tokio::test]
    async fn test_cancelled_operation_is_not_retried() {
        let calls = AtomicU32::new(0);
        let cancel = StartupCancel::new();
        let result: Result<(), String> = with_timeout_retry(
            "op",
            Duration::from_secs(1),
            &cancel,
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                cancel.cancel();
                Err("failed while shutting down".to_string())
            },
            |secs| format!("timeout {}", secs),
        )
        .await;
        assert_eq!(result, Err("failed while shutting down".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
