//! Deadline guard for outbound calls.

use std::future::Future;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Default deadline for work-tracking REST calls.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Deadline for the quicker host form-service lookups used as fallbacks.
pub const DEFAULT_FALLBACK_TIMEOUT: Duration = Duration::from_secs(8);

/// Race `operation` against a timer.
///
/// When the timer wins the future is dropped and [`Error::Timeout`] is
/// returned with `label` and the elapsed time. Dropping stops polling but
/// work already handed to another task (or the remote server) may still
/// finish; its result is discarded.
pub async fn with_timeout<T, F>(label: impl Into<String>, duration: Duration, operation: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let started = Instant::now();
    match tokio::time::timeout(duration, operation).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout {
            label: label.into(),
            elapsed: started.elapsed(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn passes_through_fast_results() {
        let value = with_timeout("quick", Duration::from_secs(1), async { Ok(42) })
            .await
            .unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn passes_through_operation_errors() {
        let err = with_timeout::<(), _>("failing", Duration::from_secs(1), async {
            Err(Error::transport("connection refused"))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[tokio::test]
    async fn slow_operation_times_out_with_label() {
        let err = with_timeout("slow fetch", Duration::from_millis(20), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await
        .unwrap_err();

        match err {
            Error::Timeout { label, elapsed } => {
                assert_eq!(label, "slow fetch");
                assert!(elapsed >= Duration::from_millis(20));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }
}
