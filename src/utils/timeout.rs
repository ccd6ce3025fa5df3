//! Deadline helpers for calls out to the store and the rate provider

use std::future::Future;
use std::time::Duration;

/// Run `future` under a deadline, keeping its own error separate from the
/// deadline firing.
pub async fn with_timeout<T, E>(
    timeout: Duration,
    future: impl Future<Output = Result<T, E>>,
) -> Result<T, TimeoutError<E>> {
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result.map_err(TimeoutError::Inner),
        Err(_) => Err(TimeoutError::Timeout(timeout)),
    }
}

/// Error from a call made under [`with_timeout`]
#[derive(Debug, thiserror::Error)]
pub enum TimeoutError<E> {
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Inner(E),
}

impl<E> TimeoutError<E> {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TimeoutError::Timeout(_))
    }

    /// Collapse into the inner error type, building one for an expired deadline
    pub fn flatten(self, on_timeout: impl FnOnce(Duration) -> E) -> E {
        match self {
            TimeoutError::Inner(e) => e,
            TimeoutError::Timeout(after) => on_timeout(after),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_completes_within_deadline() {
        let result = with_timeout(Duration::from_secs(1), async { Ok::<_, String>(83.12) }).await;
        assert_eq!(result.unwrap(), 83.12);
    }

    #[tokio::test]
    async fn test_inner_error_is_kept() {
        let err = with_timeout(Duration::from_secs(1), async { Err::<f64, _>("503".to_string()) })
            .await
            .unwrap_err();

        assert!(!err.is_timeout());
        assert_eq!(err.flatten(|_| "deadline".to_string()), "503");
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_fires() {
        let err = with_timeout(Duration::from_secs(5), async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, String>(1.0)
        })
        .await
        .unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(err.flatten(|after| format!("{:?}", after)), "5s");
    }
}
