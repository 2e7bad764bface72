//! Timeout helper for external calls
//!
//! ```ignore
//! let body = with_timeout(Duration::from_secs(30), client.send(), "web_search").await?;
//! ```

use std::future::Future;
use std::time::Duration;

use crate::types::{LensError, Result};

/// Execute an async operation with a timeout
///
/// Returns `LensError::Timeout` if the operation doesn't complete within
/// `timeout`. The inner future is dropped on expiry.
pub async fn with_timeout<T, F>(timeout: Duration, future: F, operation_name: &str) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(LensError::timeout(operation_name, timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_timeout_success() {
        let result = with_timeout(
            Duration::from_secs(1),
            async { Ok::<_, LensError>(42) },
            "test operation",
        )
        .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_with_timeout_expires() {
        let result = with_timeout(
            Duration::from_millis(10),
            async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok::<_, LensError>(42)
            },
            "slow operation",
        )
        .await;
        let err = result.unwrap_err();
        assert!(matches!(err, LensError::Timeout { .. }));
        assert!(err.is_recoverable());
    }
}
