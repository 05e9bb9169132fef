//! Per-call deadlines

use std::future::Future;
use std::time::{Duration, Instant};

use crate::error::{QueryError, QueryResult};

/// Run `call` under `limit`. `None` means no deadline. On expiry the call is
/// dropped and a timeout error carrying the elapsed time is returned.
pub async fn with_deadline<T, F>(backend: &str, limit: Option<Duration>, call: F) -> QueryResult<T>
where
    F: Future<Output = QueryResult<T>>,
{
    let Some(limit) = limit else {
        return call.await;
    };
    let started = Instant::now();
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(QueryError::timeout(backend, started.elapsed().as_millis())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendErrorKind;

    #[tokio::test]
    async fn test_expiry_is_timeout() {
        let err = with_deadline("mysql", Some(Duration::from_millis(10)), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(1)
        })
        .await
        .unwrap_err();
        assert_eq!(err.backend_kind(), Some(BackendErrorKind::Timeout));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_no_deadline_passes_through() {
        let value = with_deadline("redis", None, async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }
}
