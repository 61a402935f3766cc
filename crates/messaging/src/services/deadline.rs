//! Deadline enforcement for store operations.

use crate::types::{MessagingError, MessagingResult};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Run `operation` under `limit`. Expiry drops the future, which rolls back
/// any open transaction, and surfaces as a retryable `Timeout`.
pub async fn with_deadline<T, F>(operation: &'static str, limit: Duration, future: F) -> MessagingResult<T>
where
    F: Future<Output = MessagingResult<T>>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => {
            warn!(operation, timeout_ms = limit.as_millis() as u64, "operation deadline expired");
            Err(MessagingError::timeout(operation))
        }
    }
}
