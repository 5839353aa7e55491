//! Bounded backoff for store read paths.
//!
//! Write paths never go through this: retrying a selection write risks
//! double-apply, so writes roll back and report once instead.

use ballast_core::{BallastResult, RetryConfig};
use std::future::Future;

/// Run a read operation, retrying transient upstream failures with bounded
/// exponential backoff.
///
/// Only errors for which [`ballast_core::BallastError::is_retryable`] holds
/// are retried; everything else is returned immediately.
pub async fn with_read_retry<T, F, Fut>(retry: &RetryConfig, mut op: F) -> BallastResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = BallastResult<T>>,
{
    let mut backoff = retry.initial_backoff;
    let mut attempt = 0;

    loop {
        match op().await {
            Err(err) if err.is_retryable() && attempt < retry.max_retries => {
                attempt += 1;
                tokio::time::sleep(backoff).await;
                backoff = backoff
                    .mul_f32(retry.backoff_multiplier)
                    .min(retry.max_backoff);
            }
            other => return other,
        }
    }
}
