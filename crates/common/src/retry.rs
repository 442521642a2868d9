//! Adapter-internal retry for upstream HTTP calls
//!
//! The pipeline itself never retries; adapters may absorb transient
//! upstream failures (connect errors, 429, 5xx) within a small time budget.

use crate::errors::{AppError, Result};
use backoff::{Error as BackoffError, ExponentialBackoffBuilder};
use reqwest::StatusCode;
use std::future::Future;
use std::time::Duration;

/// Run `op` until it succeeds, fails permanently, or the budget is spent
pub async fn with_retry<T, F, Fut>(service: &str, budget: Duration, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, BackoffError<AppError>>>,
{
    if budget.is_zero() {
        return op().await.map_err(into_inner);
    }

    let policy = ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(100))
        .with_max_interval(Duration::from_secs(1))
        .with_max_elapsed_time(Some(budget))
        .build();

    backoff::future::retry_notify(policy, op, |err: AppError, wait: Duration| {
        tracing::warn!(
            service = service,
            error = %err,
            wait_ms = wait.as_millis() as u64,
            "Upstream request failed, retrying"
        );
    })
    .await
}

/// Classify a transport error
pub fn send_error(service: &str, timeout: Duration, err: reqwest::Error) -> BackoffError<AppError> {
    if err.is_timeout() {
        BackoffError::transient(AppError::UpstreamTimeout {
            service: service.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        })
    } else if err.is_connect() || err.is_request() {
        BackoffError::transient(AppError::HttpClient(err))
    } else {
        BackoffError::permanent(AppError::HttpClient(err))
    }
}

/// Whether an upstream status is worth another attempt
pub fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Wrap an upstream error status, transient or permanent by status class
pub fn status_error(status: StatusCode, error: AppError) -> BackoffError<AppError> {
    if is_transient_status(status) {
        BackoffError::transient(error)
    } else {
        BackoffError::permanent(error)
    }
}

fn into_inner(err: BackoffError<AppError>) -> AppError {
    match err {
        BackoffError::Permanent(e) => e,
        BackoffError::Transient { err, .. } => err,
    }
}
