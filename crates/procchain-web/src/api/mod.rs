use axum::extract::Path as AxumPath;
use axum::extract::rejection::PathRejection;

use crate::error::ServiceError;

pub mod processes;
pub mod snapshots;
pub mod statistics;
pub mod webhook;

/// Runs storage or agent work on the blocking pool.
pub(crate) async fn run_blocking<T, F>(work: F) -> Result<T, ServiceError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ServiceError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .unwrap_or_else(|error| Err(ServiceError::Storage(format!("join blocking task: {error}"))))
}

pub(crate) fn path_value<T>(raw: Result<AxumPath<T>, PathRejection>) -> Result<T, ServiceError> {
    raw.map(|AxumPath(value)| value)
        .map_err(|rejection| ServiceError::Validation(format!("invalid path parameter: {rejection}")))
}
