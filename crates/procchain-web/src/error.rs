use std::fmt;

use axum::http::StatusCode;

/// Storage-layer failure. `NotFound` is kept apart so callers can tell a
/// missing (or foreign-owned) row from a broken database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    NotFound(String),
    Backend(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound(what) => write!(f, "not found: {what}"),
            StoreError::Backend(message) => write!(f, "storage error: {message}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(error: rusqlite::Error) -> Self {
        StoreError::Backend(error.to_string())
    }
}

impl From<String> for StoreError {
    fn from(message: String) -> Self {
        StoreError::Backend(message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    Validation(String),
    Unauthenticated,
    Upstream(String),
    Decode(String),
    AccessDenied(String),
    NotFound(String),
    Storage(String),
}

impl ServiceError {
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "validation",
            ServiceError::Unauthenticated => "unauthenticated",
            ServiceError::Upstream(_) => "upstream",
            ServiceError::Decode(_) => "decode",
            ServiceError::AccessDenied(_) => "access_denied",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::Storage(_) => "storage",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ServiceError::Upstream(_) | ServiceError::Decode(_) => StatusCode::BAD_GATEWAY,
            ServiceError::AccessDenied(_) => StatusCode::FORBIDDEN,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceError::Validation(message) => write!(f, "invalid request: {message}"),
            ServiceError::Unauthenticated => write!(f, "caller is not authenticated"),
            ServiceError::Upstream(message) => write!(f, "agent request failed: {message}"),
            ServiceError::Decode(message) => write!(f, "agent response malformed: {message}"),
            ServiceError::AccessDenied(message) => write!(f, "access denied: {message}"),
            ServiceError::NotFound(what) => write!(f, "not found: {what}"),
            ServiceError::Storage(message) => write!(f, "storage error: {message}"),
        }
    }
}

impl std::error::Error for ServiceError {}

impl From<StoreError> for ServiceError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound(what) => ServiceError::NotFound(what),
            StoreError::Backend(message) => ServiceError::Storage(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_onto_service_kinds() {
        let missing: ServiceError = StoreError::NotFound("snapshot 9".into()).into();
        assert_eq!(missing.kind(), "not_found");
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let broken: ServiceError = StoreError::Backend("disk I/O error".into()).into();
        assert_eq!(broken.kind(), "storage");
        assert_eq!(broken.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn upstream_and_decode_are_gateway_failures() {
        assert_eq!(
            ServiceError::Upstream("timeout".into()).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ServiceError::Decode("missing field".into()).status(),
            StatusCode::BAD_GATEWAY
        );
    }
}
