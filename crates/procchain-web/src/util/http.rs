use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use procchain_types::ApiError;
use serde::Serialize;
use tracing::warn;

use crate::error::ServiceError;

pub fn json_ok<T: Serialize>(value: &T) -> Response {
    json_with_status(StatusCode::OK, value)
}

pub fn json_error(error: &ServiceError) -> Response {
    json_with_status(
        error.status(),
        &ApiError {
            kind: String::from(error.kind()),
            error: error.to_string(),
        },
    )
}

pub fn json_result<T: Serialize>(result: Result<T, ServiceError>) -> Response {
    match result {
        Ok(value) => json_ok(&value),
        Err(error) => error.into_response(),
    }
}

pub fn no_content(result: Result<(), ServiceError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error.into_response(),
    }
}

pub fn json_with_status<T: Serialize>(status: StatusCode, value: &T) -> Response {
    match serde_json::to_string(value) {
        Ok(body) => (
            status,
            [(header::CONTENT_TYPE, "application/json; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(error) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            format!("json encode error: {error}"),
        )
            .into_response(),
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        if self.status().is_server_error() {
            warn!(kind = self.kind(), error = %self, "request failed");
        }
        json_error(&self)
    }
}
