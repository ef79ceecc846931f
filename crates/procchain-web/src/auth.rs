//! Caller identity and the ownership guard.
//!
//! Bearer tokens are verified by the gateway in front of this service, which
//! forwards the owner id in a header. No header (or a value that is not an
//! integer) means the caller is anonymous.

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::header::HeaderName;
use axum::http::request::Parts;
use procchain_types::OwnerId;

use crate::app::AppState;
use crate::error::ServiceError;

pub const DEFAULT_OWNER_HEADER: &str = "x-owner-id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller(pub Option<OwnerId>);

impl Caller {
    pub fn owner(self) -> Option<OwnerId> {
        self.0
    }

    /// For endpoints that never serve anonymous callers.
    pub fn require(self) -> Result<OwnerId, ServiceError> {
        self.0.ok_or(ServiceError::Unauthenticated)
    }
}

pub fn owner_from_headers(headers: &HeaderMap, name: &HeaderName) -> Option<OwnerId> {
    let value = headers.get(name)?.to_str().ok()?;
    value.trim().parse::<i64>().ok().map(OwnerId::new)
}

impl FromRequestParts<AppState> for Caller {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(Caller(owner_from_headers(&parts.headers, &state.owner_header)))
    }
}

/// Grants access only when both sides carry the same owner. Rows stored for
/// anonymous callers match nobody.
pub fn authorize(
    caller: Option<OwnerId>,
    resource_owner: Option<OwnerId>,
    resource: &str,
) -> Result<(), ServiceError> {
    match (caller, resource_owner) {
        (Some(caller), Some(owner)) if caller == owner => Ok(()),
        (None, _) => Err(ServiceError::AccessDenied(format!(
            "{resource} requires an authenticated owner"
        ))),
        _ => Err(ServiceError::AccessDenied(format!(
            "{resource} belongs to another owner"
        ))),
    }
}
