use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::response::Response;
use serde::Deserialize;

use crate::api::run_blocking;
use crate::app::AppState;
use crate::auth::Caller;
use crate::error::ServiceError;
use crate::stats::compute_statistics;
use crate::util::http::json_result;

#[derive(Debug, Deserialize)]
pub struct StatisticsParams {
    #[serde(default)]
    limit: Option<u32>,
}

pub async fn api_statistics(
    State(state): State<AppState>,
    caller: Caller,
    params: Result<Query<StatisticsParams>, QueryRejection>,
) -> Response {
    json_result(
        async move {
            let owner = caller.require()?;
            let Query(params) = params.map_err(|rejection| {
                ServiceError::Validation(format!("invalid query string: {rejection}"))
            })?;
            run_blocking(move || {
                compute_statistics(&state.db, owner, params.limit).map_err(ServiceError::from)
            })
            .await
        }
        .await,
    )
}
