use axum::body::Bytes;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::response::Response;
use procchain_types::ProcessByPidBody;
use serde::Deserialize;
use tracing::info;

use crate::api::run_blocking;
use crate::app::AppState;
use crate::auth::Caller;
use crate::error::ServiceError;
use crate::ingest::{IngestRequest, ingest};
use crate::util::http::json_result;

#[derive(Debug, Deserialize)]
pub struct WebhookParams {
    #[serde(default)]
    webhookurl: Option<String>,
}

fn webhook_url(params: Result<Query<WebhookParams>, QueryRejection>) -> Result<String, ServiceError> {
    let Query(params) = params
        .map_err(|rejection| ServiceError::Validation(format!("invalid query string: {rejection}")))?;
    params
        .webhookurl
        .filter(|url| !url.trim().is_empty())
        .ok_or_else(|| ServiceError::Validation(String::from("webhookurl query parameter is required")))
}

pub async fn api_iterate_processes(
    State(state): State<AppState>,
    caller: Caller,
    params: Result<Query<WebhookParams>, QueryRejection>,
) -> Response {
    let source_url = match webhook_url(params) {
        Ok(url) => url,
        Err(error) => return json_result::<()>(Err(error)),
    };
    info!(%source_url, anonymous = caller.owner().is_none(), "process enumeration requested");

    let AppState { db, source, .. } = state;
    json_result(
        run_blocking(move || {
            ingest(&*db, &*source, IngestRequest::iteration(source_url, caller.owner()))
        })
        .await,
    )
}

pub async fn api_process_by_pid(
    State(state): State<AppState>,
    caller: Caller,
    params: Result<Query<WebhookParams>, QueryRejection>,
    body: Bytes,
) -> Response {
    let source_url = match webhook_url(params) {
        Ok(url) => url,
        Err(error) => return json_result::<()>(Err(error)),
    };
    let request: ProcessByPidBody = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            return json_result::<()>(Err(ServiceError::Validation(format!(
                "invalid request json: {e}"
            ))));
        }
    };
    info!(
        %source_url,
        pid = request.pid,
        anonymous = caller.owner().is_none(),
        "process lookup requested"
    );

    let AppState { db, source, .. } = state;
    json_result(
        run_blocking(move || {
            ingest(
                &*db,
                &*source,
                IngestRequest::query(source_url, request.pid, request.snapshot_id, caller.owner()),
            )
        })
        .await,
    )
}
