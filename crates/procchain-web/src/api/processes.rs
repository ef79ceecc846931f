use axum::extract::rejection::PathRejection;
use axum::extract::{Path as AxumPath, State};
use axum::response::Response;
use procchain_types::RecordId;

use crate::api::{path_value, run_blocking};
use crate::app::AppState;
use crate::auth::Caller;
use crate::error::ServiceError;
use crate::history;
use crate::util::http::{json_result, no_content};

fn record_id(raw: Result<AxumPath<i64>, PathRejection>) -> Result<RecordId, ServiceError> {
    path_value(raw).map(RecordId::new)
}

pub async fn api_records(State(state): State<AppState>, caller: Caller) -> Response {
    json_result(
        async move {
            let owner = caller.require()?;
            run_blocking(move || history::list_records(&state.db, owner)).await
        }
        .await,
    )
}

pub async fn api_record(
    State(state): State<AppState>,
    caller: Caller,
    id: Result<AxumPath<i64>, PathRejection>,
) -> Response {
    json_result(
        async move {
            let owner = caller.require()?;
            let id = record_id(id)?;
            run_blocking(move || history::record(&state.db, owner, id)).await
        }
        .await,
    )
}

pub async fn api_records_by_pid(
    State(state): State<AppState>,
    caller: Caller,
    pid: Result<AxumPath<u32>, PathRejection>,
) -> Response {
    json_result(
        async move {
            let owner = caller.require()?;
            let pid = path_value(pid)?;
            run_blocking(move || history::records_by_pid(&state.db, owner, pid)).await
        }
        .await,
    )
}

pub async fn api_delete_record(
    State(state): State<AppState>,
    caller: Caller,
    id: Result<AxumPath<i64>, PathRejection>,
) -> Response {
    no_content(
        async move {
            let owner = caller.require()?;
            let id = record_id(id)?;
            run_blocking(move || history::delete_record(&state.db, owner, id)).await
        }
        .await,
    )
}

pub async fn api_query_history(State(state): State<AppState>, caller: Caller) -> Response {
    json_result(
        async move {
            let owner = caller.require()?;
            run_blocking(move || history::query_history(&state.db, owner)).await
        }
        .await,
    )
}
