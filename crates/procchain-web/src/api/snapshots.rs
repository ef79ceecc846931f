use axum::extract::rejection::PathRejection;
use axum::extract::{Path as AxumPath, State};
use axum::response::Response;
use procchain_types::{SnapshotId, SnapshotKind};

use crate::api::{path_value, run_blocking};
use crate::app::AppState;
use crate::auth::Caller;
use crate::error::ServiceError;
use crate::history;
use crate::util::http::{json_result, no_content};

fn snapshot_id(raw: Result<AxumPath<i64>, PathRejection>) -> Result<SnapshotId, ServiceError> {
    path_value(raw).map(SnapshotId::new)
}

pub async fn api_snapshots(State(state): State<AppState>, caller: Caller) -> Response {
    json_result(
        async move {
            let owner = caller.require()?;
            run_blocking(move || history::list_snapshots(&state.db, owner, None)).await
        }
        .await,
    )
}

pub async fn api_snapshots_by_kind(
    State(state): State<AppState>,
    caller: Caller,
    kind: Result<AxumPath<String>, PathRejection>,
) -> Response {
    json_result(
        async move {
            let owner = caller.require()?;
            let kind = path_value(kind)?
                .parse::<SnapshotKind>()
                .map_err(ServiceError::Validation)?;
            run_blocking(move || history::list_snapshots(&state.db, owner, Some(kind))).await
        }
        .await,
    )
}

pub async fn api_snapshot(
    State(state): State<AppState>,
    caller: Caller,
    id: Result<AxumPath<i64>, PathRejection>,
) -> Response {
    json_result(
        async move {
            let owner = caller.require()?;
            let id = snapshot_id(id)?;
            run_blocking(move || history::snapshot(&state.db, owner, id)).await
        }
        .await,
    )
}

pub async fn api_snapshot_processes(
    State(state): State<AppState>,
    caller: Caller,
    id: Result<AxumPath<i64>, PathRejection>,
) -> Response {
    json_result(
        async move {
            let owner = caller.require()?;
            let id = snapshot_id(id)?;
            run_blocking(move || history::snapshot_processes(&state.db, owner, id)).await
        }
        .await,
    )
}

pub async fn api_snapshot_chain(
    State(state): State<AppState>,
    caller: Caller,
    id: Result<AxumPath<i64>, PathRejection>,
) -> Response {
    json_result(
        async move {
            let owner = caller.require()?;
            let id = snapshot_id(id)?;
            run_blocking(move || history::snapshot_chain(&state.db, owner, id)).await
        }
        .await,
    )
}

pub async fn api_snapshot_queries(
    State(state): State<AppState>,
    caller: Caller,
    id: Result<AxumPath<i64>, PathRejection>,
) -> Response {
    json_result(
        async move {
            let owner = caller.require()?;
            let id = snapshot_id(id)?;
            run_blocking(move || history::snapshot_queries(&state.db, owner, id)).await
        }
        .await,
    )
}

pub async fn api_delete_snapshot(
    State(state): State<AppState>,
    caller: Caller,
    id: Result<AxumPath<i64>, PathRejection>,
) -> Response {
    no_content(
        async move {
            let owner = caller.require()?;
            let id = snapshot_id(id)?;
            run_blocking(move || history::delete_snapshot(&state.db, owner, id)).await
        }
        .await,
    )
}
