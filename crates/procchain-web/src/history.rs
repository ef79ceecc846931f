//! Owner-scoped reads and deletes over stored history.
//!
//! Lookups by id load the row unscoped and run it through [`authorize`], so a
//! foreign row answers 403 and a missing one 404.

use procchain_types::{
    OwnerId, ProcessRecordView, QueryRecordView, RecordId, SnapshotId, SnapshotKind,
    SnapshotProcessesResponse, SnapshotQueriesResponse, SnapshotView,
};

use crate::auth::authorize;
use crate::chain::traverse;
use crate::db::{Db, SnapshotStore};
use crate::error::{ServiceError, StoreError};

pub fn list_snapshots(
    db: &Db,
    owner: OwnerId,
    kind: Option<SnapshotKind>,
) -> Result<Vec<SnapshotView>, ServiceError> {
    Ok(db.list_snapshots(owner, kind)?)
}

pub fn snapshot(db: &Db, owner: OwnerId, id: SnapshotId) -> Result<SnapshotView, ServiceError> {
    let snapshot = db.get_snapshot(id)?;
    authorize(Some(owner), snapshot.owner_id, &format!("snapshot {id}"))?;
    Ok(snapshot)
}

/// Records in the order the agent emitted them.
pub fn snapshot_processes(
    db: &Db,
    owner: OwnerId,
    id: SnapshotId,
) -> Result<SnapshotProcessesResponse, ServiceError> {
    let snapshot = snapshot(db, owner, id)?;
    let processes = db.list_snapshot_records(id)?;
    Ok(SnapshotProcessesResponse {
        snapshot,
        processes,
    })
}

/// Records in the order their adjacency links describe.
pub fn snapshot_chain(
    db: &Db,
    owner: OwnerId,
    id: SnapshotId,
) -> Result<SnapshotProcessesResponse, ServiceError> {
    let snapshot = snapshot(db, owner, id)?;
    let processes = traverse(db.list_snapshot_records(id)?);
    Ok(SnapshotProcessesResponse {
        snapshot,
        processes,
    })
}

pub fn snapshot_queries(
    db: &Db,
    owner: OwnerId,
    id: SnapshotId,
) -> Result<SnapshotQueriesResponse, ServiceError> {
    let snapshot = snapshot(db, owner, id)?;
    let queries = db.list_snapshot_queries(id)?;
    Ok(SnapshotQueriesResponse { snapshot, queries })
}

pub fn delete_snapshot(db: &Db, owner: OwnerId, id: SnapshotId) -> Result<(), ServiceError> {
    snapshot(db, owner, id)?;
    Ok(db.delete_snapshot(id, owner)?)
}

pub fn list_records(db: &Db, owner: OwnerId) -> Result<Vec<ProcessRecordView>, ServiceError> {
    Ok(db.list_records(owner)?)
}

pub fn record(db: &Db, owner: OwnerId, id: RecordId) -> Result<ProcessRecordView, ServiceError> {
    let record = db.get_record(id)?;
    authorize(Some(owner), record.owner_id, &format!("process record {id}"))?;
    Ok(record)
}

pub fn records_by_pid(
    db: &Db,
    owner: OwnerId,
    process_id: u32,
) -> Result<Vec<ProcessRecordView>, ServiceError> {
    Ok(db.list_records_by_pid(owner, process_id)?)
}

/// Neighbour links pointing at the deleted record are left in place.
pub fn delete_record(db: &Db, owner: OwnerId, id: RecordId) -> Result<(), ServiceError> {
    record(db, owner, id)?;
    Ok(db.delete_record(id, owner)?)
}

/// Every lookup of the owner, newest first, with the stored record embedded
/// when it still exists.
pub fn query_history(db: &Db, owner: OwnerId) -> Result<Vec<QueryRecordView>, ServiceError> {
    let mut queries = db.list_queries(owner)?;
    for query in &mut queries {
        let Some(record_id) = query.process_record_id else {
            continue;
        };
        query.process = match db.get_record(record_id) {
            Ok(record) if record.owner_id == Some(owner) => Some(record),
            Ok(_) | Err(StoreError::NotFound(_)) => None,
            Err(error) => return Err(error.into()),
        };
    }
    Ok(queries)
}
