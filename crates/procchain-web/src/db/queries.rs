use procchain_types::{OwnerId, QueryId, QueryRecordView, RecordId, SnapshotId};
use rusqlite::{Row, params};

use crate::db::{Db, QueryStore};
use crate::error::StoreError;
use crate::util::time::{ms_to_rfc3339, now_ms, to_u32_i64};

const QUERY_COLUMNS: &str = "id, snapshot_id, owner_id, source_url, requested_pid, process_record_id, success, error, created_at_ms";

/// One single-pid lookup, successful or not.
#[derive(Debug, Clone)]
pub struct NewQueryRecord {
    owner_id: Option<OwnerId>,
    snapshot_id: Option<SnapshotId>,
    source_url: String,
    requested_pid: u32,
    outcome: Result<RecordId, String>,
}

impl NewQueryRecord {
    pub fn succeeded(
        owner_id: Option<OwnerId>,
        snapshot_id: SnapshotId,
        source_url: impl Into<String>,
        requested_pid: u32,
        record_id: RecordId,
    ) -> Self {
        Self {
            owner_id,
            snapshot_id: Some(snapshot_id),
            source_url: source_url.into(),
            requested_pid,
            outcome: Ok(record_id),
        }
    }

    /// `snapshot_id` is absent when the lookup failed before any snapshot
    /// could be created or chosen.
    pub fn failed(
        owner_id: Option<OwnerId>,
        snapshot_id: Option<SnapshotId>,
        source_url: impl Into<String>,
        requested_pid: u32,
        error: impl Into<String>,
    ) -> Self {
        Self {
            owner_id,
            snapshot_id,
            source_url: source_url.into(),
            requested_pid,
            outcome: Err(error.into()),
        }
    }
}

fn map_query_row(row: &Row<'_>) -> rusqlite::Result<QueryRecordView> {
    Ok(QueryRecordView {
        id: QueryId::new(row.get(0)?),
        snapshot_id: row.get::<_, Option<i64>>(1)?.map(SnapshotId::new),
        owner_id: row.get::<_, Option<i64>>(2)?.map(OwnerId::new),
        source_url: row.get(3)?,
        requested_pid: to_u32_i64(row.get(4)?),
        process_record_id: row.get::<_, Option<i64>>(5)?.map(RecordId::new),
        success: row.get(6)?,
        error: row.get(7)?,
        created_at: ms_to_rfc3339(row.get(8)?),
        process: None,
    })
}

impl QueryStore for Db {
    fn insert_query(&self, query: &NewQueryRecord) -> Result<QueryRecordView, StoreError> {
        let conn = self.open()?;
        let (record_id, error) = match &query.outcome {
            Ok(record_id) => (Some(record_id.get()), None),
            Err(error) => (None, Some(error.as_str())),
        };
        conn.execute(
            "INSERT INTO query_records (
                snapshot_id, owner_id, source_url, requested_pid, process_record_id,
                success, error, created_at_ms
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                query.snapshot_id.map(SnapshotId::get),
                query.owner_id.map(OwnerId::get),
                query.source_url,
                i64::from(query.requested_pid),
                record_id,
                query.outcome.is_ok(),
                error,
                now_ms(),
            ],
        )
        .map_err(|error| {
            StoreError::Backend(format!(
                "insert query record for pid {}: {error}",
                query.requested_pid
            ))
        })?;
        let id = conn.last_insert_rowid();
        conn.query_row(
            &format!("SELECT {QUERY_COLUMNS} FROM query_records WHERE id = ?1"),
            params![id],
            map_query_row,
        )
        .map_err(|error| StoreError::Backend(format!("reload query record {id}: {error}")))
    }
}

impl Db {
    fn select_queries(
        &self,
        filter: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<QueryRecordView>, StoreError> {
        let conn = self.open()?;
        let mut stmt = conn
            .prepare(&format!("SELECT {QUERY_COLUMNS} FROM query_records {filter}"))
            .map_err(|error| StoreError::Backend(format!("prepare query read: {error}")))?;
        stmt.query_map(params, map_query_row)
            .map_err(|error| StoreError::Backend(format!("query query_records: {error}")))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|error| StoreError::Backend(format!("read query record row: {error}")))
    }

    /// Newest first, successful and failed alike.
    pub fn list_queries(&self, owner: OwnerId) -> Result<Vec<QueryRecordView>, StoreError> {
        self.select_queries(
            "WHERE owner_id = ?1 ORDER BY created_at_ms DESC, id DESC",
            params![owner.get()],
        )
    }

    pub fn list_snapshot_queries(
        &self,
        snapshot: SnapshotId,
    ) -> Result<Vec<QueryRecordView>, StoreError> {
        self.select_queries(
            "WHERE snapshot_id = ?1 ORDER BY created_at_ms ASC, id ASC",
            params![snapshot.get()],
        )
    }
}
