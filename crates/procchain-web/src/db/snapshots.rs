use procchain_types::{OwnerId, SnapshotId, SnapshotKind, SnapshotView};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::db::{Db, SnapshotStore};
use crate::error::StoreError;
use crate::util::time::{ms_to_rfc3339, now_ms, to_u32_i64};

const SNAPSHOT_COLUMNS: &str = "id, owner_id, source_url, kind, process_count, success, error, created_at_ms, updated_at_ms";

/// Header row for a new snapshot. The constructors keep `success` and
/// `error` consistent.
#[derive(Debug, Clone)]
pub struct NewSnapshot {
    owner_id: Option<OwnerId>,
    source_url: String,
    kind: SnapshotKind,
    process_count: u32,
    error: Option<String>,
}

impl NewSnapshot {
    pub fn succeeded(
        owner_id: Option<OwnerId>,
        source_url: impl Into<String>,
        kind: SnapshotKind,
        process_count: u32,
    ) -> Self {
        Self {
            owner_id,
            source_url: source_url.into(),
            kind,
            process_count,
            error: None,
        }
    }

    pub fn failed(
        owner_id: Option<OwnerId>,
        source_url: impl Into<String>,
        kind: SnapshotKind,
        error: impl Into<String>,
    ) -> Self {
        Self {
            owner_id,
            source_url: source_url.into(),
            kind,
            process_count: 0,
            error: Some(error.into()),
        }
    }
}

fn map_snapshot_row(row: &Row<'_>) -> rusqlite::Result<SnapshotView> {
    let kind: String = row.get(3)?;
    let kind = kind.parse::<SnapshotKind>().map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, error.into())
    })?;
    Ok(SnapshotView {
        id: SnapshotId::new(row.get(0)?),
        owner_id: row.get::<_, Option<i64>>(1)?.map(OwnerId::new),
        source_url: row.get(2)?,
        kind,
        process_count: to_u32_i64(row.get(4)?),
        success: row.get(5)?,
        error: row.get(6)?,
        created_at: ms_to_rfc3339(row.get(7)?),
        updated_at: ms_to_rfc3339(row.get(8)?),
    })
}

fn load_snapshot(conn: &Connection, id: SnapshotId) -> Result<SnapshotView, StoreError> {
    conn.query_row(
        &format!("SELECT {SNAPSHOT_COLUMNS} FROM snapshots WHERE id = ?1"),
        params![id.get()],
        map_snapshot_row,
    )
    .optional()
    .map_err(|error| StoreError::Backend(format!("read snapshot {id}: {error}")))?
    .ok_or_else(|| StoreError::NotFound(format!("snapshot {id}")))
}

impl SnapshotStore for Db {
    fn create_snapshot(&self, snapshot: &NewSnapshot) -> Result<SnapshotView, StoreError> {
        let conn = self.open()?;
        let now = now_ms();
        conn.execute(
            "INSERT INTO snapshots (
                owner_id, source_url, kind, process_count, success, error, created_at_ms, updated_at_ms
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![
                snapshot.owner_id.map(OwnerId::get),
                snapshot.source_url,
                snapshot.kind.as_str(),
                i64::from(snapshot.process_count),
                snapshot.error.is_none(),
                snapshot.error,
                now,
            ],
        )
        .map_err(|error| StoreError::Backend(format!("insert snapshot: {error}")))?;
        load_snapshot(&conn, SnapshotId::new(conn.last_insert_rowid()))
    }

    fn get_snapshot(&self, id: SnapshotId) -> Result<SnapshotView, StoreError> {
        let conn = self.open()?;
        load_snapshot(&conn, id)
    }

    fn finalize_process_count(
        &self,
        id: SnapshotId,
        owner: OwnerId,
        process_count: u32,
    ) -> Result<SnapshotView, StoreError> {
        let conn = self.open()?;
        let changed = conn
            .execute(
                "UPDATE snapshots SET process_count = ?3, updated_at_ms = ?4
                 WHERE id = ?1 AND owner_id = ?2",
                params![id.get(), owner.get(), i64::from(process_count), now_ms()],
            )
            .map_err(|error| StoreError::Backend(format!("finalize snapshot {id}: {error}")))?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("snapshot {id}")));
        }
        load_snapshot(&conn, id)
    }

    fn increment_process_count(
        &self,
        id: SnapshotId,
        owner: OwnerId,
    ) -> Result<SnapshotView, StoreError> {
        let conn = self.open()?;
        let changed = conn
            .execute(
                "UPDATE snapshots SET process_count = process_count + 1, updated_at_ms = ?3
                 WHERE id = ?1 AND owner_id = ?2",
                params![id.get(), owner.get(), now_ms()],
            )
            .map_err(|error| StoreError::Backend(format!("increment snapshot {id}: {error}")))?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("snapshot {id}")));
        }
        load_snapshot(&conn, id)
    }

    fn mark_snapshot_failed(
        &self,
        id: SnapshotId,
        owner: OwnerId,
        error: &str,
    ) -> Result<SnapshotView, StoreError> {
        let conn = self.open()?;
        let changed = conn
            .execute(
                "UPDATE snapshots
                 SET success = 0, error = ?3, updated_at_ms = ?4,
                     process_count = (SELECT COUNT(*) FROM process_records WHERE snapshot_id = ?1)
                 WHERE id = ?1 AND owner_id = ?2",
                params![id.get(), owner.get(), error, now_ms()],
            )
            .map_err(|e| StoreError::Backend(format!("mark snapshot {id} failed: {e}")))?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("snapshot {id}")));
        }
        load_snapshot(&conn, id)
    }
}

impl Db {
    /// Newest first.
    pub fn list_snapshots(
        &self,
        owner: OwnerId,
        kind: Option<SnapshotKind>,
    ) -> Result<Vec<SnapshotView>, StoreError> {
        let conn = self.open()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {SNAPSHOT_COLUMNS} FROM snapshots
                 WHERE owner_id = ?1 AND (?2 IS NULL OR kind = ?2)
                 ORDER BY created_at_ms DESC, id DESC"
            ))
            .map_err(|error| StoreError::Backend(format!("prepare snapshot list: {error}")))?;
        stmt.query_map(
            params![owner.get(), kind.map(SnapshotKind::as_str)],
            map_snapshot_row,
        )
        .map_err(|error| StoreError::Backend(format!("query snapshots: {error}")))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|error| StoreError::Backend(format!("read snapshot row: {error}")))
    }

    /// Removes the snapshot together with its process and query records.
    pub fn delete_snapshot(&self, id: SnapshotId, owner: OwnerId) -> Result<(), StoreError> {
        let conn = self.open()?;
        let deleted = conn
            .execute(
                "DELETE FROM snapshots WHERE id = ?1 AND owner_id = ?2",
                params![id.get(), owner.get()],
            )
            .map_err(|error| StoreError::Backend(format!("delete snapshot {id}: {error}")))?;
        if deleted == 0 {
            return Err(StoreError::NotFound(format!("snapshot {id}")));
        }
        Ok(())
    }
}
