use procchain_types::{
    MostQueriedProcess, OwnerId, SnapshotKind, SnapshotOutcomeCounts, StatisticsResponse,
};
use rusqlite::{Connection, params};

use crate::db::Db;
use crate::error::StoreError;
use crate::util::time::{ms_to_rfc3339, to_u32_i64, to_u64_i64};

pub const DEFAULT_TOP_PROCESSES: u32 = 10;
pub const MAX_TOP_PROCESSES: u32 = 100;

/// Read-only rollup of one owner's history. Any failing sub-query aborts the
/// whole computation.
pub fn compute_statistics(
    db: &Db,
    owner: OwnerId,
    limit: Option<u32>,
) -> Result<StatisticsResponse, StoreError> {
    let limit = limit
        .unwrap_or(DEFAULT_TOP_PROCESSES)
        .clamp(1, MAX_TOP_PROCESSES);
    let conn = db.open()?;

    Ok(StatisticsResponse {
        total_processes: count_owned(&conn, "process_records", owner)?,
        total_snapshots: count_owned(&conn, "snapshots", owner)?,
        total_queries: count_owned(&conn, "query_records", owner)?,
        most_queried_processes: most_queried(&conn, owner, limit)?,
        snapshot_outcomes: snapshot_outcomes(&conn, owner)?,
    })
}

fn count_owned(conn: &Connection, table: &str, owner: OwnerId) -> Result<u64, StoreError> {
    let count: i64 = conn
        .query_row(
            &format!("SELECT COUNT(*) FROM {table} WHERE owner_id = ?1"),
            params![owner.get()],
            |row| row.get(0),
        )
        .map_err(|error| StoreError::Backend(format!("count {table}: {error}")))?;
    Ok(to_u64_i64(count))
}

fn most_queried(
    conn: &Connection,
    owner: OwnerId,
    limit: u32,
) -> Result<Vec<MostQueriedProcess>, StoreError> {
    let mut stmt = conn
        .prepare(
            "SELECT
                pr.process_id,
                COUNT(*) AS query_count,
                MAX(q.created_at_ms) AS last_queried_ms,
                (
                    SELECT pr2.process_name
                    FROM query_records q2
                    JOIN process_records pr2 ON pr2.id = q2.process_record_id
                    WHERE q2.owner_id = ?1 AND q2.success = 1 AND pr2.process_id = pr.process_id
                    ORDER BY q2.created_at_ms DESC, q2.id DESC
                    LIMIT 1
                ) AS process_name
             FROM query_records q
             JOIN process_records pr ON pr.id = q.process_record_id
             WHERE q.owner_id = ?1 AND q.success = 1
             GROUP BY pr.process_id
             ORDER BY query_count DESC, last_queried_ms DESC, pr.process_id ASC
             LIMIT ?2",
        )
        .map_err(|error| StoreError::Backend(format!("prepare most queried: {error}")))?;
    stmt.query_map(params![owner.get(), i64::from(limit)], |row| {
        Ok(MostQueriedProcess {
            process_id: to_u32_i64(row.get(0)?),
            query_count: to_u64_i64(row.get(1)?),
            last_queried_at: ms_to_rfc3339(row.get(2)?),
            process_name: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        })
    })
    .map_err(|error| StoreError::Backend(format!("query most queried: {error}")))?
    .collect::<Result<Vec<_>, _>>()
    .map_err(|error| StoreError::Backend(format!("read most queried row: {error}")))
}

fn snapshot_outcomes(
    conn: &Connection,
    owner: OwnerId,
) -> Result<Vec<SnapshotOutcomeCounts>, StoreError> {
    let mut stmt = conn
        .prepare(
            "SELECT kind, SUM(success), SUM(1 - success)
             FROM snapshots
             WHERE owner_id = ?1
             GROUP BY kind",
        )
        .map_err(|error| StoreError::Backend(format!("prepare snapshot outcomes: {error}")))?;
    let rows = stmt
        .query_map(params![owner.get()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })
        .map_err(|error| StoreError::Backend(format!("query snapshot outcomes: {error}")))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|error| StoreError::Backend(format!("read snapshot outcome row: {error}")))?;

    Ok(SnapshotKind::ALL
        .into_iter()
        .map(|kind| {
            let (succeeded, failed) = rows
                .iter()
                .find(|(stored, _, _)| stored == kind.as_str())
                .map(|(_, ok, failed)| (to_u64_i64(*ok), to_u64_i64(*failed)))
                .unwrap_or((0, 0));
            SnapshotOutcomeCounts {
                kind,
                succeeded,
                failed,
            }
        })
        .collect())
}
