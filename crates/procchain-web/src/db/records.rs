use procchain_types::{
    OwnerId, ProcessInfo, ProcessLink, ProcessRecordView, RecordId, SnapshotId,
};
use rusqlite::{OptionalExtension, Row, named_params, params};

use crate::db::{Db, RecordStore};
use crate::error::StoreError;
use crate::util::time::{ms_to_rfc3339, now_ms, to_u32_i64, to_u64_i64};

const RECORD_COLUMNS: &str = "id, snapshot_id, owner_id, position,
    process_id, parent_process_id, process_name, thread_count, handle_count, base_priority,
    create_time, user_time, kernel_time,
    working_set_size, peak_working_set_size, virtual_size, peak_virtual_size,
    pagefile_usage, peak_pagefile_usage, page_fault_count,
    read_operation_count, write_operation_count, other_operation_count,
    read_transfer_count, write_transfer_count, other_transfer_count,
    current_process_address,
    next_record_id, next_address, next_process_name, next_process_id,
    previous_record_id, previous_address, previous_process_name, previous_process_id,
    created_at_ms, updated_at_ms";

/// A descriptor about to be stored within its snapshot. Without a
/// `position` the record lands after the last one already stored.
#[derive(Debug, Clone, Copy)]
pub struct NewProcessRecord<'a> {
    pub snapshot_id: SnapshotId,
    pub owner_id: Option<OwnerId>,
    pub position: Option<u32>,
    pub process: &'a ProcessInfo,
}

fn map_link(row: &Row<'_>, side: &str) -> rusqlite::Result<Option<ProcessLink>> {
    let Some(record_id) = row.get::<_, Option<i64>>(&*format!("{side}_record_id"))? else {
        return Ok(None);
    };
    Ok(Some(ProcessLink {
        record_id: RecordId::new(record_id),
        address: row
            .get::<_, Option<String>>(&*format!("{side}_address"))?
            .unwrap_or_default(),
        process_name: row
            .get::<_, Option<String>>(&*format!("{side}_process_name"))?
            .unwrap_or_default(),
        process_id: row
            .get::<_, Option<i64>>(&*format!("{side}_process_id"))?
            .map(to_u32_i64)
            .unwrap_or_default(),
    }))
}

fn map_record_row(row: &Row<'_>) -> rusqlite::Result<ProcessRecordView> {
    let counter = |column: &str| row.get::<_, i64>(column).map(to_u64_i64);
    let small = |column: &str| row.get::<_, i64>(column).map(to_u32_i64);
    let process = ProcessInfo {
        process_id: small("process_id")?,
        parent_process_id: small("parent_process_id")?,
        process_name: row.get("process_name")?,
        thread_count: small("thread_count")?,
        handle_count: small("handle_count")?,
        base_priority: row.get("base_priority")?,
        create_time: row.get("create_time")?,
        user_time: counter("user_time")?,
        kernel_time: counter("kernel_time")?,
        working_set_size: counter("working_set_size")?,
        peak_working_set_size: counter("peak_working_set_size")?,
        virtual_size: counter("virtual_size")?,
        peak_virtual_size: counter("peak_virtual_size")?,
        pagefile_usage: counter("pagefile_usage")?,
        peak_pagefile_usage: counter("peak_pagefile_usage")?,
        page_fault_count: small("page_fault_count")?,
        read_operation_count: counter("read_operation_count")?,
        write_operation_count: counter("write_operation_count")?,
        other_operation_count: counter("other_operation_count")?,
        read_transfer_count: counter("read_transfer_count")?,
        write_transfer_count: counter("write_transfer_count")?,
        other_transfer_count: counter("other_transfer_count")?,
        current_process_address: row.get("current_process_address")?,
    };
    Ok(ProcessRecordView {
        id: RecordId::new(row.get("id")?),
        snapshot_id: SnapshotId::new(row.get("snapshot_id")?),
        owner_id: row.get::<_, Option<i64>>("owner_id")?.map(OwnerId::new),
        position: small("position")?,
        process,
        next_process: map_link(row, "next")?,
        previous_process: map_link(row, "previous")?,
        created_at: ms_to_rfc3339(row.get("created_at_ms")?),
        updated_at: ms_to_rfc3339(row.get("updated_at_ms")?),
    })
}

impl RecordStore for Db {
    fn insert_record(&self, record: &NewProcessRecord<'_>) -> Result<ProcessLink, StoreError> {
        let process = record.process;
        let counter = |name: &str, value: u64| {
            i64::try_from(value).map_err(|_| {
                StoreError::Backend(format!(
                    "{name} {value} of pid {} does not fit a signed 64-bit column",
                    process.process_id
                ))
            })
        };
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO process_records (
                snapshot_id, owner_id, position,
                process_id, parent_process_id, process_name, thread_count, handle_count, base_priority,
                create_time, user_time, kernel_time,
                working_set_size, peak_working_set_size, virtual_size, peak_virtual_size,
                pagefile_usage, peak_pagefile_usage, page_fault_count,
                read_operation_count, write_operation_count, other_operation_count,
                read_transfer_count, write_transfer_count, other_transfer_count,
                current_process_address, created_at_ms, updated_at_ms
             ) VALUES (
                :snapshot_id, :owner_id,
                COALESCE(:position, (
                    SELECT COALESCE(MAX(position) + 1, 0)
                    FROM process_records WHERE snapshot_id = :snapshot_id
                )),
                :process_id, :parent_process_id, :process_name, :thread_count, :handle_count, :base_priority,
                :create_time, :user_time, :kernel_time,
                :working_set_size, :peak_working_set_size, :virtual_size, :peak_virtual_size,
                :pagefile_usage, :peak_pagefile_usage, :page_fault_count,
                :read_operation_count, :write_operation_count, :other_operation_count,
                :read_transfer_count, :write_transfer_count, :other_transfer_count,
                :current_process_address, :now, :now
             )",
            named_params! {
                ":snapshot_id": record.snapshot_id.get(),
                ":owner_id": record.owner_id.map(OwnerId::get),
                ":position": record.position.map(i64::from),
                ":process_id": i64::from(process.process_id),
                ":parent_process_id": i64::from(process.parent_process_id),
                ":process_name": process.process_name,
                ":thread_count": i64::from(process.thread_count),
                ":handle_count": i64::from(process.handle_count),
                ":base_priority": process.base_priority,
                ":create_time": process.create_time,
                ":user_time": counter("user_time", process.user_time)?,
                ":kernel_time": counter("kernel_time", process.kernel_time)?,
                ":working_set_size": counter("working_set_size", process.working_set_size)?,
                ":peak_working_set_size": counter("peak_working_set_size", process.peak_working_set_size)?,
                ":virtual_size": counter("virtual_size", process.virtual_size)?,
                ":peak_virtual_size": counter("peak_virtual_size", process.peak_virtual_size)?,
                ":pagefile_usage": counter("pagefile_usage", process.pagefile_usage)?,
                ":peak_pagefile_usage": counter("peak_pagefile_usage", process.peak_pagefile_usage)?,
                ":page_fault_count": i64::from(process.page_fault_count),
                ":read_operation_count": counter("read_operation_count", process.read_operation_count)?,
                ":write_operation_count": counter("write_operation_count", process.write_operation_count)?,
                ":other_operation_count": counter("other_operation_count", process.other_operation_count)?,
                ":read_transfer_count": counter("read_transfer_count", process.read_transfer_count)?,
                ":write_transfer_count": counter("write_transfer_count", process.write_transfer_count)?,
                ":other_transfer_count": counter("other_transfer_count", process.other_transfer_count)?,
                ":current_process_address": process.current_process_address,
                ":now": now_ms(),
            },
        )
        .map_err(|error| {
            StoreError::Backend(format!(
                "insert process record (pid {}, snapshot {}): {error}",
                process.process_id, record.snapshot_id
            ))
        })?;
        Ok(ProcessLink {
            record_id: RecordId::new(conn.last_insert_rowid()),
            address: process.current_process_address.clone(),
            process_name: process.process_name.clone(),
            process_id: process.process_id,
        })
    }

    fn set_next_link(&self, record: RecordId, next: &ProcessLink) -> Result<(), StoreError> {
        let conn = self.open()?;
        let changed = conn
            .execute(
                "UPDATE process_records
                 SET next_record_id = ?2, next_address = ?3, next_process_name = ?4,
                     next_process_id = ?5, updated_at_ms = ?6
                 WHERE id = ?1",
                params![
                    record.get(),
                    next.record_id.get(),
                    next.address,
                    next.process_name,
                    i64::from(next.process_id),
                    now_ms(),
                ],
            )
            .map_err(|error| StoreError::Backend(format!("link record {record} forward: {error}")))?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("process record {record}")));
        }
        Ok(())
    }

    fn set_previous_link(
        &self,
        record: RecordId,
        previous: &ProcessLink,
    ) -> Result<(), StoreError> {
        let conn = self.open()?;
        let changed = conn
            .execute(
                "UPDATE process_records
                 SET previous_record_id = ?2, previous_address = ?3, previous_process_name = ?4,
                     previous_process_id = ?5, updated_at_ms = ?6
                 WHERE id = ?1",
                params![
                    record.get(),
                    previous.record_id.get(),
                    previous.address,
                    previous.process_name,
                    i64::from(previous.process_id),
                    now_ms(),
                ],
            )
            .map_err(|error| {
                StoreError::Backend(format!("link record {record} backward: {error}"))
            })?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("process record {record}")));
        }
        Ok(())
    }
}

impl Db {
    fn select_records(
        &self,
        filter: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<ProcessRecordView>, StoreError> {
        let conn = self.open()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {RECORD_COLUMNS} FROM process_records {filter}"
            ))
            .map_err(|error| StoreError::Backend(format!("prepare record read: {error}")))?;
        stmt.query_map(params, map_record_row)
            .map_err(|error| StoreError::Backend(format!("query process_records: {error}")))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|error| StoreError::Backend(format!("read process record row: {error}")))
    }

    /// Unscoped lookup; callers run the result through the authorization guard.
    pub fn get_record(&self, id: RecordId) -> Result<ProcessRecordView, StoreError> {
        let conn = self.open()?;
        conn.query_row(
            &format!("SELECT {RECORD_COLUMNS} FROM process_records WHERE id = ?1"),
            params![id.get()],
            map_record_row,
        )
        .optional()
        .map_err(|error| StoreError::Backend(format!("read process record {id}: {error}")))?
        .ok_or_else(|| StoreError::NotFound(format!("process record {id}")))
    }

    pub fn list_records(&self, owner: OwnerId) -> Result<Vec<ProcessRecordView>, StoreError> {
        self.select_records(
            "WHERE owner_id = ?1 ORDER BY snapshot_id DESC, position ASC",
            params![owner.get()],
        )
    }

    pub fn list_records_by_pid(
        &self,
        owner: OwnerId,
        process_id: u32,
    ) -> Result<Vec<ProcessRecordView>, StoreError> {
        self.select_records(
            "WHERE owner_id = ?1 AND process_id = ?2 ORDER BY created_at_ms DESC, id DESC",
            params![owner.get(), i64::from(process_id)],
        )
    }

    /// Records of one snapshot in source emission order.
    pub fn list_snapshot_records(
        &self,
        snapshot: SnapshotId,
    ) -> Result<Vec<ProcessRecordView>, StoreError> {
        self.select_records(
            "WHERE snapshot_id = ?1 ORDER BY position ASC, id ASC",
            params![snapshot.get()],
        )
    }

    /// Deletes one record. Neighbours keep their now-dangling links.
    pub fn delete_record(&self, id: RecordId, owner: OwnerId) -> Result<(), StoreError> {
        let conn = self.open()?;
        let deleted = conn
            .execute(
                "DELETE FROM process_records WHERE id = ?1 AND owner_id = ?2",
                params![id.get(), owner.get()],
            )
            .map_err(|error| StoreError::Backend(format!("delete process record {id}: {error}")))?;
        if deleted == 0 {
            return Err(StoreError::NotFound(format!("process record {id}")));
        }
        Ok(())
    }
}
