use rusqlite::Connection;

use crate::db::Db;

const DB_SCHEMA_VERSION: i64 = 1;

pub fn init_sqlite(db: &Db) -> Result<(), String> {
    let conn = db.open()?;
    conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")
        .map_err(|error| format!("init sqlite pragmas: {error}"))?;

    let user_version: i64 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(|error| format!("read sqlite user_version: {error}"))?;

    if user_version > DB_SCHEMA_VERSION {
        return Err(format!(
            "database schema version {} is newer than supported {}",
            user_version, DB_SCHEMA_VERSION
        ));
    }

    if user_version < DB_SCHEMA_VERSION {
        reset_managed_schema(&conn)?;
        conn.pragma_update(None, "user_version", DB_SCHEMA_VERSION)
            .map_err(|error| format!("set sqlite user_version: {error}"))?;
    }

    conn.execute_batch(managed_schema_sql())
        .map_err(|error| format!("ensure schema: {error}"))?;
    Ok(())
}

fn reset_managed_schema(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(
        "
        DROP TABLE IF EXISTS query_records;
        DROP TABLE IF EXISTS process_records;
        DROP TABLE IF EXISTS snapshots;
        ",
    )
    .map_err(|error| format!("reset schema: {error}"))
}

fn managed_schema_sql() -> &'static str {
    "
    CREATE TABLE IF NOT EXISTS snapshots (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        owner_id INTEGER,
        source_url TEXT NOT NULL,
        kind TEXT NOT NULL CHECK(kind IN ('iteration', 'query')),
        process_count INTEGER NOT NULL DEFAULT 0,
        success INTEGER NOT NULL CHECK(success IN (0, 1)),
        error TEXT,
        created_at_ms INTEGER NOT NULL,
        updated_at_ms INTEGER NOT NULL,
        CHECK ((success = 1 AND error IS NULL) OR (success = 0 AND error IS NOT NULL))
    );
    CREATE INDEX IF NOT EXISTS idx_snapshots_owner
        ON snapshots (owner_id, created_at_ms);

    CREATE TABLE IF NOT EXISTS process_records (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        snapshot_id INTEGER NOT NULL REFERENCES snapshots(id) ON DELETE CASCADE,
        owner_id INTEGER,
        position INTEGER NOT NULL,
        process_id INTEGER NOT NULL,
        parent_process_id INTEGER NOT NULL,
        process_name TEXT NOT NULL,
        thread_count INTEGER NOT NULL,
        handle_count INTEGER NOT NULL,
        base_priority INTEGER NOT NULL,
        create_time TEXT NOT NULL,
        user_time INTEGER NOT NULL,
        kernel_time INTEGER NOT NULL,
        working_set_size INTEGER NOT NULL,
        peak_working_set_size INTEGER NOT NULL,
        virtual_size INTEGER NOT NULL,
        peak_virtual_size INTEGER NOT NULL,
        pagefile_usage INTEGER NOT NULL,
        peak_pagefile_usage INTEGER NOT NULL,
        page_fault_count INTEGER NOT NULL,
        read_operation_count INTEGER NOT NULL,
        write_operation_count INTEGER NOT NULL,
        other_operation_count INTEGER NOT NULL,
        read_transfer_count INTEGER NOT NULL,
        write_transfer_count INTEGER NOT NULL,
        other_transfer_count INTEGER NOT NULL,
        current_process_address TEXT NOT NULL,
        next_record_id INTEGER,
        next_address TEXT,
        next_process_name TEXT,
        next_process_id INTEGER,
        previous_record_id INTEGER,
        previous_address TEXT,
        previous_process_name TEXT,
        previous_process_id INTEGER,
        created_at_ms INTEGER NOT NULL,
        updated_at_ms INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_process_records_snapshot
        ON process_records (snapshot_id, position);
    CREATE INDEX IF NOT EXISTS idx_process_records_owner_pid
        ON process_records (owner_id, process_id);

    CREATE TABLE IF NOT EXISTS query_records (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        snapshot_id INTEGER REFERENCES snapshots(id) ON DELETE CASCADE,
        owner_id INTEGER,
        source_url TEXT NOT NULL,
        requested_pid INTEGER NOT NULL,
        process_record_id INTEGER,
        success INTEGER NOT NULL CHECK(success IN (0, 1)),
        error TEXT,
        created_at_ms INTEGER NOT NULL,
        CHECK (
            (success = 1 AND process_record_id IS NOT NULL AND error IS NULL)
            OR (success = 0 AND process_record_id IS NULL AND error IS NOT NULL)
        )
    );
    CREATE INDEX IF NOT EXISTS idx_query_records_owner
        ON query_records (owner_id, created_at_ms);
    CREATE INDEX IF NOT EXISTS idx_query_records_snapshot
        ON query_records (snapshot_id);
    "
}
