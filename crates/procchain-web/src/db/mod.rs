use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::Connection;

mod queries;
mod records;
mod schema;
mod snapshots;
mod store;

pub use queries::NewQueryRecord;
pub use records::NewProcessRecord;
pub use schema::init_sqlite;
pub use snapshots::NewSnapshot;
pub use store::{QueryStore, RecordStore, SnapshotStore};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct Db {
    path: PathBuf,
}

impl Db {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens a fresh connection. Every storage operation acquires its own.
    pub fn open(&self) -> Result<Connection, String> {
        let conn =
            Connection::open(&self.path).map_err(|error| format!("open sqlite: {error}"))?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|error| format!("set busy timeout: {error}"))?;
        conn.pragma_update(None, "foreign_keys", true)
            .map_err(|error| format!("enable foreign keys: {error}"))?;
        Ok(conn)
    }
}
