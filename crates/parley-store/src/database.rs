use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::StorageFault;
use crate::schema;

/// Thread-safe SQLite connection wrapper.
/// Uses parking_lot::Mutex for synchronous access (rusqlite is not Sync).
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl Database {
    /// Open or create a database at the given path.
    pub fn open(path: &Path) -> Result<Self, StorageFault> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StorageFault::Io(format!("create dir: {e}")))?;
        }

        let conn = Connection::open(path).map_err(|e| StorageFault::Database(e.to_string()))?;

        conn.execute_batch(schema::PRAGMAS)
            .map_err(|e| StorageFault::Database(format!("pragmas: {e}")))?;

        provision(&conn)?;

        info!(path = %path.display(), "database opened");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: path.to_owned(),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self, StorageFault> {
        let conn = Connection::open_in_memory().map_err(|e| StorageFault::Database(e.to_string()))?;
        provision(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: PathBuf::from(":memory:"),
        })
    }

    /// Execute a closure with the database connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, StorageFault>
    where
        F: FnOnce(&Connection) -> Result<T, StorageFault>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The store version recorded in the file.
    pub fn version(&self) -> Result<u32, StorageFault> {
        self.with_conn(|conn| Ok(user_version(conn)?))
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
            path: self.path.clone(),
        }
    }
}

fn user_version(conn: &Connection) -> Result<u32, rusqlite::Error> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
}

/// Ensure the records table exists and the version is current.
fn provision(conn: &Connection) -> Result<(), StorageFault> {
    conn.execute_batch(schema::CREATE_RECORDS)
        .map_err(|e| StorageFault::Database(format!("schema: {e}")))?;

    let version = user_version(conn)
        .map_err(|e| StorageFault::Database(format!("read version: {e}")))?;
    if version < schema::STORE_VERSION {
        debug!(from = version, to = schema::STORE_VERSION, "upgrading store version");
        conn.execute_batch(&format!("PRAGMA user_version = {}", schema::STORE_VERSION))
            .map_err(|e| StorageFault::Database(format!("schema version: {e}")))?;
    }
    Ok(())
}
