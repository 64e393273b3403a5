use std::path::Path;

use async_trait::async_trait;
use parley_core::ContextStorage;
use rusqlite::OptionalExtension;
use tracing::debug;

use crate::database::Database;
use crate::driver::{decode, encode, probe_payload, BackendDriver, BackendKind, PROBE_KEY, RECORD_KEY};
use crate::error::StorageFault;
use crate::schema;

/// Structured store backed by a versioned SQLite file.
///
/// Blocking SQLite calls run on the blocking pool.
#[derive(Clone)]
pub struct SqliteDriver {
    db: Database,
}

impl SqliteDriver {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Open (and provision) the database file.
    pub fn open(path: &Path) -> Result<Self, StorageFault> {
        Ok(Self::new(Database::open(path)?))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StorageFault> {
        let now = parley_core::instant::format(&parley_core::instant::now());
        self.db.with_conn(|conn| {
            conn.execute(schema::UPSERT_RECORD, rusqlite::params![key, value, now])?;
            Ok(())
        })
    }

    fn get(&self, key: &str) -> Result<Option<String>, StorageFault> {
        self.db.with_conn(|conn| {
            Ok(conn
                .query_row(schema::SELECT_RECORD, [key], |row| row.get(0))
                .optional()?)
        })
    }

    fn delete(&self, key: &str) -> Result<(), StorageFault> {
        self.db.with_conn(|conn| {
            conn.execute(schema::DELETE_RECORD, [key])?;
            Ok(())
        })
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, StorageFault>
    where
        T: Send + 'static,
        F: FnOnce(&SqliteDriver) -> Result<T, StorageFault> + Send + 'static,
    {
        let driver = self.clone();
        tokio::task::spawn_blocking(move || f(&driver)).await?
    }
}

#[async_trait]
impl BackendDriver for SqliteDriver {
    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    fn location(&self) -> String {
        self.db.path().display().to_string()
    }

    async fn save(&self, storage: &ContextStorage) -> Result<(), StorageFault> {
        let raw = encode(storage)?;
        self.blocking(move |d| d.put(RECORD_KEY, &raw)).await?;
        debug!(messages = storage.messages.len(), "sqlite record saved");
        Ok(())
    }

    async fn load(&self) -> Result<Option<ContextStorage>, StorageFault> {
        let raw = self.blocking(|d| d.get(RECORD_KEY)).await?;
        raw.map(|raw| decode(RECORD_KEY, &raw)).transpose()
    }

    async fn clear(&self) -> Result<(), StorageFault> {
        self.blocking(|d| d.delete(RECORD_KEY)).await
    }

    async fn self_test(&self) -> Result<bool, StorageFault> {
        let payload = probe_payload();
        self.blocking(move |d| {
            d.put(PROBE_KEY, &payload)?;
            let read = d.get(PROBE_KEY);
            d.delete(PROBE_KEY)?;
            Ok(read?.as_deref() == Some(payload.as_str()))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::{Role, StoredMessage};

    fn driver() -> SqliteDriver {
        SqliteDriver::new(Database::in_memory().unwrap())
    }

    #[tokio::test]
    async fn load_empty_returns_none() {
        assert!(driver().load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_then_load_roundtrips() {
        let d = driver();
        let mut storage = ContextStorage::default();
        storage.push(StoredMessage::new(Role::User, "hello there"));
        d.save(&storage).await.unwrap();

        let loaded = d.load().await.unwrap().unwrap();
        assert_eq!(loaded, storage);
    }

    #[tokio::test]
    async fn repeated_saves_overwrite() {
        let d = driver();
        let mut storage = ContextStorage::default();
        d.save(&storage).await.unwrap();
        storage.push(StoredMessage::assistant("second"));
        d.save(&storage).await.unwrap();

        let rows: i64 = d
            .database()
            .with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM records", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(rows, 1);
        assert_eq!(d.load().await.unwrap().unwrap().messages.len(), 1);
    }

    #[tokio::test]
    async fn clear_removes_record() {
        let d = driver();
        d.save(&ContextStorage::default()).await.unwrap();
        d.clear().await.unwrap();
        assert!(d.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_row_is_a_fault() {
        let d = driver();
        d.put(RECORD_KEY, "not json").unwrap();
        assert!(matches!(d.load().await, Err(StorageFault::Corrupt { .. })));
    }

    #[tokio::test]
    async fn self_test_leaves_no_probe_behind() {
        let d = driver();
        assert!(d.self_test().await.unwrap());
        assert!(d.get(PROBE_KEY).unwrap().is_none());
        assert!(d.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_backed_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parley.db");
        let mut storage = ContextStorage::default();
        storage.push(StoredMessage::user("persist me"));

        SqliteDriver::open(&path).unwrap().save(&storage).await.unwrap();
        let loaded = SqliteDriver::open(&path).unwrap().load().await.unwrap().unwrap();
        assert_eq!(loaded.messages[0].content, "persist me");
        assert_eq!(loaded.last_updated, storage.last_updated);
    }
}
