//! Key-value fallback: one JSON file per key inside a directory.
//!
//! The whole context storage record is one string under
//! [`KV_STORAGE_KEY`]. Writes go to a temporary sibling first and are then
//! renamed over the target, so a crash never leaves a half-written record.
//! Instants inside the record are typed `DateTime<Utc>` values, so loading
//! revives them at every depth or fails as corrupt.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parley_core::ContextStorage;
use tracing::debug;

use crate::driver::{decode, encode, probe_payload, BackendDriver, BackendKind, KV_STORAGE_KEY, PROBE_KEY};
use crate::error::StorageFault;

#[derive(Clone, Debug)]
pub struct KvFileDriver {
    dir: PathBuf,
}

impl KvFileDriver {
    /// Open the fallback store, creating its directory if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageFault> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StorageFault::Unavailable(format!("{}: {e}", dir.display())))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageFault> {
        let target = self.key_path(key);
        let staging = self.dir.join(format!("{key}.json.tmp"));
        tokio::fs::write(&staging, value).await?;
        tokio::fs::rename(&staging, &target).await?;
        Ok(())
    }

    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageFault> {
        match tokio::fs::read_to_string(self.key_path(key)).await {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove_item(&self, key: &str) -> Result<(), StorageFault> {
        match tokio::fs::remove_file(self.key_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl BackendDriver for KvFileDriver {
    fn kind(&self) -> BackendKind {
        BackendKind::KvFile
    }

    fn location(&self) -> String {
        self.dir.display().to_string()
    }

    async fn save(&self, storage: &ContextStorage) -> Result<(), StorageFault> {
        let raw = encode(storage)?;
        self.set_item(KV_STORAGE_KEY, &raw).await?;
        debug!(messages = storage.messages.len(), bytes = raw.len(), "kv record saved");
        Ok(())
    }

    async fn load(&self) -> Result<Option<ContextStorage>, StorageFault> {
        let raw = self.get_item(KV_STORAGE_KEY).await?;
        raw.map(|raw| decode(KV_STORAGE_KEY, &raw)).transpose()
    }

    async fn clear(&self) -> Result<(), StorageFault> {
        self.remove_item(KV_STORAGE_KEY).await
    }

    async fn self_test(&self) -> Result<bool, StorageFault> {
        let payload = probe_payload();
        self.set_item(PROBE_KEY, &payload).await?;
        let read = self.get_item(PROBE_KEY).await;
        self.remove_item(PROBE_KEY).await?;
        Ok(read?.as_deref() == Some(payload.as_str()))
    }
}
