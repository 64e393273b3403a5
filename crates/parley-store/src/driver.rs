use std::fmt;

use async_trait::async_trait;
use parley_core::ContextStorage;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::StorageFault;

/// Key under which the structured store keeps the context storage record.
pub const RECORD_KEY: &str = "context";

/// Key under which the key-value fallback keeps the serialized storage.
pub const KV_STORAGE_KEY: &str = "parley-context-storage";

/// Scratch key used by self tests; never holds real data.
pub const PROBE_KEY: &str = "__parley_probe__";

/// Which backend a driver implements.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Sqlite,
    KvFile,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite => write!(f, "sqlite"),
            Self::KvFile => write!(f, "kv_file"),
        }
    }
}

/// Raw persistence of the single context storage record.
///
/// Implementations store the whole record under one fixed key, so repeated
/// saves overwrite. Only the storage manager talks to a driver.
#[async_trait]
pub trait BackendDriver: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Human-readable location (file path or directory).
    fn location(&self) -> String;

    async fn save(&self, storage: &ContextStorage) -> Result<(), StorageFault>;

    async fn load(&self) -> Result<Option<ContextStorage>, StorageFault>;

    async fn clear(&self) -> Result<(), StorageFault>;

    /// Write, read back and delete a probe value under [`PROBE_KEY`].
    /// `Ok(false)` means the backend answered but returned the wrong value.
    async fn self_test(&self) -> Result<bool, StorageFault>;
}

/// Serialize a storage record into its persisted JSON text.
pub(crate) fn encode(storage: &ContextStorage) -> Result<String, StorageFault> {
    Ok(serde_json::to_string(storage)?)
}

/// Parse persisted JSON text, reporting failures as corruption of `key`.
///
/// Messages stored without an id get their stable legacy id, so repeated
/// loads of the same record agree on every id.
pub(crate) fn decode(key: &str, raw: &str) -> Result<ContextStorage, StorageFault> {
    let mut storage: ContextStorage =
        serde_json::from_str(raw).map_err(|e| StorageFault::Corrupt {
            key: key.to_string(),
            detail: e.to_string(),
        })?;
    let assigned = storage.assign_missing_ids();
    if assigned > 0 {
        debug!(key, assigned, "assigned ids to legacy messages");
    }
    Ok(storage)
}

/// A probe payload unique to this call.
pub(crate) fn probe_payload() -> String {
    format!(r#"{{"probe":"{}"}}"#, parley_core::instant::format(&parley_core::instant::now()))
}
