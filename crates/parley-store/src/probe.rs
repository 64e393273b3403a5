//! Backend capability probe.
//!
//! Runs once when the storage manager is opened. The chosen driver is kept
//! for the lifetime of that manager.

use std::sync::Arc;

use parley_settings::{BackendPreference, StorageSettings};
use tracing::{info, warn};

use crate::driver::BackendDriver;
use crate::error::StorageFault;
use crate::kv_file::KvFileDriver;
use crate::sqlite::SqliteDriver;

/// Pick and open a backend driver according to `settings.backend`.
///
/// `Auto` prefers SQLite and falls back to the key-value files when the
/// database cannot be opened or provisioned.
pub async fn select_backend(
    settings: &StorageSettings,
) -> Result<Arc<dyn BackendDriver>, StorageFault> {
    let driver: Arc<dyn BackendDriver> = match settings.backend {
        BackendPreference::Sqlite => Arc::new(open_sqlite(settings).await?),
        BackendPreference::File => Arc::new(KvFileDriver::open(settings.kv_dir()).await?),
        BackendPreference::Auto => match open_sqlite(settings).await {
            Ok(driver) => Arc::new(driver),
            Err(e) => {
                warn!(error = %e, "structured store unavailable, using key-value fallback");
                Arc::new(KvFileDriver::open(settings.kv_dir()).await?)
            }
        },
    };
    info!(backend = %driver.kind(), location = %driver.location(), "storage backend selected");
    Ok(driver)
}

async fn open_sqlite(settings: &StorageSettings) -> Result<SqliteDriver, StorageFault> {
    let path = settings.database_path();
    tokio::task::spawn_blocking(move || SqliteDriver::open(&path)).await?
}
