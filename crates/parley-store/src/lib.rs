pub mod database;
pub mod driver;
pub mod error;
pub mod kv_file;
pub mod manager;
pub mod probe;
pub mod schema;
pub mod sqlite;

#[cfg(test)]
pub(crate) mod testing;

pub use database::Database;
pub use driver::{BackendDriver, BackendKind};
pub use error::StorageFault;
pub use kv_file::KvFileDriver;
pub use manager::{StorageManager, StorageStats, TrimBudget, TrimReport};
pub use probe::select_backend;
pub use sqlite::SqliteDriver;
