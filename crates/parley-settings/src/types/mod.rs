//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and `#[serde(default)]`
//! so partial JSON files only need the fields they change.

mod context;
mod location;
mod logging;
mod storage;

pub use context::*;
pub use location::*;
pub use logging::*;
pub use storage::*;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "storage": { "backend": "file" },
///   "context": { "timezone": "Europe/Berlin" }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParleySettings {
    /// Where and how the conversation is persisted.
    pub storage: StorageSettings,
    /// Token budget and ambient context.
    pub context: ContextSettings,
    /// Location enrichment.
    pub location: LocationSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl ParleySettings {
    /// Reject combinations the context manager cannot honor.
    pub fn validate(&self) -> Result<()> {
        self.context.validate()?;
        if self.storage.database_name.trim().is_empty() {
            return Err(SettingsError::InvalidValue(
                "storage.databaseName must not be empty".into(),
            ));
        }
        Ok(())
    }
}
