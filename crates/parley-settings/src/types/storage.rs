use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which backend driver the store should use.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendPreference {
    /// Probe SQLite, fall back to the key-value files.
    #[default]
    Auto,
    /// SQLite only; failing to open it is an error.
    Sqlite,
    /// Key-value JSON files only.
    File,
}

impl fmt::Display for BackendPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Sqlite => write!(f, "sqlite"),
            Self::File => write!(f, "file"),
        }
    }
}

impl FromStr for BackendPreference {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "sqlite" => Ok(Self::Sqlite),
            "file" | "kv" => Ok(Self::File),
            other => Err(format!("unknown backend: {other}")),
        }
    }
}

/// Persistence settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageSettings {
    /// Directory holding the database and the key-value files.
    pub data_dir: PathBuf,
    /// Backend selection policy.
    pub backend: BackendPreference,
    /// SQLite file name inside `data_dir`.
    pub database_name: String,
    /// Subdirectory of `data_dir` used by the key-value fallback.
    pub kv_dir_name: String,
}

impl StorageSettings {
    /// Settings rooted at an explicit directory.
    pub fn in_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_name)
    }

    pub fn kv_dir(&self) -> PathBuf {
        self.data_dir.join(&self.kv_dir_name)
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_dir: crate::loader::parley_home().join("data"),
            backend: BackendPreference::Auto,
            database_name: "parley.db".to_string(),
            kv_dir_name: "kv".to_string(),
        }
    }
}
