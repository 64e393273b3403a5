/// SQL DDL for the structured store.
///
/// The store version lives in `PRAGMA user_version`. The records table is
/// created with `IF NOT EXISTS` on every open, not only on upgrade, so an
/// open that races a concurrent first open still finds its table.
pub const STORE_VERSION: u32 = 1;

pub const CREATE_RECORDS: &str = r#"
CREATE TABLE IF NOT EXISTS records (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

pub const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA busy_timeout = 5000;
PRAGMA synchronous = NORMAL;
"#;

pub const UPSERT_RECORD: &str = "INSERT INTO records (key, value, updated_at) VALUES (?1, ?2, ?3)
     ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at";

pub const SELECT_RECORD: &str = "SELECT value FROM records WHERE key = ?1";

pub const DELETE_RECORD: &str = "DELETE FROM records WHERE key = ?1";
