/// Any failure of the persistence layer.
///
/// Faults on paths that mutate durable state are always returned to the
/// caller; nothing in this crate swallows them.
#[derive(Debug, thiserror::Error)]
pub enum StorageFault {
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("corrupt record under key {key}: {detail}")]
    Corrupt { key: String, detail: String },

    #[error("storage task failed: {0}")]
    Task(String),
}

impl From<rusqlite::Error> for StorageFault {
    fn from(e: rusqlite::Error) -> Self {
        StorageFault::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StorageFault {
    fn from(e: serde_json::Error) -> Self {
        StorageFault::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for StorageFault {
    fn from(e: std::io::Error) -> Self {
        StorageFault::Io(e.to_string())
    }
}

impl From<tokio::task::JoinError> for StorageFault {
    fn from(e: tokio::task::JoinError) -> Self {
        StorageFault::Task(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_converts() {
        let fault: StorageFault =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into();
        assert!(matches!(fault, StorageFault::Io(_)));
        assert!(fault.to_string().contains("denied"));
    }

    #[test]
    fn json_error_converts() {
        let json_err = serde_json::from_str::<serde_json::Value>("{bad").unwrap_err();
        let fault: StorageFault = json_err.into();
        assert!(matches!(fault, StorageFault::Serialization(_)));
    }

    #[test]
    fn corrupt_display_names_key() {
        let fault = StorageFault::Corrupt {
            key: "context".into(),
            detail: "expected value".into(),
        };
        assert_eq!(fault.to_string(), "corrupt record under key context: expected value");
    }
}
