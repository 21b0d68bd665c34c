use thiserror::Error;

/// Persistence failures.
///
/// The queue snapshot is the only recovery mechanism after a crash, so
/// a failed write must reach the caller instead of being swallowed.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("snapshot io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("unrecognized {field} value '{value}' in persisted task '{task_id}'")]
    UnknownVariant {
        field: &'static str,
        value: String,
        task_id: String,
    },
}
