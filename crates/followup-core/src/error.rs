//! Error types.
//!
//! Most engine paths degrade instead of failing: missing preferences fall
//! back to defaults and affirmation failures are swallowed. What remains
//! surfaces from storage, configuration and caller input.

use std::path::PathBuf;
use thiserror::Error;

/// Everything a followup-core call can fail with.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("storage: {0}")]
    Database(#[from] DatabaseError),

    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            kind,
            id: id.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("cannot open store at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("query failed: {0}")]
    QueryFailed(String),

    #[error("migration failed: {0}")]
    MigrationFailed(String),

    /// Another invocation held the write lock past the busy timeout.
    #[error("store is locked by another invocation")]
    Locked,

    /// A stored enum or timestamp no longer parses.
    #[error("unreadable '{column}' value: {value}")]
    Corrupt { column: &'static str, value: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    #[error("cannot write {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    #[error("bad value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    #[error("unknown key: {0}")]
    UnknownKey(String),

    #[error("cannot serialize config: {0}")]
    ParseFailed(String),

    #[error("data directory unavailable: {0}")]
    DataDir(String),
}

/// Caller input that the engine refuses.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("invalid '{event_type}' event: {message}")]
    InvalidEvent { event_type: String, message: String },

    #[error("unknown {kind}: '{value}'")]
    UnknownVariant { kind: &'static str, value: String },

    #[error("invalid {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked) => {
                DatabaseError::Locked
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(err.into())
    }
}

pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_maps_to_locked() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert!(matches!(DatabaseError::from(err), DatabaseError::Locked));
    }

    #[test]
    fn not_found_message() {
        let err = CoreError::not_found("reminder", "r-1");
        assert_eq!(err.to_string(), "reminder 'r-1' not found");
    }
}
