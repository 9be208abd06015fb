//! Error types of the snapshot store.

use serde_json::{Value, json};
use thiserror::Error;

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Invalid data: {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("Invalid API key")]
    Unauthorized,

    #[error("Host {hostname} not found")]
    HostNotFound { hostname: String },

    #[error("Snapshot {id} not found")]
    SnapshotNotFound { id: i64 },

    #[error("Migration failed: {reason}")]
    MigrationFailed { reason: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    pub(crate) fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// HTTP status class of the error, as exposed to agents and readers
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidJson(_) | Self::Validation { .. } => 400,
            Self::Unauthorized => 401,
            Self::HostNotFound { .. } | Self::SnapshotNotFound { .. } => 404,
            Self::MigrationFailed { .. } | Self::Database(_) => 500,
        }
    }

    /// Short label used as the `error` field of response bodies
    pub fn label(&self) -> &'static str {
        match self {
            Self::InvalidJson(_) => "Invalid JSON",
            Self::Validation { .. } => "Invalid data",
            Self::Unauthorized => "Invalid API key",
            Self::HostNotFound { .. } | Self::SnapshotNotFound { .. } => "Not found",
            Self::MigrationFailed { .. } | Self::Database(_) => "Unexpected error",
        }
    }

    /// Machine readable details, used as the `details` field of response bodies
    pub fn details(&self) -> Value {
        match self {
            Self::Validation { field, reason } => {
                let mut details = serde_json::Map::new();
                details.insert(field.clone(), json!([reason]));
                Value::Object(details)
            }
            Self::Unauthorized => Value::Null,
            other => Value::String(other.to_string()),
        }
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_details() {
        let err = StoreError::validation("processes", "Process missing required field: pid");
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.label(), "Invalid data");
        assert_eq!(
            err.details(),
            json!({ "processes": ["Process missing required field: pid"] })
        );
        assert!(err.is_client_error());
    }

    #[test]
    fn test_database_errors_are_server_errors() {
        let err = StoreError::Database(sqlx::Error::PoolTimedOut);
        assert_eq!(err.status_code(), 500);
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_not_found() {
        let err = StoreError::HostNotFound {
            hostname: "ghost".into(),
        };
        assert_eq!(err.status_code(), 404);
        assert_eq!(err.details(), json!("Host ghost not found"));
    }
}
