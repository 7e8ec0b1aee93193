//! Migration-specific error types

use crate::executor::StoreError;
use std::path::PathBuf;

/// Errors that end a migration batch
#[derive(Debug)]
pub enum MigrationError {
    /// Store failure outside a migration file (ledger, lock, connection)
    Database(StoreError),
    /// The primary migrations directory could not be listed
    Discovery {
        dir: PathBuf,
        source: std::io::Error,
    },
    /// Settings could not be loaded
    Config(String),
}

impl std::fmt::Display for MigrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MigrationError::Database(e) => write!(f, "Database error: {}", e),
            MigrationError::Discovery { dir, source } => {
                write!(
                    f,
                    "Failed to read migrations directory {}: {}",
                    dir.display(),
                    source
                )
            }
            MigrationError::Config(msg) => write!(f, "Invalid migration configuration: {}", msg),
        }
    }
}

impl std::error::Error for MigrationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MigrationError::Database(e) => Some(e),
            MigrationError::Discovery { source, .. } => Some(source),
            MigrationError::Config(_) => None,
        }
    }
}

impl From<StoreError> for MigrationError {
    fn from(error: StoreError) -> Self {
        MigrationError::Database(error)
    }
}

impl From<config::ConfigError> for MigrationError {
    fn from(error: config::ConfigError) -> Self {
        MigrationError::Config(error.to_string())
    }
}

/// A statement inside a migration file was rejected by the store
#[derive(Debug)]
pub struct ExecutionError {
    /// Zero-based position of the statement within its file
    pub statement_index: usize,
    pub statement: String,
    pub source: StoreError,
}

impl std::fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.source)
    }
}

impl std::error::Error for ExecutionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discovery_error_names_directory() {
        let err = MigrationError::Discovery {
            dir: PathBuf::from("./sql"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "No such file or directory"),
        };
        let msg = err.to_string();
        assert!(msg.contains("./sql"));
        assert!(msg.contains("No such file"));
    }

    #[test]
    fn test_execution_error_displays_store_message_only() {
        let err = ExecutionError {
            statement_index: 3,
            statement: "DROP TABLE missing;".to_string(),
            source: StoreError::QueryError("table \"missing\" does not exist".to_string()),
        };
        assert_eq!(err.to_string(), "Query error: table \"missing\" does not exist");
    }
}
