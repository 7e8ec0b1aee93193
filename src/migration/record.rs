//! `MigrationRecord` - Represents rows of the `__db_migrations` ledger

use crate::executor::StoreError;
use chrono::NaiveDateTime;

/// One execution attempt of a migration file
///
/// Rows are append-only: a file that failed twice and then succeeded has three rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRecord {
    pub id: i32,

    /// Migration file name
    pub file: String,

    pub success: bool,

    /// Failure reason (`None` for successful attempts)
    pub err: Option<String>,

    /// When the attempt was recorded (UTC)
    pub creation: NaiveDateTime,
}

impl MigrationRecord {
    /// Create a `MigrationRecord` from a database row
    ///
    /// Expected column order: `id`, `file`, `success`, `err`, `creation`
    ///
    /// # Errors
    ///
    /// Returns `StoreError::ParseError` if a column is missing or has an unexpected type.
    pub fn from_row(row: &may_postgres::Row) -> Result<Self, StoreError> {
        let parse = |column: &str, e: may_postgres::Error| {
            StoreError::ParseError(format!("ledger column '{column}': {e}"))
        };

        Ok(Self {
            id: row.try_get(0).map_err(|e| parse("id", e))?,
            file: row.try_get(1).map_err(|e| parse("file", e))?,
            success: row.try_get(2).map_err(|e| parse("success", e))?,
            err: row.try_get(3).map_err(|e| parse("err", e))?,
            creation: row.try_get(4).map_err(|e| parse("creation", e))?,
        })
    }
}
