//! Migration ledger management
//!
//! The ledger is append-only: every attempt to run a file becomes a row, and a file counts
//! as applied as soon as one of its rows has `success = true`.

use crate::config::LEDGER_TABLE;
use crate::executor::{SqlExecutor, StoreError};
use crate::migration::MigrationRecord;
use chrono::Utc;
use once_cell::sync::Lazy;
use sea_query::{ColumnDef, PostgresQueryBuilder, Table, TableCreateStatement};

/// Column width of `file`
pub const FILE_MAX_CHARS: usize = 100;
/// Column width of `err`
pub const ERR_MAX_CHARS: usize = 255;

static HAS_SUCCEEDED_SQL: Lazy<String> = Lazy::new(|| {
    format!("SELECT id FROM {LEDGER_TABLE} WHERE file = $1 AND success = true LIMIT 1")
});

static RECORD_SQL: Lazy<String> = Lazy::new(|| {
    format!("INSERT INTO {LEDGER_TABLE} (file, success, err, creation) VALUES ($1, $2, $3, $4)")
});

static HISTORY_SQL: Lazy<String> = Lazy::new(|| {
    format!("SELECT id, file, success, err, creation FROM {LEDGER_TABLE} ORDER BY id DESC")
});

/// Definition of the ledger table
pub fn ledger_table() -> TableCreateStatement {
    Table::create()
        .table(LEDGER_TABLE)
        .if_not_exists()
        .col(
            ColumnDef::new("id")
                .integer()
                .not_null()
                .auto_increment()
                .primary_key()
        )
        .col(ColumnDef::new("file").string_len(FILE_MAX_CHARS as u32))
        .col(ColumnDef::new("success").boolean())
        .col(ColumnDef::new("err").string_len(ERR_MAX_CHARS as u32).null())
        .col(ColumnDef::new("creation").timestamp())
        .to_owned()
}

/// Cut `value` to at most `max` characters without splitting a character
pub fn truncate_chars(value: &str, max: usize) -> &str {
    match value.char_indices().nth(max) {
        Some((idx, _)) => &value[..idx],
        None => value,
    }
}

/// Ledger operations over a store executor
pub struct Ledger<'a> {
    executor: &'a dyn SqlExecutor,
}

impl<'a> Ledger<'a> {
    pub fn new(executor: &'a dyn SqlExecutor) -> Self {
        Self { executor }
    }

    /// Create the ledger table if it does not exist yet
    pub fn ensure_table(&self) -> Result<(), StoreError> {
        let sql = ledger_table().to_string(PostgresQueryBuilder);
        self.executor.execute(&sql, &[])?;
        Ok(())
    }

    /// Whether `filename` has a successful attempt on record
    pub fn has_succeeded(&self, filename: &str) -> Result<bool, StoreError> {
        self.executor.query_exists(&HAS_SUCCEEDED_SQL, &[&filename])
    }

    /// Append one attempt, stamped with the current UTC time
    ///
    /// `filename` is the ledger key and is stored as given; callers keep it within
    /// [`FILE_MAX_CHARS`]. An `err` wider than its column is truncated.
    pub fn record(&self, filename: &str, success: bool, err: Option<&str>) -> Result<(), StoreError> {
        let err = err.map(|e| truncate_chars(e, ERR_MAX_CHARS));
        let creation = Utc::now().naive_utc();

        self.executor
            .execute(&RECORD_SQL, &[&filename, &success, &err, &creation])?;
        Ok(())
    }

    /// Every attempt, newest first
    pub fn history(&self) -> Result<Vec<MigrationRecord>, StoreError> {
        self.executor
            .query_all(&HISTORY_SQL, &[])?
            .iter()
            .map(MigrationRecord::from_row)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::RecordingExecutor;

    #[test]
    fn test_ledger_table_ddl() {
        let sql = ledger_table().to_string(PostgresQueryBuilder);
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS"));
        assert!(sql.contains("__db_migrations"));
        assert!(sql.contains("varchar(100)"));
        assert!(sql.contains("varchar(255)"));
    }

    #[test]
    fn test_truncate_chars_respects_char_boundaries() {
        assert_eq!(truncate_chars("abc", 5), "abc");
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[test]
    fn test_record_then_has_succeeded() {
        let store = RecordingExecutor::new();
        let ledger = Ledger::new(&store);

        ledger.ensure_table().unwrap();
        assert!(!ledger.has_succeeded("00000001_a.sql").unwrap());

        ledger.record("00000001_a.sql", false, Some("boom")).unwrap();
        assert!(!ledger.has_succeeded("00000001_a.sql").unwrap());

        ledger.record("00000001_a.sql", true, None).unwrap();
        assert!(ledger.has_succeeded("00000001_a.sql").unwrap());

        let rows = store.ledger_rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].err.as_deref(), Some("boom"));
        assert!(rows[1].success);
    }

    #[test]
    fn test_record_truncates_long_error() {
        let store = RecordingExecutor::new();
        let ledger = Ledger::new(&store);
        let long = "x".repeat(400);

        ledger.record("00000001_a.sql", false, Some(&long)).unwrap();
        let rows = store.ledger_rows();
        assert_eq!(rows[0].err.as_ref().map(|e| e.chars().count()), Some(ERR_MAX_CHARS));
    }

    #[test]
    fn test_names_sharing_a_long_prefix_are_distinct_keys() {
        let store = RecordingExecutor::new();
        let ledger = Ledger::new(&store);
        let prefix = format!("00000001_{}", "x".repeat(95));

        ledger.record(&format!("{prefix}_a.sql"), true, None).unwrap();
        assert!(ledger.has_succeeded(&format!("{prefix}_a.sql")).unwrap());
        assert!(!ledger.has_succeeded(&format!("{prefix}_b.sql")).unwrap());
        assert_eq!(store.ledger_rows()[0].file, format!("{prefix}_a.sql"));
    }

    #[test]
    fn test_ensure_table_is_a_single_statement() {
        let store = RecordingExecutor::new();
        Ledger::new(&store).ensure_table().unwrap();
        Ledger::new(&store).ensure_table().unwrap();
        let executed = store.executed();
        assert_eq!(executed.len(), 2);
        assert!(executed.iter().all(|s| s.contains("IF NOT EXISTS")));
    }
}
