//! Per-file outcomes and batch summaries

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Why a file was passed over without touching the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Name does not match `^[0-9]{8}.*\.sql$`
    PatternMismatch,
    /// A successful attempt is already in the ledger
    AlreadyApplied,
    /// Name is wider than the ledger's `file` column, so it could never be recorded
    NameTooLong,
}

/// Why an attempted file failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileFailure {
    /// The file could not be read; carries the path text
    Read(String),
    /// A statement was rejected; carries the store's error message
    Execution(String),
}

impl fmt::Display for FileFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileFailure::Read(path) => write!(f, "could not read {}", path),
            FileFailure::Execution(msg) => f.write_str(msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Skipped(SkipReason),
    Succeeded { statements: usize },
    Failed(FileFailure),
}

impl FileOutcome {
    /// Whether the file was attempted and therefore has a new ledger row
    pub fn was_attempted(&self) -> bool {
        !matches!(self, FileOutcome::Skipped(_))
    }
}

/// What happened to one discovered file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    pub filename: String,
    pub path: PathBuf,
    pub outcome: FileOutcome,
}

/// Summary of one migration batch, files in processing order
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub files: Vec<FileReport>,
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn applied(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f.outcome, FileOutcome::Succeeded { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f.outcome, FileOutcome::Failed(_)))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f.outcome, FileOutcome::Skipped(_)))
            .count()
    }

    /// Statements executed by successful files
    pub fn statements(&self) -> usize {
        self.files
            .iter()
            .map(|f| match f.outcome {
                FileOutcome::Succeeded { statements } => statements,
                _ => 0,
            })
            .sum()
    }

    pub fn outcome_of(&self, filename: &str) -> Option<&FileOutcome> {
        self.files
            .iter()
            .find(|f| f.filename == filename)
            .map(|f| &f.outcome)
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} applied, {} failed, {} skipped in {:.2?}",
            self.applied(),
            self.failed(),
            self.skipped(),
            self.elapsed
        )
    }
}
