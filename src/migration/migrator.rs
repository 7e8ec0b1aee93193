//! Migrator - Core migration execution engine

use crate::config::MigrationSettings;
use crate::connection::ConnectionSource;
use crate::executor::SqlExecutor;
use crate::migration::file::discover_migrations;
use crate::migration::ledger::FILE_MAX_CHARS;
use crate::migration::lock::try_run_exclusive;
use crate::migration::script::execute_script;
use crate::migration::{
    BatchReport, FileFailure, FileOutcome, FileReport, Ledger, MigrationError, MigrationFile,
    MigrationRecord, SkipReason,
};
use crate::plugin::PluginRegistry;
use std::fs;
use std::path::Path;
use std::time::Instant;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Core migration execution engine
///
/// A `Migrator` borrows everything it works with: the store that receives ledger writes
/// and migration statements, the source of the dedicated lock connection, the settings
/// and the plugin registry. Build one where those live and pass it by reference.
pub struct Migrator<'a> {
    store: &'a dyn SqlExecutor,
    connections: &'a dyn ConnectionSource,
    settings: &'a MigrationSettings,
    plugins: &'a PluginRegistry,
}

impl<'a> Migrator<'a> {
    pub fn new(
        store: &'a dyn SqlExecutor,
        connections: &'a dyn ConnectionSource,
        settings: &'a MigrationSettings,
        plugins: &'a PluginRegistry,
    ) -> Self {
        Self {
            store,
            connections,
            settings,
            plugins,
        }
    }

    pub fn settings(&self) -> &MigrationSettings {
        self.settings
    }

    /// Run a batch under the database's advisory lock
    ///
    /// Returns `Ok(None)` when another process holds the lock: nothing was discovered,
    /// executed or recorded.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Database` if the lock cannot be attempted, plus every
    /// error of [`Migrator::run_batch`].
    pub fn migrate(&self) -> Result<Option<BatchReport>, MigrationError> {
        let key = self.settings.lock_key();
        try_run_exclusive(self.connections, &key, || self.run_batch())?.transpose()
    }

    /// Run a batch against the configured migrations directory, without the lock
    pub fn run_batch(&self) -> Result<BatchReport, MigrationError> {
        self.run_batch_in(&self.settings.migrations_dir)
    }

    /// Run a batch against `dir` and the plugin `sql` directories, without the lock
    ///
    /// Files are processed one at a time in name order: each file is read, executed and
    /// recorded before the next one is looked at. A file that cannot be read or whose
    /// statements fail gets a failed ledger row and the batch moves on.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Discovery` if `dir` cannot be listed, in which case no file
    /// is processed, and `MigrationError::Database` if the ledger itself cannot be read or
    /// written.
    pub fn run_batch_in(&self, dir: &Path) -> Result<BatchReport, MigrationError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::batch_span(dir).entered();

        let start = Instant::now();
        let ledger = Ledger::new(self.store);
        ledger.ensure_table()?;

        let files = discover_migrations(dir, self.plugins).map_err(|e| {
            log::error!("{}", e);
            e
        })?;

        let mut report = BatchReport::default();
        for file in files {
            let outcome = self.process_file(&ledger, &file)?;
            report.files.push(FileReport {
                filename: file.filename,
                path: file.path,
                outcome,
            });
        }
        report.elapsed = start.elapsed();

        #[cfg(feature = "metrics")]
        METRICS.record_batch(report.elapsed);

        if report.applied() + report.failed() > 0 {
            log::info!("Migration batch finished: {}", report);
        } else {
            log::debug!("No pending migrations in {}", dir.display());
        }

        Ok(report)
    }

    fn process_file(
        &self,
        ledger: &Ledger<'_>,
        file: &MigrationFile,
    ) -> Result<FileOutcome, MigrationError> {
        if !file.is_eligible() {
            log::debug!("skipping {}: not a migration file name", file.filename);
            return Ok(FileOutcome::Skipped(SkipReason::PatternMismatch));
        }
        if !file.fits_ledger() {
            log::error!(
                "❌ {}: name is longer than {} characters and cannot be recorded, skipping",
                file.filename,
                FILE_MAX_CHARS
            );
            return Ok(FileOutcome::Skipped(SkipReason::NameTooLong));
        }
        if ledger.has_succeeded(&file.filename)? {
            log::debug!("skipping {}: already applied", file.filename);
            return Ok(FileOutcome::Skipped(SkipReason::AlreadyApplied));
        }

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::file_span(&file.filename).entered();

        let outcome = match self.attempt(file) {
            Ok(statements) => {
                ledger.record(&file.filename, true, None)?;
                log::info!("✅ {}", file.filename);
                FileOutcome::Succeeded { statements }
            }
            Err(failure) => {
                ledger.record(&file.filename, false, Some(&failure.to_string()))?;
                log::error!("❌ {}: {}", file.filename, failure);
                FileOutcome::Failed(failure)
            }
        };

        #[cfg(feature = "metrics")]
        METRICS.record_file(matches!(outcome, FileOutcome::Succeeded { .. }));

        Ok(outcome)
    }

    fn attempt(&self, file: &MigrationFile) -> Result<usize, FileFailure> {
        let content = fs::read_to_string(&file.path).map_err(|e| {
            log::error!("failed to read {}: {}", file.path.display(), e);
            FileFailure::Read(file.path.display().to_string())
        })?;

        if self.settings.debug_sql {
            log::info!(
                "Executing {}: {} lines to process",
                file.path.display(),
                content.split('\n').count()
            );
        }

        execute_script(self.store, &content, self.settings.debug_sql).map_err(|e| {
            log::debug!(
                "{}: statement {} failed: {}",
                file.filename,
                e.statement_index + 1,
                e.statement
            );
            FileFailure::Execution(e.to_string())
        })
    }

    /// Eligible files a batch would attempt, in execution order
    ///
    /// Nothing is executed or recorded apart from creating the ledger table if needed.
    pub fn pending(&self) -> Result<Vec<MigrationFile>, MigrationError> {
        let ledger = Ledger::new(self.store);
        ledger.ensure_table()?;

        let mut pending = Vec::new();
        for file in discover_migrations(&self.settings.migrations_dir, self.plugins)? {
            if file.is_eligible() && file.fits_ledger() && !ledger.has_succeeded(&file.filename)? {
                pending.push(file);
            }
        }
        Ok(pending)
    }

    /// Every recorded attempt, newest first
    pub fn history(&self) -> Result<Vec<MigrationRecord>, MigrationError> {
        let ledger = Ledger::new(self.store);
        ledger.ensure_table()?;
        Ok(ledger.history()?)
    }
}
