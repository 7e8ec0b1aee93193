//! In-process migration execution on application startup

use crate::migration::{BatchReport, MigrationError, Migrator};

/// What `startup_migrations` did
#[derive(Debug)]
pub enum StartupOutcome {
    /// `auto_migrate` is off
    Disabled,
    /// Another instance holds the migration lock and is running the batch
    LockHeld,
    Completed(BatchReport),
}

/// Run migrations on application startup
///
/// Call this during application initialization. It does nothing unless `auto_migrate` is
/// enabled. When several instances start together, the first to take the advisory lock
/// runs the batch and the others continue immediately with `StartupOutcome::LockHeld`.
///
/// A migration file that fails does not fail startup: the failure is in the ledger and
/// the log, and the file is retried on the next start. Inspect the returned report if the
/// application should refuse to start in that case.
///
/// # Errors
///
/// Returns `MigrationError` if the migrations directory cannot be listed or the ledger is
/// unavailable.
///
/// # Example
///
/// ```rust,no_run
/// use tollgate::migration::{startup_migrations, Migrator};
/// use tollgate::{connect, MayPostgresExecutor, MigrationSettings, PgConnector, PluginRegistry};
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let settings = MigrationSettings::load()?;
///     let store = MayPostgresExecutor::new(connect(&settings.database_url)?);
///     let connections = PgConnector::new(settings.database_url.clone());
///     let plugins = PluginRegistry::from_dirs(&settings.plugins);
///
///     let migrator = Migrator::new(&store, &connections, &settings, &plugins);
///     startup_migrations(&migrator)?;
///
///     // Continue with application startup...
///     Ok(())
/// }
/// ```
pub fn startup_migrations(migrator: &Migrator<'_>) -> Result<StartupOutcome, MigrationError> {
    if !migrator.settings().auto_migrate {
        log::debug!("auto_migrate is disabled, not running migrations");
        return Ok(StartupOutcome::Disabled);
    }

    match migrator.migrate()? {
        Some(report) => {
            if report.applied() > 0 {
                log::info!("Applied {} migration(s) on startup", report.applied());
            } else {
                log::debug!("No pending migrations to apply");
            }
            if report.has_failures() {
                log::error!(
                    "{} migration(s) failed on startup, see {} for details",
                    report.failed(),
                    crate::config::LEDGER_TABLE
                );
            }
            Ok(StartupOutcome::Completed(report))
        }
        None => {
            log::info!("Migrations are being run by another instance");
            Ok(StartupOutcome::LockHeld)
        }
    }
}
