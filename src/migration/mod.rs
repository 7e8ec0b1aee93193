//! Migration system for Tollgate
//!
//! Applies plain `.sql` files to a PostgreSQL database, each at most once:
//! - Discovery of the primary directory and every plugin's `sql` directory
//! - A line-oriented statement splitter and executor
//! - An append-only `__db_migrations` ledger of every attempt
//! - An advisory lock so one process per database runs a batch
//!
//! A file is eligible when its name matches `^[0-9]{8}.*\.sql$`; eligible files run in
//! file-name order. Statements end at a line whose last non-blank character is `;`.
//!
//! # Example
//!
//! ```rust,no_run
//! use tollgate::migration::Migrator;
//! use tollgate::{connect, MayPostgresExecutor, MigrationSettings, PgConnector, PluginRegistry};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = MigrationSettings::load()?;
//! let store = MayPostgresExecutor::new(connect(&settings.database_url)?);
//! let connections = PgConnector::new(settings.database_url.clone());
//! let plugins = PluginRegistry::new();
//!
//! let migrator = Migrator::new(&store, &connections, &settings, &plugins);
//! match migrator.migrate()? {
//!     Some(report) => println!("{}", report),
//!     None => println!("another process is migrating"),
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod file;
pub mod ledger;
pub mod lock;
pub mod migrator;
pub mod record;
pub mod report;
pub mod script;
pub mod startup;

pub use error::{ExecutionError, MigrationError};
pub use file::{discover_migrations, is_eligible_name, MigrationFile};
pub use ledger::Ledger;
pub use lock::{try_run_exclusive, AdvisoryLockGuard};
pub use migrator::Migrator;
pub use record::MigrationRecord;
pub use report::{BatchReport, FileFailure, FileOutcome, FileReport, SkipReason};
pub use script::{classify, execute_script, split_statements, Line, Statements};
pub use startup::{startup_migrations, StartupOutcome};
