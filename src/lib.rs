//! # Tollgate
//!
//! Coroutine-friendly SQL migration runner for PostgreSQL using the `may` runtime.
//!
//! Plain `.sql` files are applied once each, in file-name order, with every attempt
//! recorded in an append-only `__db_migrations` ledger. A PostgreSQL advisory lock keeps
//! concurrently starting instances from running the same batch twice.

pub mod config;
pub mod connection;
pub mod executor;
pub mod metrics;
pub mod migration;
pub mod plugin;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use config::{MigrationSettings, LEDGER_TABLE};
pub use connection::{connect, ConnectionError, ConnectionSource, PgConnector};
pub use executor::{MayPostgresExecutor, SqlExecutor, StoreError};
pub use migration::{BatchReport, MigrationError, Migrator};
pub use plugin::{Plugin, PluginRegistry};
