//! Tollgate Migration CLI Tool
//!
//! Command-line interface for applying and inspecting SQL file migrations.
//! Settings come from `config/config.toml`, `TOLLGATE__MIGRATIONS__*` environment variables
//! (a `.env` file is read first) and finally the flags below.

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;
use tollgate::migration::ledger::FILE_MAX_CHARS;
use tollgate::migration::{is_eligible_name, FileOutcome, Migrator, SkipReason};
use tollgate::{connect, MayPostgresExecutor, MigrationSettings, PgConnector, PluginRegistry};

#[derive(Parser, Debug)]
#[command(name = "tollgate")]
#[command(about = "Exactly-once SQL file migrations for PostgreSQL")]
#[command(version = "0.1.0")]
struct Cli {
    /// Database connection URL
    #[arg(long)]
    database_url: Option<String>,

    /// Migrations directory path
    #[arg(long)]
    migrations_dir: Option<PathBuf>,

    /// Plugin directory whose `sql` subdirectory holds more migrations (repeatable)
    #[arg(long = "plugin")]
    plugins: Vec<PathBuf>,

    /// Log every statement before it runs
    #[arg(long)]
    debug_sql: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Quiet output (errors only)
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply pending migrations under the advisory lock
    Migrate,

    /// Show every recorded attempt, newest first
    List,

    /// Show the files the next batch would attempt
    Pending,

    /// Create an empty migration file
    New {
        /// Migration name (e.g., "create_users_table")
        name: String,
    },
}

fn main() {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(e) = run(&cli) {
        eprintln!("{} {:#}", "❌ Error:".red().bold(), e);
        process::exit(1);
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let mut settings = MigrationSettings::load().context("Loading migration settings")?;
    if cli.database_url.is_none() {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            settings.database_url = url;
        }
    }
    apply_overrides(&mut settings, cli);

    match &cli.command {
        Commands::New { name } => {
            let path = handle_new(&settings.migrations_dir, name, Utc::now())?;
            println!("{} {}", "✅ Created".green(), path.display());
            Ok(())
        }
        Commands::Migrate => {
            with_migrator(&settings, |m| handle_migrate(m, cli.verbose, cli.quiet))
        }
        Commands::List => with_migrator(&settings, handle_list),
        Commands::Pending => with_migrator(&settings, handle_pending),
    }
}

/// Connect to the database and hand a migrator over it to `command`
fn with_migrator(
    settings: &MigrationSettings,
    command: impl FnOnce(&Migrator<'_>) -> anyhow::Result<()>,
) -> anyhow::Result<()> {
    let client = connect(&settings.database_url).context("Connecting to the database")?;
    let store = MayPostgresExecutor::new(client);
    let connections = PgConnector::new(settings.database_url.clone());
    let plugins = PluginRegistry::from_dirs(&settings.plugins);
    let migrator = Migrator::new(&store, &connections, settings, &plugins);
    command(&migrator)
}

/// Flags win over file and environment settings
fn apply_overrides(settings: &mut MigrationSettings, cli: &Cli) {
    if let Some(url) = &cli.database_url {
        settings.database_url = url.clone();
    }
    if let Some(dir) = &cli.migrations_dir {
        settings.migrations_dir = dir.clone();
    }
    settings.plugins.extend(cli.plugins.iter().cloned());
    settings.debug_sql |= cli.debug_sql;
}

fn handle_migrate(migrator: &Migrator<'_>, verbose: bool, quiet: bool) -> anyhow::Result<()> {
    let Some(report) = migrator.migrate().context("Running migrations")? else {
        println!(
            "{}",
            "⏳ Another process holds the migration lock, nothing to do".yellow()
        );
        return Ok(());
    };

    if !quiet {
        for file in &report.files {
            match &file.outcome {
                FileOutcome::Succeeded { statements } => {
                    println!("  {} {} ({} statements)", "✅".green(), file.filename, statements)
                }
                FileOutcome::Failed(failure) => {
                    println!("  {} {}: {}", "❌".red(), file.filename, failure)
                }
                FileOutcome::Skipped(SkipReason::NameTooLong) => println!(
                    "  {} {}: name longer than {} characters, not run",
                    "⚠️".yellow(),
                    file.filename,
                    FILE_MAX_CHARS
                ),
                FileOutcome::Skipped(reason) if verbose => {
                    println!("  {} {} ({:?})", "·".dimmed(), file.filename, reason)
                }
                FileOutcome::Skipped(_) => {}
            }
        }
        println!("\n📈 Summary: {}", report);
    }

    if report.has_failures() {
        bail!("{} migration file(s) failed", report.failed());
    }
    Ok(())
}

fn handle_list(migrator: &Migrator<'_>) -> anyhow::Result<()> {
    let history = migrator.history().context("Reading the migration ledger")?;
    if history.is_empty() {
        println!("No migrations recorded");
        return Ok(());
    }

    println!("\n📋 Migration History ({} attempts)\n", history.len());
    for record in &history {
        let status = if record.success {
            "ok".green()
        } else {
            "failed".red()
        };
        print!(
            "  {:>5}  {}  {:<6} {}",
            record.id,
            record.creation.format("%Y-%m-%d %H:%M:%S"),
            status,
            record.file
        );
        match &record.err {
            Some(err) => println!("  {}", err.dimmed()),
            None => println!(),
        }
    }
    Ok(())
}

fn handle_pending(migrator: &Migrator<'_>) -> anyhow::Result<()> {
    let pending = migrator.pending().context("Listing pending migrations")?;
    if pending.is_empty() {
        println!("{}", "✅ No pending migrations".green());
        return Ok(());
    }

    println!("⏳ Pending Migrations ({}):", pending.len());
    for (i, file) in pending.iter().enumerate() {
        println!("  {}. {} ({})", i + 1, file.filename, file.path.display());
    }
    Ok(())
}

/// File name for a new migration created at `now`
fn migration_filename(now: DateTime<Utc>, name: &str) -> anyhow::Result<String> {
    let slug: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    let slug = slug.trim_matches('_');
    if slug.is_empty() {
        bail!("migration name {:?} has no usable characters", name);
    }

    let filename = format!("{}_{}.sql", now.format("%Y%m%d%H%M%S"), slug);
    if filename.chars().count() > FILE_MAX_CHARS {
        bail!(
            "migration file name {} is longer than {} characters",
            filename,
            FILE_MAX_CHARS
        );
    }
    Ok(filename)
}

fn handle_new(migrations_dir: &Path, name: &str, now: DateTime<Utc>) -> anyhow::Result<PathBuf> {
    let filename = migration_filename(now, name)?;
    debug_assert!(is_eligible_name(&filename));

    fs::create_dir_all(migrations_dir).with_context(|| {
        format!("Creating migrations directory {}", migrations_dir.display())
    })?;

    let path = migrations_dir.join(&filename);
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .with_context(|| format!("Creating {}", path.display()))?;
    write!(
        file,
        "-- Migration: {}\n-- Generated: {}\n--\n-- Statements end with a `;` at the end of a line.\n\n",
        name.trim(),
        now.format("%Y-%m-%d %H:%M:%S UTC")
    )?;

    Ok(path)
}
