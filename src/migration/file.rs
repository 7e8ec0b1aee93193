//! Migration file discovery

use crate::migration::ledger::FILE_MAX_CHARS;
use crate::migration::MigrationError;
use crate::plugin::PluginRegistry;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Eight leading digits, anything, `.sql` at the end.
static ELIGIBLE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]{8}.*\.sql$").expect("static pattern is valid"));

/// Represents a discovered migration file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    /// File name, the ledger key and the sort key
    pub filename: String,

    /// Path to the migration file
    pub path: PathBuf,
}

impl MigrationFile {
    pub fn new(filename: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            filename: filename.into(),
            path: path.into(),
        }
    }

    /// Whether the file name makes this file eligible for execution
    pub fn is_eligible(&self) -> bool {
        is_eligible_name(&self.filename)
    }

    /// Whether the file name fits the ledger's `file` column unchanged
    pub fn fits_ledger(&self) -> bool {
        self.filename.chars().count() <= FILE_MAX_CHARS
    }
}

/// Check a file name against `^[0-9]{8}.*\.sql$`
pub fn is_eligible_name(filename: &str) -> bool {
    ELIGIBLE_NAME.is_match(filename)
}

/// List the regular files of one directory
fn list_dir(dir: &Path) -> io::Result<Vec<MigrationFile>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            continue;
        }
        // Non UTF-8 names can never match the eligibility pattern
        let Ok(filename) = entry.file_name().into_string() else {
            continue;
        };
        files.push(MigrationFile::new(filename, entry.path()));
    }
    Ok(files)
}

/// Discover the migration files of a batch
///
/// Lists `primary_dir` and the `sql` directory of every plugin. Plugin directories are
/// scanned concurrently, one coroutine each, and all scans finish before the lists are
/// merged. The merged list is sorted by file name; entries that do not match the
/// eligibility pattern are kept, the runner skips them.
///
/// # Errors
///
/// Returns `MigrationError::Discovery` if `primary_dir` cannot be listed. A plugin without
/// a readable `sql` directory contributes no files and no error.
pub fn discover_migrations(
    primary_dir: &Path,
    plugins: &PluginRegistry,
) -> Result<Vec<MigrationFile>, MigrationError> {
    let scans: Vec<_> = plugins
        .iter()
        .map(|plugin| {
            let name = plugin.name.clone();
            let sql_dir = plugin.sql_dir();
            let handle = may::go!(move || list_dir(&sql_dir));
            (name, handle)
        })
        .collect();

    let primary = list_dir(primary_dir);

    // Join every scan before looking at the primary result so no coroutine outlives discovery
    let mut plugin_files = Vec::new();
    for (name, handle) in scans {
        match handle.join() {
            Ok(Ok(files)) => plugin_files.extend(files),
            Ok(Err(e)) => log::debug!("plugin {} has no readable migrations: {}", name, e),
            Err(_) => log::warn!("migration scan of plugin {} panicked", name),
        }
    }

    let mut files = primary.map_err(|source| MigrationError::Discovery {
        dir: primary_dir.to_path_buf(),
        source,
    })?;
    // read_dir order is platform dependent; sort the primary list first so the stable
    // merge sort below places equal names primary-first
    files.sort_by(|a, b| a.filename.cmp(&b.filename));
    files.extend(plugin_files);
    files.sort_by(|a, b| a.filename.cmp(&b.filename));

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::Plugin;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), "SELECT 1;\n").unwrap();
    }

    #[test]
    fn test_eligible_names() {
        assert!(is_eligible_name("00000001_init.sql"));
        assert!(is_eligible_name("20240120.sql"));
        assert!(is_eligible_name("20240120120000_create_users.sql"));

        assert!(!is_eligible_name("0000001_short.sql"));
        assert!(!is_eligible_name("v00000001_prefixed.sql"));
        assert!(!is_eligible_name("00000001_init.sql.bak"));
        assert!(!is_eligible_name("00000001_init.SQL"));
        assert!(!is_eligible_name("README.md"));
    }

    #[test]
    fn test_fits_ledger_counts_characters() {
        let exact = format!("00000001_{}.sql", "é".repeat(FILE_MAX_CHARS - 13));
        assert_eq!(exact.chars().count(), FILE_MAX_CHARS);
        assert!(MigrationFile::new(exact.clone(), "sql").fits_ledger());

        let over = format!("00000001_{}.sql", "x".repeat(FILE_MAX_CHARS - 12));
        assert!(!MigrationFile::new(over, "sql").fits_ledger());
    }

    #[test]
    fn test_primary_files_sorted_by_name() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "00000002_b.sql");
        touch(dir.path(), "00000001_a.sql");
        touch(dir.path(), "notes.txt");

        let files = discover_migrations(dir.path(), &PluginRegistry::new()).unwrap();
        let names: Vec<_> = files.iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(names, vec!["00000001_a.sql", "00000002_b.sql", "notes.txt"]);
        assert_eq!(files[0].path, dir.path().join("00000001_a.sql"));
    }

    #[test]
    fn test_missing_primary_dir_is_fatal() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        let err = discover_migrations(&missing, &PluginRegistry::new()).unwrap_err();
        assert!(matches!(err, MigrationError::Discovery { .. }));
    }

    #[test]
    fn test_plugin_files_merged_and_interleaved() {
        let primary = TempDir::new().unwrap();
        touch(primary.path(), "00000001_core.sql");
        touch(primary.path(), "00000003_core.sql");

        let plugin_root = TempDir::new().unwrap();
        let billing = plugin_root.path().join("billing");
        fs::create_dir_all(billing.join("sql")).unwrap();
        touch(&billing.join("sql"), "00000002_billing.sql");

        let registry = PluginRegistry::from_dirs([&billing]);
        let files = discover_migrations(primary.path(), &registry).unwrap();
        let names: Vec<_> = files.iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(
            names,
            vec!["00000001_core.sql", "00000002_billing.sql", "00000003_core.sql"]
        );
        assert_eq!(files[1].path, billing.join("sql").join("00000002_billing.sql"));
    }

    #[test]
    fn test_plugin_without_sql_dir_contributes_nothing() {
        let primary = TempDir::new().unwrap();
        touch(primary.path(), "00000001_core.sql");
        let plugin_root = TempDir::new().unwrap();

        let mut registry = PluginRegistry::new();
        registry.register(Plugin::new(plugin_root.path().join("ghost")));
        let files = discover_migrations(primary.path(), &registry).unwrap();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_equal_names_keep_primary_first() {
        let primary = TempDir::new().unwrap();
        touch(primary.path(), "00000001_shared.sql");
        let plugin_root = TempDir::new().unwrap();
        let audit = plugin_root.path().join("audit");
        fs::create_dir_all(audit.join("sql")).unwrap();
        touch(&audit.join("sql"), "00000001_shared.sql");

        let files =
            discover_migrations(primary.path(), &PluginRegistry::from_dirs([&audit])).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].path, primary.path().join("00000001_shared.sql"));
        assert_eq!(files[1].path, audit.join("sql").join("00000001_shared.sql"));
    }

    #[test]
    fn test_subdirectories_are_not_listed() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("00000001_dir.sql")).unwrap();
        touch(dir.path(), "00000002_file.sql");

        let files = discover_migrations(dir.path(), &PluginRegistry::new()).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].filename, "00000002_file.sql");
    }
}
