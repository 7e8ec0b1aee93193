//! Plugin registry.
//!
//! Plugins contribute migrations from a `sql` directory under their own root. The registry
//! only knows where plugins live; loading them is the host application's business.

use std::path::{Path, PathBuf};

/// Subdirectory of a plugin root holding its migrations.
pub const PLUGIN_SQL_DIR: &str = "sql";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plugin {
    pub name: String,
    pub dir: PathBuf,
}

impl Plugin {
    /// Create a plugin named after the last component of `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| dir.display().to_string());
        Self { name, dir }
    }

    pub fn sql_dir(&self) -> PathBuf {
        self.dir.join(PLUGIN_SQL_DIR)
    }
}

/// Ordered list of plugins; registration order breaks ties between equal file names.
#[derive(Debug, Clone, Default)]
pub struct PluginRegistry {
    plugins: Vec<Plugin>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_dirs<I, P>(dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        Self {
            plugins: dirs
                .into_iter()
                .map(|d| Plugin::new(d.as_ref()))
                .collect(),
        }
    }

    pub fn register(&mut self, plugin: Plugin) {
        self.plugins.push(plugin);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Plugin> {
        self.plugins.iter()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plugin_name_from_dir() {
        let plugin = Plugin::new("vendor/plugins/billing");
        assert_eq!(plugin.name, "billing");
        assert_eq!(plugin.sql_dir(), PathBuf::from("vendor/plugins/billing/sql"));
    }

    #[test]
    fn test_registry_keeps_registration_order() {
        let mut registry = PluginRegistry::from_dirs(["a", "b"]);
        registry.register(Plugin::new("c"));
        let names: Vec<_> = registry.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(registry.len(), 3);
    }
}
