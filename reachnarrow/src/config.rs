//! Loads defaults from a `.reachnarrow.toml` next to the entry file.

use std::path::Path;

use serde::Deserialize;

/// Top-level configuration struct.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// The main configuration section.
    #[serde(default)]
    pub reachnarrow: ReachnarrowConfig,
}

/// Configuration options mirroring the CLI flags.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct ReachnarrowConfig {
    /// Directory levels the module fallback search may climb.
    pub module_backtracking: Option<usize>,
    /// Print the resolved call graph after every analysis.
    pub print_cfg: Option<bool>,
    /// Depth limit when printing the graph.
    pub max_print_depth: Option<usize>,
    /// Print every call chain leading to a target.
    pub print_all_paths: Option<bool>,
}

impl Config {
    /// Reads `.reachnarrow.toml` from the directory containing `path` (or
    /// `path` itself when it is a directory). Missing or malformed files
    /// fall back to defaults.
    pub fn load_from_path(path: &Path) -> Self {
        let dir = if path.is_dir() {
            path
        } else {
            path.parent().unwrap_or_else(|| Path::new("."))
        };
        let file = dir.join(".reachnarrow.toml");
        match std::fs::read_to_string(&file) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_settings_next_to_the_entry() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(".reachnarrow.toml"),
            "[reachnarrow]\nmodule_backtracking = 4\nprint_cfg = true\n",
        )
        .unwrap();
        let entry = dir.path().join("main.py");
        std::fs::write(&entry, "").unwrap();

        let config = Config::load_from_path(&entry);
        assert_eq!(config.reachnarrow.module_backtracking, Some(4));
        assert_eq!(config.reachnarrow.print_cfg, Some(true));
        assert_eq!(config.reachnarrow.max_print_depth, None);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from_path(dir.path());
        assert!(config.reachnarrow.module_backtracking.is_none());
    }

    #[test]
    fn malformed_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".reachnarrow.toml"), "not toml [").unwrap();
        let config = Config::load_from_path(dir.path());
        assert!(config.reachnarrow.print_cfg.is_none());
    }
}
