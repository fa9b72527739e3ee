//! Dependency-extraction collaborator.
//!
//! The resolver needs, for every importable name reachable from the entry
//! file, the on-disk path and the dotted names it imports. Production use
//! shells out to `pydeps`; tests inject the map directly.

use std::path::{Path, PathBuf};
use std::process::Command;

use rustc_hash::FxHashMap;
use serde::Deserialize;

use crate::error::Error;

/// One entry of the dependency map.
#[derive(Debug, Clone, Deserialize)]
pub struct DepEntry {
    /// On-disk location of the module, when it has one.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Dotted names this module imports.
    #[serde(default)]
    pub imports: Vec<String>,
}

/// `dotted-name → { path, imports }`, rooted at the entry file.
pub type DepsMap = FxHashMap<String, DepEntry>;

/// Produces the dependency map for an entry file.
pub trait DependencyProvider {
    /// Returns the map of every importable name reachable from `entry`.
    fn dependency_map(&self, entry: &Path) -> Result<DepsMap, Error>;
}

/// Shells out to `pydeps` and decodes its `--show-deps` JSON.
pub struct PydepsProvider;

impl DependencyProvider for PydepsProvider {
    fn dependency_map(&self, entry: &Path) -> Result<DepsMap, Error> {
        let output = Command::new("pydeps")
            .arg(entry)
            .args([
                "--show-deps",
                "--pylib",
                "--no-show",
                "--max-bacon",
                "0",
                "--no-dot",
                "--include-missing",
            ])
            .output()
            .map_err(|e| Error::DependencyExtractorFailed(e.to_string()))?;

        serde_json::from_slice(&output.stdout)
            .map_err(|e| Error::DependencyExtractorFailed(e.to_string()))
    }
}

/// Returns injected data; the substitute provider for tests.
pub struct StaticProvider {
    map: DepsMap,
}

impl StaticProvider {
    /// Wraps a prebuilt map.
    pub fn new(map: DepsMap) -> Self {
        Self { map }
    }

    /// An empty map, for single-file analyses.
    pub fn empty() -> Self {
        Self {
            map: DepsMap::default(),
        }
    }
}

impl DependencyProvider for StaticProvider {
    fn dependency_map(&self, _entry: &Path) -> Result<DepsMap, Error> {
        Ok(self.map.clone())
    }
}
