//! Maps an import reference to candidate source files on disk.
//!
//! Resolution leans on the dependency-extractor map first and falls back to
//! a bounded filesystem walk. Absence of a candidate is not an error; the
//! caller simply cannot follow that import.

use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use rustc_hash::FxHashSet;

use crate::deps::{DependencyProvider, DepsMap};
use crate::error::Error;

/// Resolves `(name, module, level)` import references against the dependency
/// map of one entry file, with a filesystem fallback for modules the
/// extractor does not know.
pub struct ImportResolver {
    provider: Box<dyn DependencyProvider>,
    deps: Option<DepsMap>,
    module_backtrack: usize,
}

impl ImportResolver {
    /// Creates a resolver backed by `provider`. `module_backtrack` is how
    /// many directory levels above the importing file the fallback walk
    /// starts from.
    pub fn new(provider: Box<dyn DependencyProvider>, module_backtrack: usize) -> Self {
        Self {
            provider,
            deps: None,
            module_backtrack,
        }
    }

    /// Drops the cached dependency map so the next resolve re-extracts.
    pub fn reset(&mut self) {
        self.deps = None;
    }

    /// Resolves an import to zero or more candidate files. Each candidate is
    /// an independent possibility; duplicates are collapsed.
    pub fn resolve(
        &mut self,
        entry: &Path,
        name: &str,
        current_file: &Path,
        module: &str,
        level: u8,
    ) -> Result<Vec<PathBuf>, Error> {
        if self.deps.is_none() {
            self.deps = Some(self.provider.dependency_map(entry)?);
        }
        let Some(deps) = self.deps.as_ref() else {
            return Ok(Vec::new());
        };

        let mut results: Vec<PathBuf> = Vec::new();

        if level == 1 {
            if let Some(current) = deps.values().find(|d| {
                d.path
                    .as_deref()
                    .is_some_and(|p| same_file(p, current_file))
            }) {
                for imported in &current.imports {
                    if imported.ends_with(module) {
                        if let Some(path) = deps.get(imported).and_then(|d| d.path.clone()) {
                            results = vec![path];
                        }
                    }
                }
            }
        }

        let qualified = format!("{module}.{name}");
        let map_hit = if !module.is_empty() && deps.contains_key(&qualified) {
            Some(qualified.as_str())
        } else if module.is_empty() && deps.contains_key(name) {
            Some(name)
        } else if deps.contains_key(module) {
            Some(module)
        } else {
            None
        };
        if let Some(key) = map_hit {
            if let Some(path) = deps.get(key).and_then(|d| d.path.clone()) {
                results = vec![path];
            }
        }

        if results.is_empty() && !module.is_empty() {
            results.extend(self.walk_for_module(current_file, module, name));
        }

        let mut seen = FxHashSet::default();
        results.retain(|p| seen.insert(p.clone()));
        Ok(results)
    }

    /// Fallback: from an ancestor of `current_file`, look for a directory
    /// named like the module and a file inside it named like the import.
    fn walk_for_module(&self, current_file: &Path, module: &str, name: &str) -> Vec<PathBuf> {
        let mut results = Vec::new();
        let base = ancestor_dirs_up(current_file, self.module_backtrack);

        for entry in WalkBuilder::new(&base)
            .standard_filters(false)
            .build()
            .flatten()
        {
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            if !is_dir || entry.file_name().to_str() != Some(module) {
                continue;
            }
            if let Some(found) = file_with_stem(name, entry.path()) {
                results.push(found);
            } else {
                let init = entry.path().join("__init__.py");
                if init.is_file() {
                    results.push(init);
                }
            }
        }
        results
    }
}

/// The ancestor of `path` `n` levels up (saturating at the filesystem root).
fn ancestor_dirs_up(path: &Path, n: usize) -> PathBuf {
    let mut current = path;
    for _ in 0..n {
        current = current.parent().unwrap_or(current);
    }
    current.to_path_buf()
}

/// First file directly inside `dir` whose stem equals `name`.
fn file_with_stem(name: &str, dir: &Path) -> Option<PathBuf> {
    for entry in WalkBuilder::new(dir)
        .standard_filters(false)
        .max_depth(Some(1))
        .build()
        .flatten()
    {
        let is_file = entry.file_type().is_some_and(|t| t.is_file());
        if is_file && entry.path().file_stem().and_then(|s| s.to_str()) == Some(name) {
            return Some(entry.path().to_path_buf());
        }
    }
    None
}

/// Path equality that survives `./`-style prefixes and symlinked layouts.
fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(ca), Ok(cb)) => ca == cb,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deps::{DepEntry, StaticProvider};

    fn resolver_with(map: DepsMap) -> ImportResolver {
        ImportResolver::new(Box::new(StaticProvider::new(map)), 2)
    }

    fn entry(path: Option<&str>, imports: &[&str]) -> DepEntry {
        DepEntry {
            path: path.map(PathBuf::from),
            imports: imports.iter().map(|s| (*s).to_owned()).collect(),
        }
    }

    #[test]
    fn qualified_lookup_wins() {
        let mut map = DepsMap::default();
        map.insert("pkg.helper".to_owned(), entry(Some("/p/pkg/helper.py"), &[]));
        map.insert("pkg".to_owned(), entry(Some("/p/pkg/__init__.py"), &[]));

        let mut r = resolver_with(map);
        let paths = r
            .resolve(Path::new("/p/main.py"), "helper", Path::new("/p/main.py"), "pkg", 0)
            .unwrap();
        assert_eq!(paths, vec![PathBuf::from("/p/pkg/helper.py")]);
    }

    #[test]
    fn bare_lookup_for_plain_imports() {
        let mut map = DepsMap::default();
        map.insert("lib".to_owned(), entry(Some("/p/lib.py"), &[]));

        let mut r = resolver_with(map);
        let paths = r
            .resolve(Path::new("/p/main.py"), "lib", Path::new("/p/main.py"), "", 0)
            .unwrap();
        assert_eq!(paths, vec![PathBuf::from("/p/lib.py")]);
    }

    #[test]
    fn module_only_lookup_falls_through() {
        let mut map = DepsMap::default();
        map.insert("pkg".to_owned(), entry(Some("/p/pkg/__init__.py"), &[]));

        let mut r = resolver_with(map);
        let paths = r
            .resolve(Path::new("/p/main.py"), "thing", Path::new("/p/main.py"), "pkg", 0)
            .unwrap();
        assert_eq!(paths, vec![PathBuf::from("/p/pkg/__init__.py")]);
    }

    #[test]
    fn relative_import_uses_importer_entry() {
        let mut map = DepsMap::default();
        map.insert(
            "pkg.main".to_owned(),
            entry(Some("/p/pkg/main.py"), &["pkg.sibling"]),
        );
        map.insert(
            "pkg.sibling".to_owned(),
            entry(Some("/p/pkg/sibling.py"), &[]),
        );

        let mut r = resolver_with(map);
        let paths = r
            .resolve(
                Path::new("/p/pkg/main.py"),
                "thing",
                Path::new("/p/pkg/main.py"),
                "sibling",
                1,
            )
            .unwrap();
        assert_eq!(paths, vec![PathBuf::from("/p/pkg/sibling.py")]);
    }

    #[test]
    fn null_paths_are_dropped() {
        let mut map = DepsMap::default();
        map.insert("sys".to_owned(), entry(None, &[]));

        let mut r = resolver_with(map);
        let paths = r
            .resolve(Path::new("/p/main.py"), "sys", Path::new("/p/main.py"), "", 0)
            .unwrap();
        assert!(paths.is_empty());
    }

    #[test]
    fn filesystem_walk_finds_module_dir() {
        let dir = tempfile::tempdir().unwrap();
        let pkg = dir.path().join("mylib");
        std::fs::create_dir(&pkg).unwrap();
        std::fs::write(pkg.join("helper.py"), "def helper():\n    pass\n").unwrap();
        let entry_file = dir.path().join("app").join("main.py");
        std::fs::create_dir(entry_file.parent().unwrap()).unwrap();
        std::fs::write(&entry_file, "").unwrap();

        let mut r = resolver_with(DepsMap::default());
        let paths = r
            .resolve(&entry_file, "helper", &entry_file, "mylib", 0)
            .unwrap();
        assert_eq!(paths, vec![pkg.join("helper.py")]);
    }

    #[test]
    fn filesystem_walk_falls_back_to_package_init() {
        let dir = tempfile::tempdir().unwrap();
        let pkg = dir.path().join("mylib");
        std::fs::create_dir(&pkg).unwrap();
        std::fs::write(pkg.join("__init__.py"), "").unwrap();
        let entry_file = dir.path().join("app").join("main.py");
        std::fs::create_dir(entry_file.parent().unwrap()).unwrap();
        std::fs::write(&entry_file, "").unwrap();

        let mut r = resolver_with(DepsMap::default());
        let paths = r
            .resolve(&entry_file, "missing", &entry_file, "mylib", 0)
            .unwrap();
        assert_eq!(paths, vec![pkg.join("__init__.py")]);
    }

    #[test]
    fn unknown_imports_resolve_to_nothing() {
        let mut r = resolver_with(DepsMap::default());
        let paths = r
            .resolve(
                Path::new("/nonexistent/main.py"),
                "ghost",
                Path::new("/nonexistent/main.py"),
                "",
                0,
            )
            .unwrap();
        assert!(paths.is_empty());
    }
}
