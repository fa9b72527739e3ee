//! Memoized inter-file definition index.
//!
//! Maps each visited file to the definitions it declares and the files it
//! directly imports. Populated once as the entry's import closure is walked;
//! afterwards lookups are served without reparsing.

use std::path::{Path, PathBuf};

use rustc_hash::{FxHashMap, FxHashSet};

use crate::visitor::Definition;

#[derive(Debug, Default)]
struct FileRecord {
    defs: Vec<Definition>,
    next: FxHashSet<PathBuf>,
}

/// Per-analysis index of definitions reachable through the import closure.
#[derive(Debug, Default)]
pub struct FuncImportIndex {
    files: FxHashMap<PathBuf, FileRecord>,
    ready: bool,
}

impl FuncImportIndex {
    /// An empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `file` has been indexed.
    pub fn has(&self, file: &Path) -> bool {
        self.files.contains_key(file)
    }

    /// Creates an empty record for `file` so that in-progress traversals do
    /// not revisit it.
    pub fn ensure_file(&mut self, file: &Path) {
        self.files.entry(file.to_path_buf()).or_default();
    }

    /// Records a definition declared in `file`.
    pub fn add_def(&mut self, file: &Path, def: Definition) {
        self.files.entry(file.to_path_buf()).or_default().defs.push(def);
    }

    /// Records that `start` directly imports `end`. Only the start record is
    /// materialized: `has(end)` keeps meaning "end was scanned".
    pub fn add_edge(&mut self, start: &Path, end: &Path) {
        self.files
            .entry(start.to_path_buf())
            .or_default()
            .next
            .insert(end.to_path_buf());
    }

    /// Marks the first full closure walk as finished.
    pub fn mark_ready(&mut self) {
        self.ready = true;
    }

    /// Whether [`mark_ready`](Self::mark_ready) was called.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Every definition reachable from `file` through successor edges.
    /// Cycle-safe: the visited set grows monotonically, so mutual imports
    /// and self-loops terminate.
    pub fn all_reachable(&self, file: &Path) -> Vec<&Definition> {
        let mut out = Vec::new();
        let mut visited = FxHashSet::default();
        let mut stack = vec![file.to_path_buf()];

        while let Some(current) = stack.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            let Some(record) = self.files.get(&current) else {
                continue;
            };
            out.extend(record.defs.iter());
            for next in &record.next {
                if !visited.contains(next) {
                    stack.push(next.clone());
                }
            }
        }
        out
    }
}
