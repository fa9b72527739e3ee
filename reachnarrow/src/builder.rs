//! The call-graph builder: walks the entry tree with an iterative worklist,
//! records call edges, expands callees into their bodies, and stops as soon
//! as any target name is reached.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use rustc_hash::FxHashSet;

use crate::deps::DependencyProvider;
use crate::error::Error;
use crate::graph::{ReachGraph, ENTRY_KEY};
use crate::index::FuncImportIndex;
use crate::resolver::ImportResolver;
use crate::syntax::{is_python_source, FileId, FileStore, NodeId, NodeKind};
use crate::visitor::{self, Definition};

/// Kind tag used for call nodes whose defining scope is not tracked.
const UNKNOWN_KIND: &str = "unknown";

/// One unit of traversal work.
struct ResolveTask {
    file: FileId,
    node: NodeId,
    context: Vec<String>,
}

/// Removes the compensating symlink for an extensionless entry file when the
/// builder goes away, whichever way the analysis exits.
struct SymlinkGuard {
    path: PathBuf,
}

impl Drop for SymlinkGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Builds a reachability graph from an entry file and reports whether any
/// target function was reached.
pub struct CallGraphBuilder {
    targets: FxHashSet<String>,
    resolver: ImportResolver,
    files: FileStore,
    index: FuncImportIndex,
    graph: ReachGraph,
    queue: VecDeque<ResolveTask>,
    import_cache: FxHashSet<PathBuf>,
    detected: bool,
    deps_entry: PathBuf,
    _symlink: Option<SymlinkGuard>,
}

impl CallGraphBuilder {
    /// Creates an empty builder probing for `targets`.
    pub fn new(
        targets: impl IntoIterator<Item = String>,
        provider: Box<dyn DependencyProvider>,
        module_backtrack: usize,
    ) -> Result<Self, Error> {
        Ok(Self {
            targets: targets.into_iter().collect(),
            resolver: ImportResolver::new(provider, module_backtrack),
            files: FileStore::new()?,
            index: FuncImportIndex::new(),
            graph: ReachGraph::new(),
            queue: VecDeque::new(),
            import_cache: FxHashSet::default(),
            detected: false,
            deps_entry: PathBuf::new(),
            _symlink: None,
        })
    }

    /// Parses `entry`, seeds the worklist with its module root under the
    /// `__entry__` context, and drains the worklist until it is empty or a
    /// target is detected. All per-analysis state is rebuilt on every call,
    /// so repeated runs over the same inputs produce equal graphs.
    pub fn build_from_entry(&mut self, entry: &Path) -> Result<(), Error> {
        if !entry.is_file() {
            return Err(Error::EntryNotFound(entry.to_path_buf()));
        }

        self.graph = ReachGraph::new();
        self.index = FuncImportIndex::new();
        self.files = FileStore::new()?;
        self.queue = VecDeque::new();
        self.import_cache = FxHashSet::default();
        self.detected = false;
        self.resolver.reset();
        self._symlink = None;
        self.deps_entry = self.mitigate_extensionless(entry);

        let entry_id = self
            .files
            .load(entry)
            .map_err(|_| Error::EntryNotFound(entry.to_path_buf()))?;
        let root = self.files.tree(entry_id).root();
        self.queue.push_back(ResolveTask {
            file: entry_id,
            node: root,
            context: vec![ENTRY_KEY.to_owned()],
        });

        while let Some(task) = self.queue.pop_front() {
            if self.detected {
                break;
            }
            self.dispatch(&task)?;
        }
        Ok(())
    }

    /// Whether any target name was reached.
    pub fn detected(&self) -> bool {
        self.detected
    }

    /// Whether the graph holds a node answering to `name`, optionally pinned
    /// to an arity.
    pub fn has(&self, name: &str, arity: Option<usize>) -> bool {
        self.graph.has(name, arity)
    }

    /// The reachability graph of the last analysis.
    pub fn graph(&self) -> &ReachGraph {
        &self.graph
    }

    /// How many files the last analysis parsed. Each file is parsed at most
    /// once.
    pub fn parsed_files(&self) -> usize {
        self.files.len()
    }

    /// The dependency extractor chokes on extensionless entry files; give it
    /// a `.py` symlink to chew on instead and tear it down with the builder.
    fn mitigate_extensionless(&mut self, entry: &Path) -> PathBuf {
        if entry.extension().is_some() {
            return entry.to_path_buf();
        }
        let link = entry.with_extension("py");
        #[cfg(unix)]
        let created = std::os::unix::fs::symlink(entry, &link);
        #[cfg(not(unix))]
        let created = std::fs::copy(entry, &link).map(|_| ());
        match created {
            Ok(()) => {
                self._symlink = Some(SymlinkGuard { path: link.clone() });
                link
            }
            Err(_) => entry.to_path_buf(),
        }
    }

    fn dispatch(&mut self, task: &ResolveTask) -> Result<(), Error> {
        let kind = self.files.tree(task.file).kind(task.node);
        match kind {
            NodeKind::Module
            | NodeKind::Block
            | NodeKind::ExpressionStatement
            | NodeKind::ParenthesizedExpression
            | NodeKind::ConditionalExpression
            | NodeKind::RaiseStatement
            | NodeKind::ReturnStatement
            | NodeKind::WithStatement
            | NodeKind::WithClause
            | NodeKind::WithItem
            | NodeKind::AsPattern => self.enqueue_children(task),
            NodeKind::IfStatement | NodeKind::ElifClause => {
                self.enqueue_fields(task, &["condition", "consequence"]);
                self.enqueue_field_list(task, "alternative");
            }
            NodeKind::ElseClause => self.enqueue_fields(task, &["body"]),
            NodeKind::WhileStatement => self.enqueue_fields(task, &["condition", "body"]),
            NodeKind::ForStatement => self.enqueue_fields(task, &["left", "right", "body"]),
            NodeKind::Assignment | NodeKind::AugmentedAssignment => {
                self.enqueue_fields(task, &["right"]);
            }
            NodeKind::BinaryOperator | NodeKind::BooleanOperator => {
                self.enqueue_fields(task, &["left", "right"]);
            }
            NodeKind::NotOperator => self.enqueue_fields(task, &["argument"]),
            NodeKind::TryStatement => self.enqueue_fields(task, &["body"]),
            NodeKind::Dictionary => self.enqueue_pair_values(task),
            NodeKind::ImportStatement | NodeKind::ImportFromStatement => {
                self.handle_import(task)?;
            }
            NodeKind::Call => self.handle_call(task)?,
            // Literals, identifiers, definitions, subscripts, comments, and
            // any kind the grammar grows later.
            _ => {}
        }
        Ok(())
    }

    fn enqueue(&mut self, file: FileId, node: NodeId, context: Vec<String>) {
        self.queue.push_back(ResolveTask {
            file,
            node,
            context,
        });
    }

    fn enqueue_children(&mut self, task: &ResolveTask) {
        let children: Vec<NodeId> = self.files.tree(task.file).named_children(task.node).collect();
        for child in children {
            self.enqueue(task.file, child, task.context.clone());
        }
    }

    fn enqueue_fields(&mut self, task: &ResolveTask, names: &[&str]) {
        let tree = self.files.tree(task.file);
        let nodes: Vec<NodeId> = names
            .iter()
            .filter_map(|name| tree.field(task.node, name))
            .collect();
        for node in nodes {
            self.enqueue(task.file, node, task.context.clone());
        }
    }

    fn enqueue_field_list(&mut self, task: &ResolveTask, name: &str) {
        let nodes = self.files.tree(task.file).fields(task.node, name);
        for node in nodes {
            self.enqueue(task.file, node, task.context.clone());
        }
    }

    fn enqueue_pair_values(&mut self, task: &ResolveTask) {
        let tree = self.files.tree(task.file);
        let values: Vec<NodeId> = tree
            .named_children(task.node)
            .filter(|&child| tree.kind(child) == NodeKind::Pair)
            .filter_map(|pair| tree.field(pair, "value"))
            .collect();
        for value in values {
            self.enqueue(task.file, value, task.context.clone());
        }
    }

    /// Expands an import statement: resolve it to files, record the graph
    /// edge, and enqueue each newly seen file's module root under an
    /// extended context.
    fn handle_import(&mut self, task: &ResolveTask) -> Result<(), Error> {
        let current_path = self.files.path(task.file).to_path_buf();
        let records = visitor::imports(self.files.tree(task.file), task.node);
        let Some(caller) = task.context.last().cloned() else {
            return Ok(());
        };

        for record in records {
            let deps_entry = self.deps_entry.clone();
            let paths = self.resolver.resolve(
                &deps_entry,
                &record.name,
                &current_path,
                &record.module,
                record.level,
            )?;

            let already_known = self.graph.has(&record.name, None);
            for path in paths {
                if !is_python_source(&path) || self.import_cache.contains(&path) {
                    continue;
                }
                self.import_cache.insert(path.clone());
                let Ok(file) = self.files.load(&path) else {
                    continue;
                };

                let Some(key) =
                    self.graph
                        .add_call(&caller, UNKNOWN_KIND, &record.name, 0, path)
                else {
                    continue;
                };
                if !already_known {
                    let mut context = task.context.clone();
                    context.push(key);
                    let root = self.files.tree(file).root();
                    self.enqueue(file, root, context);
                }
            }
        }
        Ok(())
    }

    /// Resolves one call site: record the callee node, expand matching
    /// definition bodies, flag detection, and keep walking the arguments so
    /// nested calls are discovered.
    fn handle_call(&mut self, task: &ResolveTask) -> Result<(), Error> {
        let (name, arity, arg_children) = {
            let tree = self.files.tree(task.file);
            let callee = tree.field(task.node, "function");
            let name = callee.and_then(|c| match tree.kind(c) {
                NodeKind::Identifier => Some(tree.text(c).to_owned()),
                NodeKind::Subscript => None,
                _ => tree.field(c, "attribute").map(|a| tree.text(a).to_owned()),
            });
            let args = tree.field(task.node, "arguments");
            let arity = args.map_or(0, |a| tree.named_child_count(a));
            let arg_children: Vec<NodeId> = args
                .map(|a| tree.named_children(a).collect())
                .unwrap_or_default();
            (name, arity, arg_children)
        };

        if let Some(name) = name {
            if !self.graph.has(&name, Some(arity)) {
                let current_path = self.files.path(task.file).to_path_buf();
                let key = task.context.last().cloned().and_then(|caller| {
                    self.graph
                        .add_call(&caller, UNKNOWN_KIND, &name, arity, current_path)
                });

                if let Some(key) = key {
                    for def in self.definitions_matching(task.file, &name)? {
                        if !def.matches_arity(arity) {
                            continue;
                        }
                        if let Some(body) = def.body {
                            let mut context = task.context.clone();
                            context.push(key.clone());
                            self.enqueue(def.file, body, context);
                        }
                        if self.targets.contains(&def.name) {
                            self.detected = true;
                            return Ok(());
                        }
                    }
                }
            }

            if self.targets.contains(&name) {
                self.detected = true;
                return Ok(());
            }
        }

        for child in arg_children {
            self.enqueue(task.file, child, task.context.clone());
        }
        Ok(())
    }

    /// Definitions anywhere in the import closure of `file` whose display
    /// name matches, indexing the closure on first demand.
    fn definitions_matching(&mut self, file: FileId, name: &str) -> Result<Vec<Definition>, Error> {
        self.ensure_indexed(file)?;
        let path = self.files.path(file).to_path_buf();
        Ok(self
            .index
            .all_reachable(&path)
            .into_iter()
            .filter(|def| def.name == name)
            .cloned()
            .collect())
    }

    /// Walks the import closure starting at `file`, recording definitions
    /// and successor edges for every file not yet indexed.
    fn ensure_indexed(&mut self, file: FileId) -> Result<(), Error> {
        let path = self.files.path(file).to_path_buf();
        if self.index.has(&path) {
            return Ok(());
        }

        let mut stack = vec![file];
        while let Some(current) = stack.pop() {
            let current_path = self.files.path(current).to_path_buf();
            if self.index.has(&current_path) {
                continue;
            }
            self.index.ensure_file(&current_path);

            for def in visitor::collect_definitions(self.files.tree(current), current) {
                self.index.add_def(&current_path, def);
            }

            let root = self.files.tree(current).root();
            let records = visitor::imports(self.files.tree(current), root);
            for record in records {
                let deps_entry = self.deps_entry.clone();
                let paths = self.resolver.resolve(
                    &deps_entry,
                    &record.name,
                    &current_path,
                    &record.module,
                    record.level,
                )?;
                for path in paths {
                    if !is_python_source(&path) {
                        continue;
                    }
                    let Ok(next) = self.files.load(&path) else {
                        continue;
                    };
                    let next_path = self.files.path(next).to_path_buf();
                    self.index.add_edge(&current_path, &next_path);
                    if !self.index.has(&next_path) {
                        stack.push(next);
                    }
                }
            }
        }

        if !self.index.is_ready() {
            self.index.mark_ready();
        }
        Ok(())
    }
}
