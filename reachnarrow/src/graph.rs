//! The reachability graph: an explicit value owned by the builder.
//!
//! Nodes are identified by resolved callee keys (`kind.name.arity`) and held
//! in a petgraph arena; a key table gives O(1) identity lookups and an
//! alternate-name table supports arity- and kind-insensitive queries.

use std::path::PathBuf;

use petgraph::graph::{DiGraph, NodeIndex};
use rustc_hash::FxHashMap;
use serde_json::{Map, Value};

/// Key of the synthetic root node.
pub const ENTRY_KEY: &str = "__entry__";

#[derive(Debug)]
struct NodeData {
    key: String,
    file: PathBuf,
}

/// Directed reachability graph with a distinguished `__entry__` root.
#[derive(Debug)]
pub struct ReachGraph {
    graph: DiGraph<NodeData, ()>,
    keys: FxHashMap<String, NodeIndex>,
    // alias (name, kind.name, name.arity) -> resolved keys, de-duplicated
    alt: FxHashMap<String, Vec<String>>,
    root: NodeIndex,
}

impl Default for ReachGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl ReachGraph {
    /// A graph containing only the root. The root's file context is the
    /// empty sentinel path.
    pub fn new() -> Self {
        let mut graph = DiGraph::new();
        let root = graph.add_node(NodeData {
            key: ENTRY_KEY.to_owned(),
            file: PathBuf::new(),
        });
        let mut keys = FxHashMap::default();
        keys.insert(ENTRY_KEY.to_owned(), root);
        Self {
            graph,
            keys,
            alt: FxHashMap::default(),
            root,
        }
    }

    /// Renders the resolved key for a callee.
    pub fn resolved_key(kind: &str, name: &str, arity: usize) -> String {
        format!("{kind}.{name}.{arity}")
    }

    /// Whether a node with this exact resolved key exists.
    pub fn contains_key(&self, key: &str) -> bool {
        self.keys.contains_key(key)
    }

    /// Whether any node answers to `name`, optionally pinned to an arity.
    pub fn has(&self, name: &str, arity: Option<usize>) -> bool {
        let alias = match arity {
            Some(a) => format!("{name}.{a}"),
            None => name.to_owned(),
        };
        self.alt.contains_key(&alias) || self.keys.contains_key(name)
    }

    /// Records a call from the node keyed `caller` to `(kind, name, arity)`,
    /// inserting the callee node on first sight. Edge insertion is
    /// idempotent per `(caller, callee)` pair. Returns the callee key, or
    /// `None` when the caller is not in the graph (edges may only hang off
    /// existing nodes).
    pub fn add_call(
        &mut self,
        caller: &str,
        kind: &str,
        name: &str,
        arity: usize,
        file: PathBuf,
    ) -> Option<String> {
        let &from = self.keys.get(caller)?;
        let key = Self::resolved_key(kind, name, arity);

        let to = match self.keys.get(&key) {
            Some(&idx) => idx,
            None => {
                let idx = self.graph.add_node(NodeData {
                    key: key.clone(),
                    file,
                });
                self.keys.insert(key.clone(), idx);
                self.insert_alt(name, &key);
                self.insert_alt(&format!("{kind}.{name}"), &key);
                self.insert_alt(&format!("{name}.{arity}"), &key);
                idx
            }
        };

        if self.graph.find_edge(from, to).is_none() {
            self.graph.add_edge(from, to, ());
        }
        Some(key)
    }

    fn insert_alt(&mut self, alias: &str, key: &str) {
        let entries = self.alt.entry(alias.to_owned()).or_default();
        if !entries.iter().any(|k| k == key) {
            entries.push(key.to_owned());
        }
    }

    /// Resolved keys registered under an alias.
    pub fn keys_for_alias(&self, alias: &str) -> &[String] {
        self.alt.get(alias).map_or(&[], Vec::as_slice)
    }

    /// Whether the edge `from → to` exists, by resolved key.
    pub fn contains_edge(&self, from: &str, to: &str) -> bool {
        match (self.keys.get(from), self.keys.get(to)) {
            (Some(&f), Some(&t)) => self.graph.find_edge(f, t).is_some(),
            _ => false,
        }
    }

    /// Node count, root included.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Edge count.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// File recorded for a node key.
    pub fn file_of(&self, key: &str) -> Option<&PathBuf> {
        self.keys.get(key).map(|&idx| &self.graph[idx].file)
    }

    /// Expands the graph from the root into a nested JSON object, cutting
    /// back-edges so cycles print once. `max_depth` bounds the nesting.
    pub fn expanded(&self, max_depth: Option<usize>) -> Value {
        self.expand_node(self.root, max_depth, &mut Vec::new())
    }

    fn expand_node(
        &self,
        node: NodeIndex,
        max_depth: Option<usize>,
        path: &mut Vec<NodeIndex>,
    ) -> Value {
        if max_depth == Some(0) || path.contains(&node) {
            return Value::Object(Map::new());
        }
        path.push(node);
        let next_depth = max_depth.map(|d| d - 1);
        let mut children = Map::new();
        let mut neighbors: Vec<_> = self.graph.neighbors(node).collect();
        neighbors.reverse(); // petgraph iterates newest-first
        for neighbor in neighbors {
            children.insert(
                self.graph[neighbor].key.clone(),
                self.expand_node(neighbor, next_depth, path),
            );
        }
        path.pop();
        Value::Object(children)
    }

    /// Every simple path from the root to any node answering to `name`,
    /// rendered as key sequences.
    pub fn paths_to(&self, name: &str) -> Vec<Vec<String>> {
        let mut targets: Vec<NodeIndex> = Vec::new();
        for key in self.keys_for_alias(name) {
            if let Some(&idx) = self.keys.get(key) {
                targets.push(idx);
            }
        }
        if let Some(&idx) = self.keys.get(name) {
            if !targets.contains(&idx) {
                targets.push(idx);
            }
        }

        let mut out = Vec::new();
        for target in targets {
            let mut path = vec![self.root];
            self.simple_paths(target, &mut path, &mut out);
        }
        out
    }

    /// Depth-first enumeration of simple paths from the tip of `path` to
    /// `target`; the on-path check keeps cycles out.
    fn simple_paths(
        &self,
        target: NodeIndex,
        path: &mut Vec<NodeIndex>,
        out: &mut Vec<Vec<String>>,
    ) {
        let Some(&current) = path.last() else {
            return;
        };
        if current == target {
            out.push(path.iter().map(|&i| self.graph[i].key.clone()).collect());
            return;
        }
        let mut neighbors: Vec<_> = self.graph.neighbors(current).collect();
        neighbors.reverse();
        for neighbor in neighbors {
            if path.contains(&neighbor) {
                continue;
            }
            path.push(neighbor);
            self.simple_paths(target, path, out);
            path.pop();
        }
    }
}
