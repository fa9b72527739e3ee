//! Shallow tree walks that enumerate definitions, class initializers, and
//! imports from a lowered syntax tree.
//!
//! The definition walks never cross into nested function or class bodies:
//! each invocation enumerates exactly one scope. The import walk descends
//! everywhere, since lazy imports inside functions still widen the import
//! closure and reachability is deliberately over-approximate on imports.

use rustc_hash::FxHashSet;

use crate::syntax::{FileId, NodeId, NodeKind, SourceTree};

/// What a collected definition is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefKind {
    /// Plain function definition.
    Function,
    /// Class initializer; the display name is the class name.
    ClassInit,
}

/// A callable definition collected from a source file.
#[derive(Debug, Clone)]
pub struct Definition {
    /// Function or class-init.
    pub kind: DefKind,
    /// Declared identifier; for a class initializer, the class name.
    pub name: String,
    /// File the definition lives in.
    pub file: FileId,
    /// The `function_definition` node.
    pub node: NodeId,
    /// Body block, when the grammar produced one.
    pub body: Option<NodeId>,
    /// Required positional parameters, receiver excluded.
    pub required: usize,
    /// Defaulted, variadic, and keyword-splat parameters.
    pub defaulted: usize,
}

impl Definition {
    /// Whether a call with `arity` arguments can bind to this definition:
    /// every required parameter filled, surplus covered by defaults.
    pub fn matches_arity(&self, arity: usize) -> bool {
        self.required == arity || (self.required < arity && arity - self.required <= self.defaulted)
    }
}

/// One import reference extracted from a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRecord {
    /// Imported name (`b` in `from a import b`, `a` in `import a`).
    pub name: String,
    /// Module path, empty for plain `import` statements.
    pub module: String,
    /// 1 for relative (`from . import …`) imports, 0 otherwise.
    pub level: u8,
    /// The import statement node.
    pub node: NodeId,
}

/// Collects every `function_definition` reachable from `start` without
/// crossing into another function or class body. Names are unique by first
/// occurrence.
pub fn function_defs(tree: &SourceTree, start: NodeId) -> Vec<(String, NodeId)> {
    let mut out = Vec::new();
    let mut seen = FxHashSet::default();
    let mut stack = vec![(start, true)];

    while let Some((node, is_start)) = stack.pop() {
        match tree.kind(node) {
            NodeKind::FunctionDefinition if !is_start => {
                if let Some(name_node) = tree.field(node, "name") {
                    let name = tree.text(name_node).to_owned();
                    if seen.insert(name.clone()) {
                        out.push((name, node));
                    }
                }
                // Do not descend into the body.
            }
            NodeKind::ClassDefinition if !is_start => {}
            _ => {
                // Reverse push keeps first-occurrence order stable.
                let children: Vec<_> = tree.named_children(node).collect();
                for child in children.into_iter().rev() {
                    stack.push((child, false));
                }
            }
        }
    }
    out
}

/// For every class reachable from `start` (same nesting rules as
/// [`function_defs`]), emits `(class name, init node)` for each `__init__`
/// found in the class body. Distinct classes sharing a name each contribute
/// an entry.
pub fn class_inits(tree: &SourceTree, start: NodeId) -> Vec<(String, NodeId)> {
    let mut out = Vec::new();
    let mut stack = vec![(start, true)];

    while let Some((node, is_start)) = stack.pop() {
        match tree.kind(node) {
            NodeKind::ClassDefinition if !is_start => {
                let Some(name_node) = tree.field(node, "name") else {
                    continue;
                };
                let class_name = tree.text(name_node).to_owned();
                if let Some(body) = tree.field(node, "body") {
                    for (method_name, method_node) in function_defs(tree, body) {
                        if method_name == "__init__" {
                            out.push((class_name.clone(), method_node));
                        }
                    }
                }
            }
            NodeKind::FunctionDefinition if !is_start => {}
            _ => {
                let children: Vec<_> = tree.named_children(node).collect();
                for child in children.into_iter().rev() {
                    stack.push((child, false));
                }
            }
        }
    }
    out
}

/// Extracts one [`ImportRecord`] per distinct import key reachable from
/// `start` (first occurrence wins). Works both on whole modules and on a
/// single import statement node.
pub fn imports(tree: &SourceTree, start: NodeId) -> Vec<ImportRecord> {
    let mut out = Vec::new();
    let mut seen = FxHashSet::default();
    let mut stack = vec![start];

    while let Some(node) = stack.pop() {
        match tree.kind(node) {
            NodeKind::ImportStatement => {
                if let Some(name) = first_import_name(tree, node) {
                    let key = name.clone();
                    if seen.insert(key) {
                        out.push(ImportRecord {
                            name,
                            module: String::new(),
                            level: 0,
                            node,
                        });
                    }
                }
            }
            NodeKind::ImportFromStatement => {
                let (module, level) = match tree.field(node, "module_name") {
                    Some(m) => {
                        let text = tree.text(m);
                        match text.strip_prefix('.') {
                            Some(stripped) => (stripped.to_owned(), 1),
                            None => (text.to_owned(), 0),
                        }
                    }
                    None => (String::new(), 0),
                };
                if let Some(name) = first_import_name(tree, node) {
                    let key = format!("{module}.{name}");
                    if seen.insert(key) {
                        out.push(ImportRecord {
                            name,
                            module,
                            level,
                            node,
                        });
                    }
                }
            }
            _ => {
                let children: Vec<_> = tree.named_children(node).collect();
                for child in children.into_iter().rev() {
                    stack.push(child);
                }
            }
        }
    }
    out
}

/// Text of the first `name` field of an import statement, looking through
/// `as` aliases to the real imported name.
fn first_import_name(tree: &SourceTree, node: NodeId) -> Option<String> {
    let first = tree.field(node, "name")?;
    let target = if tree.kind(first) == NodeKind::AliasedImport {
        tree.field(first, "name")?
    } else {
        first
    };
    Some(tree.text(target).to_owned())
}

/// Computes `(required, defaulted)` parameter counts for a definition node.
/// The leading `self`/`cls` receiver is excluded from the required count.
pub fn parameter_counts(tree: &SourceTree, def_node: NodeId) -> (usize, usize) {
    let Some(params) = tree.field(def_node, "parameters") else {
        return (0, 0);
    };

    let mut required = 0usize;
    let mut defaulted = 0usize;
    let mut first = true;
    for child in tree.named_children(params) {
        match tree.kind(child) {
            NodeKind::Identifier | NodeKind::TypedParameter => {
                let receiver = first && is_receiver(tree, child);
                if !receiver {
                    required += 1;
                }
            }
            NodeKind::DefaultParameter
            | NodeKind::TypedDefaultParameter
            | NodeKind::ListSplatPattern
            | NodeKind::DictionarySplatPattern => defaulted += 1,
            _ => {}
        }
        first = false;
    }
    (required, defaulted)
}

fn is_receiver(tree: &SourceTree, param: NodeId) -> bool {
    let name = match tree.kind(param) {
        NodeKind::Identifier => tree.text(param),
        NodeKind::TypedParameter => tree
            .named_children(param)
            .next()
            .map(|n| tree.text(n))
            .unwrap_or(""),
        _ => "",
    };
    name == "self" || name == "cls"
}

/// Builds [`Definition`] records for everything callable in `file`, module
/// scope only: top-level functions plus class initializers.
pub fn collect_definitions(tree: &SourceTree, file: FileId) -> Vec<Definition> {
    let mut defs = Vec::new();

    for (name, node) in function_defs(tree, tree.root()) {
        let (required, defaulted) = parameter_counts(tree, node);
        defs.push(Definition {
            kind: DefKind::Function,
            name,
            file,
            node,
            body: tree.field(node, "body"),
            required,
            defaulted,
        });
    }

    for (class_name, init_node) in class_inits(tree, tree.root()) {
        let (required, defaulted) = parameter_counts(tree, init_node);
        defs.push(Definition {
            kind: DefKind::ClassInit,
            name: class_name,
            file,
            node: init_node,
            body: tree.field(init_node, "body"),
            required,
            defaulted,
        });
    }

    defs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::SourceTree;

    fn parse(source: &str) -> SourceTree {
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .unwrap();
        SourceTree::parse(&mut parser, source.to_owned())
    }

    #[test]
    fn collects_top_level_functions_only() {
        let tree = parse(
            "def outer():\n    def inner():\n        pass\n    pass\n\ndef other():\n    pass\n",
        );
        let defs = function_defs(&tree, tree.root());
        let names: Vec<_> = defs.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["outer", "other"]);
    }

    #[test]
    fn duplicate_names_keep_first_occurrence() {
        let tree = parse("def f():\n    pass\n\ndef f():\n    pass\n");
        let defs = function_defs(&tree, tree.root());
        assert_eq!(defs.len(), 1);
    }

    #[test]
    fn class_init_uses_class_name() {
        let tree = parse(
            "class Something:\n    def __init__(self):\n        pass\n    def other(self):\n        pass\n",
        );
        let inits = class_inits(&tree, tree.root());
        assert_eq!(inits.len(), 1);
        assert_eq!(inits[0].0, "Something");
    }

    #[test]
    fn methods_are_not_module_functions() {
        let tree = parse("class C:\n    def method(self):\n        pass\n");
        let defs = function_defs(&tree, tree.root());
        assert!(defs.is_empty());
    }

    #[test]
    fn import_statement_record() {
        let tree = parse("import math\n");
        let records = imports(&tree, tree.root());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "math");
        assert_eq!(records[0].module, "");
        assert_eq!(records[0].level, 0);
    }

    #[test]
    fn from_import_record_with_module() {
        let tree = parse("from os import path\n");
        let records = imports(&tree, tree.root());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "path");
        assert_eq!(records[0].module, "os");
        assert_eq!(records[0].level, 0);
    }

    #[test]
    fn relative_import_strips_one_dot() {
        let tree = parse("from .lib import helper\n");
        let records = imports(&tree, tree.root());
        assert_eq!(records[0].module, "lib");
        assert_eq!(records[0].level, 1);
    }

    #[test]
    fn aliased_import_uses_real_name() {
        let tree = parse("import numpy as np\n");
        let records = imports(&tree, tree.root());
        assert_eq!(records[0].name, "numpy");
    }

    #[test]
    fn duplicate_import_keys_collapse() {
        let tree = parse("import math\nimport math\n");
        let records = imports(&tree, tree.root());
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn parameter_counts_exclude_receiver_and_split_defaults() {
        let tree = parse("class C:\n    def __init__(self, a, b=1, *rest):\n        pass\n");
        let inits = class_inits(&tree, tree.root());
        let (required, defaulted) = parameter_counts(&tree, inits[0].1);
        assert_eq!(required, 1);
        assert_eq!(defaulted, 2);
    }

    #[test]
    fn arity_matching_window() {
        let def = Definition {
            kind: DefKind::Function,
            name: "f".to_owned(),
            file: crate::syntax::FileId::default_for_tests(),
            node: crate::syntax::NodeId::default_for_tests(),
            body: None,
            required: 2,
            defaulted: 2,
        };
        assert!(!def.matches_arity(1));
        assert!(def.matches_arity(2));
        assert!(def.matches_arity(3));
        assert!(def.matches_arity(4));
        assert!(!def.matches_arity(5));
    }
}
