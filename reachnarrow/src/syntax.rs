//! Syntax adapter: parses Python source with tree-sitter and lowers the CST
//! into an owned arena tree.
//!
//! Tree-sitter nodes borrow their parse tree, which makes them awkward to
//! carry through a long-lived worklist. The lowering pass copies every named
//! node into a flat arena (`SourceTree`) addressed by integer handles, so the
//! rest of the pipeline never holds a borrow into parser state.

use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;

use crate::error::Error;

/// Kinds the call-graph builder dispatches on. Everything the grammar can
/// produce that is not listed here lowers to `Other` and is ignored by the
/// builder, though it stays traversable for the visitors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Top-level module node.
    Module,
    /// `import a` statement.
    ImportStatement,
    /// `from a import b` statement.
    ImportFromStatement,
    /// Expression used as a statement.
    ExpressionStatement,
    /// `if` statement.
    IfStatement,
    /// `elif` clause of an `if` statement.
    ElifClause,
    /// `else` clause.
    ElseClause,
    /// `for` loop.
    ForStatement,
    /// `while` loop.
    WhileStatement,
    /// `with` statement.
    WithStatement,
    /// Clause listing the items of a `with` statement.
    WithClause,
    /// Single context-manager item inside a `with` clause.
    WithItem,
    /// `expr as name` pattern (context managers, match arms).
    AsPattern,
    /// `try` statement.
    TryStatement,
    /// Indented suite of statements.
    Block,
    /// Assignment statement.
    Assignment,
    /// Augmented assignment (`+=` and friends).
    AugmentedAssignment,
    /// Call expression.
    Call,
    /// Parenthesized expression.
    ParenthesizedExpression,
    /// `not` operator.
    NotOperator,
    /// Ternary conditional expression.
    ConditionalExpression,
    /// `raise` statement.
    RaiseStatement,
    /// `return` statement.
    ReturnStatement,
    /// Binary arithmetic/comparison operator.
    BinaryOperator,
    /// `and`/`or` operator.
    BooleanOperator,
    /// Dictionary literal.
    Dictionary,
    /// Key/value pair inside a dictionary literal.
    Pair,
    /// Function definition.
    FunctionDefinition,
    /// Class definition.
    ClassDefinition,
    /// Identifier.
    Identifier,
    /// Attribute access.
    Attribute,
    /// Subscript expression.
    Subscript,
    /// `name as alias` inside an import.
    AliasedImport,
    /// Dotted module name.
    DottedName,
    /// Comment.
    Comment,
    /// `name: type` parameter.
    TypedParameter,
    /// `name=value` parameter.
    DefaultParameter,
    /// `name: type = value` parameter.
    TypedDefaultParameter,
    /// `*args` parameter pattern.
    ListSplatPattern,
    /// `**kwargs` parameter pattern.
    DictionarySplatPattern,
    /// Any named node the builder does not react to.
    Other,
}

impl NodeKind {
    fn from_grammar(kind: &str) -> Self {
        match kind {
            "module" => Self::Module,
            "import_statement" => Self::ImportStatement,
            "import_from_statement" => Self::ImportFromStatement,
            "expression_statement" => Self::ExpressionStatement,
            "if_statement" => Self::IfStatement,
            "elif_clause" => Self::ElifClause,
            "else_clause" => Self::ElseClause,
            "for_statement" => Self::ForStatement,
            "while_statement" => Self::WhileStatement,
            "with_statement" => Self::WithStatement,
            "with_clause" => Self::WithClause,
            "with_item" => Self::WithItem,
            "as_pattern" => Self::AsPattern,
            "try_statement" => Self::TryStatement,
            "block" => Self::Block,
            "assignment" => Self::Assignment,
            "augmented_assignment" => Self::AugmentedAssignment,
            "call" => Self::Call,
            "parenthesized_expression" => Self::ParenthesizedExpression,
            "not_operator" => Self::NotOperator,
            "conditional_expression" => Self::ConditionalExpression,
            "raise_statement" => Self::RaiseStatement,
            "return_statement" => Self::ReturnStatement,
            "binary_operator" => Self::BinaryOperator,
            "boolean_operator" => Self::BooleanOperator,
            "dictionary" => Self::Dictionary,
            "pair" => Self::Pair,
            "function_definition" => Self::FunctionDefinition,
            "class_definition" => Self::ClassDefinition,
            "identifier" => Self::Identifier,
            "attribute" => Self::Attribute,
            "subscript" => Self::Subscript,
            "aliased_import" => Self::AliasedImport,
            "dotted_name" => Self::DottedName,
            "comment" => Self::Comment,
            "typed_parameter" => Self::TypedParameter,
            "default_parameter" => Self::DefaultParameter,
            "typed_default_parameter" => Self::TypedDefaultParameter,
            "list_splat_pattern" => Self::ListSplatPattern,
            "dictionary_splat_pattern" => Self::DictionarySplatPattern,
            _ => Self::Other,
        }
    }
}

/// Handle to a node inside its owning [`SourceTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

#[cfg(test)]
impl NodeId {
    pub(crate) fn default_for_tests() -> Self {
        NodeId(0)
    }
}

#[derive(Debug)]
struct SyntaxNode {
    kind: NodeKind,
    start: usize,
    end: usize,
    children: Vec<(Option<&'static str>, NodeId)>,
}

/// An owned, lowered syntax tree for one source file.
#[derive(Debug)]
pub struct SourceTree {
    source: String,
    nodes: Vec<SyntaxNode>,
}

impl SourceTree {
    /// Parses `source` and lowers the resulting CST.
    ///
    /// A parser failure yields an empty tree whose root is `Other`; callers
    /// treat such a tree as a no-op file.
    pub fn parse(parser: &mut tree_sitter::Parser, source: String) -> Self {
        let Some(tree) = parser.parse(source.as_bytes(), None) else {
            return Self::empty(source);
        };
        Self::lower(&tree, source)
    }

    fn empty(source: String) -> Self {
        Self {
            nodes: vec![SyntaxNode {
                kind: NodeKind::Other,
                start: 0,
                end: 0,
                children: Vec::new(),
            }],
            source,
        }
    }

    /// Copies every named CST node into the arena, depth-first, with an
    /// explicit stack so deeply nested sources cannot exhaust the call stack.
    fn lower(tree: &tree_sitter::Tree, source: String) -> Self {
        let root = tree.root_node();
        let mut nodes = vec![SyntaxNode {
            kind: NodeKind::from_grammar(root.kind()),
            start: root.start_byte(),
            end: root.end_byte(),
            children: Vec::new(),
        }];

        let mut stack: Vec<(tree_sitter::Node<'_>, Option<&'static str>, u32)> = Vec::new();
        push_named_children(root, 0, &mut stack);

        while let Some((ts_node, field, parent)) = stack.pop() {
            let id = NodeId(u32::try_from(nodes.len()).unwrap_or(u32::MAX));
            nodes.push(SyntaxNode {
                kind: NodeKind::from_grammar(ts_node.kind()),
                start: ts_node.start_byte(),
                end: ts_node.end_byte(),
                children: Vec::new(),
            });
            nodes[parent as usize].children.push((field, id));
            push_named_children(ts_node, id.0, &mut stack);
        }

        Self { source, nodes }
    }

    /// Root node of the tree.
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Kind of `node`.
    pub fn kind(&self, node: NodeId) -> NodeKind {
        self.nodes[node.0 as usize].kind
    }

    /// Ordered named children of `node`.
    pub fn named_children(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes[node.0 as usize].children.iter().map(|(_, id)| *id)
    }

    /// Number of named children of `node`.
    pub fn named_child_count(&self, node: NodeId) -> usize {
        self.nodes[node.0 as usize].children.len()
    }

    /// First child of `node` carrying the grammar field `name`.
    pub fn field(&self, node: NodeId, name: &str) -> Option<NodeId> {
        self.nodes[node.0 as usize]
            .children
            .iter()
            .find(|(field, _)| *field == Some(name))
            .map(|(_, id)| *id)
    }

    /// Every child of `node` carrying the grammar field `name`.
    pub fn fields(&self, node: NodeId, name: &str) -> Vec<NodeId> {
        self.nodes[node.0 as usize]
            .children
            .iter()
            .filter(|(field, _)| *field == Some(name))
            .map(|(_, id)| *id)
            .collect()
    }

    /// Original source text spanned by `node`.
    pub fn text(&self, node: NodeId) -> &str {
        let n = &self.nodes[node.0 as usize];
        self.source.get(n.start..n.end).unwrap_or("")
    }
}

/// Pushes the named children of `node` onto the lowering stack in reverse so
/// they are popped, and therefore appended to their parent, in source order.
fn push_named_children<'t>(
    node: tree_sitter::Node<'t>,
    parent: u32,
    stack: &mut Vec<(tree_sitter::Node<'t>, Option<&'static str>, u32)>,
) {
    let mut cursor = node.walk();
    let mut children = Vec::new();
    if cursor.goto_first_child() {
        loop {
            let child = cursor.node();
            if child.is_named() {
                children.push((child, cursor.field_name(), parent));
            }
            if !cursor.goto_next_sibling() {
                break;
            }
        }
    }
    children.reverse();
    stack.append(&mut children);
}

/// Handle to a file loaded into a [`FileStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId(u32);

#[cfg(test)]
impl FileId {
    pub(crate) fn default_for_tests() -> Self {
        FileId(0)
    }
}

/// Per-analysis store of parsed files. Each path is read and parsed at most
/// once per store lifetime.
pub struct FileStore {
    parser: tree_sitter::Parser,
    trees: Vec<SourceTree>,
    paths: Vec<PathBuf>,
    by_path: FxHashMap<PathBuf, FileId>,
}

impl FileStore {
    /// Creates a store with the Python grammar loaded.
    pub fn new() -> Result<Self, Error> {
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .map_err(|e| Error::ParseFailure(format!("failed to load Python grammar: {e}")))?;
        Ok(Self {
            parser,
            trees: Vec::new(),
            paths: Vec::new(),
            by_path: FxHashMap::default(),
        })
    }

    /// Reads and parses `path`, returning the existing id when the file was
    /// already loaded.
    pub fn load(&mut self, path: &Path) -> Result<FileId, Error> {
        if let Some(id) = self.by_path.get(path) {
            return Ok(*id);
        }
        let source = std::fs::read_to_string(path)?;
        Ok(self.insert(path.to_path_buf(), source))
    }

    /// Parses in-memory source under the given path key (tests and symlinked
    /// entry points).
    pub fn insert(&mut self, path: PathBuf, source: String) -> FileId {
        if let Some(id) = self.by_path.get(&path) {
            return *id;
        }
        let tree = SourceTree::parse(&mut self.parser, source);
        let id = FileId(u32::try_from(self.trees.len()).unwrap_or(u32::MAX));
        self.trees.push(tree);
        self.paths.push(path.clone());
        self.by_path.insert(path, id);
        id
    }

    /// Lowered tree for `id`.
    pub fn tree(&self, id: FileId) -> &SourceTree {
        &self.trees[id.0 as usize]
    }

    /// Path the file was loaded from.
    pub fn path(&self, id: FileId) -> &Path {
        &self.paths[id.0 as usize]
    }

    /// Number of files parsed so far.
    pub fn len(&self) -> usize {
        self.trees.len()
    }

    /// Whether no file has been parsed yet.
    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }
}

/// Whether `path` looks like Python source (the `text/x-python` MIME family).
pub fn is_python_source(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("py" | "pyw")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> SourceTree {
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .unwrap();
        SourceTree::parse(&mut parser, source.to_owned())
    }

    #[test]
    fn lowers_module_with_function() {
        let tree = parse("def hello():\n    pass\n");
        assert_eq!(tree.kind(tree.root()), NodeKind::Module);
        let children: Vec<_> = tree.named_children(tree.root()).collect();
        assert_eq!(children.len(), 1);
        assert_eq!(tree.kind(children[0]), NodeKind::FunctionDefinition);
        let name = tree.field(children[0], "name").unwrap();
        assert_eq!(tree.text(name), "hello");
    }

    #[test]
    fn field_lookup_on_if_statement() {
        let tree = parse("if x:\n    f()\nelse:\n    g()\n");
        let stmt = tree.named_children(tree.root()).next().unwrap();
        assert_eq!(tree.kind(stmt), NodeKind::IfStatement);
        assert!(tree.field(stmt, "condition").is_some());
        assert!(tree.field(stmt, "consequence").is_some());
        assert_eq!(tree.fields(stmt, "alternative").len(), 1);
    }

    #[test]
    fn call_arguments_are_counted_as_named_children() {
        let tree = parse("f(a, b=1, *rest)\n");
        let stmt = tree.named_children(tree.root()).next().unwrap();
        let call = tree.named_children(stmt).next().unwrap();
        assert_eq!(tree.kind(call), NodeKind::Call);
        let args = tree.field(call, "arguments").unwrap();
        assert_eq!(tree.named_child_count(args), 3);
    }

    #[test]
    fn broken_source_still_produces_a_module() {
        let tree = parse("def broken(\n");
        assert_eq!(tree.kind(tree.root()), NodeKind::Module);
    }

    #[test]
    fn store_parses_each_path_once() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("m.py");
        std::fs::write(&file, "x = 1\n").unwrap();

        let mut store = FileStore::new().unwrap();
        let a = store.load(&file).unwrap();
        let b = store.load(&file).unwrap();
        assert_eq!(a, b);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn python_source_detection() {
        assert!(is_python_source(Path::new("a/b.py")));
        assert!(is_python_source(Path::new("a/b.pyw")));
        assert!(!is_python_source(Path::new("a/b.txt")));
        assert!(!is_python_source(Path::new("a/b")));
    }
}
