use std::{collections::HashMap, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod build;
pub mod visit;

pub use build::TreeBuilder;
pub use visit::TreeVisitor;

/// Handle into the [`Ast`] arena. Nodes are never moved or freed, so a
/// handle stays valid for the whole compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub usize);

/// Half-open range of token positions. Leaves carry an authoritative span,
/// inner nodes report the hull of their children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn hull(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Neq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    Pipe,
    Range,
}

impl BinOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Eq => "==",
            BinOp::Neq => "!=",
            BinOp::Lt => "<",
            BinOp::LtEq => "<=",
            BinOp::Gt => ">",
            BinOp::GtEq => ">=",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Pipe => "|>",
            BinOp::Range => "..",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Not,
}

impl UnaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "not",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Unit,
}

/// Every node kind of the source tree. Payloads carry the typed data of a
/// node, structure lives in the arena's child lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    Module {
        name: String,
        path: PathBuf,
        imported: bool,
    },
    Import {
        target: String,
        resolved: bool,
        module: Option<NodeId>,
    },
    Archetype {
        name: String,
    },
    Ability {
        name: String,
        is_abstract: bool,
    },
    EnumDecl {
        name: String,
    },
    EnumVariant {
        name: String,
    },
    Impl {
        path: Vec<String>,
    },
    Field {
        name: String,
    },
    ParamList,
    Param {
        name: String,
    },
    Block,
    TestBlock {
        name: String,
    },
    Let {
        name: String,
    },
    Assign,
    Return,
    ExprStmt,
    If,
    While,
    Binary {
        op: BinOp,
    },
    Unary {
        op: UnaryOp,
    },
    Call,
    Member {
        name: String,
    },
    NameRef {
        name: String,
    },
    Literal {
        value: Literal,
    },
    Token {
        text: String,
    },
}

/// Payload-free mirror of [`NodeKind`], used to key the kind index and the
/// visitor dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KindTag {
    Module,
    Import,
    Archetype,
    Ability,
    EnumDecl,
    EnumVariant,
    Impl,
    Field,
    ParamList,
    Param,
    Block,
    TestBlock,
    Let,
    Assign,
    Return,
    ExprStmt,
    If,
    While,
    Binary,
    Unary,
    Call,
    Member,
    NameRef,
    Literal,
    Token,
}

impl NodeKind {
    pub fn tag(&self) -> KindTag {
        match self {
            NodeKind::Module { .. } => KindTag::Module,
            NodeKind::Import { .. } => KindTag::Import,
            NodeKind::Archetype { .. } => KindTag::Archetype,
            NodeKind::Ability { .. } => KindTag::Ability,
            NodeKind::EnumDecl { .. } => KindTag::EnumDecl,
            NodeKind::EnumVariant { .. } => KindTag::EnumVariant,
            NodeKind::Impl { .. } => KindTag::Impl,
            NodeKind::Field { .. } => KindTag::Field,
            NodeKind::ParamList => KindTag::ParamList,
            NodeKind::Param { .. } => KindTag::Param,
            NodeKind::Block => KindTag::Block,
            NodeKind::TestBlock { .. } => KindTag::TestBlock,
            NodeKind::Let { .. } => KindTag::Let,
            NodeKind::Assign => KindTag::Assign,
            NodeKind::Return => KindTag::Return,
            NodeKind::ExprStmt => KindTag::ExprStmt,
            NodeKind::If => KindTag::If,
            NodeKind::While => KindTag::While,
            NodeKind::Binary { .. } => KindTag::Binary,
            NodeKind::Unary { .. } => KindTag::Unary,
            NodeKind::Call => KindTag::Call,
            NodeKind::Member { .. } => KindTag::Member,
            NodeKind::NameRef { .. } => KindTag::NameRef,
            NodeKind::Literal { .. } => KindTag::Literal,
            NodeKind::Token { .. } => KindTag::Token,
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AstError {
    #[error("cannot replace the root of a tree, node {0:?} has no parent")]
    ReplaceRoot(NodeId),
    #[error("node {0:?} is not listed among the children of its parent")]
    CorruptParentLink(NodeId),
}

#[derive(Debug)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    /// Authoritative only for leaves. Inner nodes derive their span from
    /// their children.
    span: Option<Span>,
}

/// Arena holding every node of a compilation, entry module and imported
/// modules alike. Structure only ever changes through [`Ast::replace`],
/// [`Ast::set_children`] and [`Ast::add_children_left`]/[`Ast::add_children_right`];
/// parent links are re-derived on every such edit.
#[derive(Debug, Default)]
pub struct Ast {
    nodes: Vec<Node>,
    index: HashMap<KindTag, Vec<NodeId>>,
    index_built: bool,
}

impl Ast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind,
            parent: None,
            children: Vec::new(),
            span: None,
        });
        id
    }

    pub fn alloc_leaf(&mut self, kind: NodeKind, span: Span) -> NodeId {
        let id = self.alloc(kind);
        self.nodes[id.0].span = Some(span);
        id
    }

    pub fn alloc_with_children(&mut self, kind: NodeKind, children: Vec<NodeId>) -> NodeId {
        let id = self.alloc(kind);
        self.set_children(id, children);
        id
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0].kind
    }

    pub fn kind_mut(&mut self, id: NodeId) -> &mut NodeKind {
        &mut self.nodes[id.0].kind
    }

    pub fn tag(&self, id: NodeId) -> KindTag {
        self.nodes[id.0].kind.tag()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn is_leaf(&self, id: NodeId) -> bool {
        self.nodes[id.0].children.is_empty()
    }

    /// A leaf reports its stored span, an inner node the hull of its
    /// children. A childless inner node without a stored span has none.
    pub fn span_of(&self, id: NodeId) -> Option<Span> {
        let node = &self.nodes[id.0];
        if node.children.is_empty() {
            return node.span;
        }
        node.children
            .iter()
            .filter_map(|&c| self.span_of(c))
            .reduce(Span::hull)
    }

    /// Reassign the full child list of `id`, detaching every new child from
    /// its previous parent and orphaning the old children.
    pub fn set_children(&mut self, id: NodeId, children: Vec<NodeId>) {
        let old = std::mem::take(&mut self.nodes[id.0].children);
        for child in old {
            self.nodes[child.0].parent = None;
        }
        for &child in &children {
            self.detach(child);
            self.nodes[child.0].parent = Some(id);
        }
        self.nodes[id.0].children = children;
    }

    pub fn add_children_left(&mut self, id: NodeId, children: Vec<NodeId>) {
        for (i, &child) in children.iter().enumerate() {
            self.detach(child);
            self.nodes[child.0].parent = Some(id);
            self.nodes[id.0].children.insert(i, child);
        }
    }

    pub fn add_children_right(&mut self, id: NodeId, children: Vec<NodeId>) {
        for &child in &children {
            self.detach(child);
            self.nodes[child.0].parent = Some(id);
        }
        self.nodes[id.0].children.extend(children);
    }

    /// Substitute `new` for `old` in the parent's child list, keeping the
    /// position. The detached node keeps its subtree but loses its parent.
    /// The only way a node leaves a tree.
    pub fn replace(&mut self, old: NodeId, new: NodeId) -> Result<NodeId, AstError> {
        let parent = self.nodes[old.0].parent.ok_or(AstError::ReplaceRoot(old))?;
        let position = self.nodes[parent.0]
            .children
            .iter()
            .position(|&c| c == old)
            .ok_or(AstError::CorruptParentLink(old))?;
        self.detach(new);
        self.nodes[parent.0].children[position] = new;
        self.nodes[new.0].parent = Some(parent);
        self.nodes[old.0].parent = None;
        Ok(new)
    }

    fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|&c| c != id);
        }
    }

    /// Rebuild the kind→nodes cache for everything reachable from `root`.
    /// Must be called again after any pass that changes tree structure.
    pub fn rebuild_index(&mut self, root: NodeId) {
        self.index.clear();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            self.index.entry(self.tag(id)).or_default().push(id);
            stack.extend(self.nodes[id.0].children.iter().rev());
        }
        self.index_built = true;
    }

    /// All reachable nodes of the given kind, in depth-first order as of
    /// the last [`Ast::rebuild_index`].
    pub fn nodes_of(&self, tag: KindTag) -> &[NodeId] {
        debug_assert!(self.index_built, "kind index queried before first rebuild");
        self.index.get(&tag).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Compact s-expression dump used in tests and `--print-ast`.
    pub fn pretty(&self, id: NodeId) -> String {
        let kids = |sep: &str| {
            self.children(id)
                .iter()
                .map(|&c| self.pretty(c))
                .collect::<Vec<_>>()
                .join(sep)
        };
        let with_children = |head: String| {
            if self.children(id).is_empty() {
                format!("({head})")
            } else {
                format!("({} {})", head, kids(" "))
            }
        };
        match self.kind(id) {
            NodeKind::Module { name, .. } => with_children(format!("module {name}")),
            NodeKind::Import {
                target, resolved, ..
            } => {
                let state = if *resolved { "" } else { "?" };
                with_children(format!("import{state} {target}"))
            }
            NodeKind::Archetype { name } => with_children(format!("archetype {name}")),
            NodeKind::Ability { name, is_abstract } => {
                let head = if *is_abstract {
                    format!("ability abstract {name}")
                } else {
                    format!("ability {name}")
                };
                with_children(head)
            }
            NodeKind::EnumDecl { name } => with_children(format!("enum {name}")),
            NodeKind::EnumVariant { name } => format!("{name}"),
            NodeKind::Impl { path } => with_children(format!("impl {}", path.join("."))),
            NodeKind::Field { name } => with_children(format!("field {name}")),
            NodeKind::ParamList => with_children("params".to_string()),
            NodeKind::Param { name } => format!("{name}"),
            NodeKind::Block => with_children("block".to_string()),
            NodeKind::TestBlock { name } => with_children(format!("test {name}")),
            NodeKind::Let { name } => with_children(format!("let {name}")),
            NodeKind::Assign => with_children("assign".to_string()),
            NodeKind::Return => with_children("return".to_string()),
            NodeKind::ExprStmt => kids(" "),
            NodeKind::If => with_children("if".to_string()),
            NodeKind::While => with_children("while".to_string()),
            NodeKind::Binary { op } => with_children(op.symbol().to_string()),
            NodeKind::Unary { op } => with_children(op.symbol().to_string()),
            NodeKind::Call => with_children("call".to_string()),
            NodeKind::Member { name } => with_children(format!("member {name}")),
            NodeKind::NameRef { name } => name.clone(),
            NodeKind::Literal { value } => match value {
                Literal::Int(v) => v.to_string(),
                Literal::Float(v) => v.to_string(),
                Literal::Str(v) => format!("{v:?}"),
                Literal::Bool(v) => v.to_string(),
                Literal::Unit => "()".to_string(),
            },
            NodeKind::Token { text } => format!("{text:?}"),
        }
    }
}
