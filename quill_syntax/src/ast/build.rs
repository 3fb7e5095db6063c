use std::path::Path;

use super::{Ast, BinOp, Literal, NodeId, NodeKind, Span, UnaryOp};

/// Convenience layer for assembling trees into an arena. Used by front ends
/// that already hold structured data (the JSON parse-tree reader) and all
/// over the test suites; spares both from spelling out `NodeKind` payloads.
pub struct TreeBuilder<'a> {
    ast: &'a mut Ast,
}

impl<'a> TreeBuilder<'a> {
    pub fn new(ast: &'a mut Ast) -> Self {
        Self { ast }
    }

    pub fn ast(&mut self) -> &mut Ast {
        self.ast
    }

    pub fn module(&mut self, name: &str, path: &Path, items: Vec<NodeId>) -> NodeId {
        self.ast.alloc_with_children(
            NodeKind::Module {
                name: name.to_string(),
                path: path.to_path_buf(),
                imported: false,
            },
            items,
        )
    }

    pub fn import(&mut self, target: &str, span: Span) -> NodeId {
        self.ast.alloc_leaf(
            NodeKind::Import {
                target: target.to_string(),
                resolved: false,
                module: None,
            },
            span,
        )
    }

    pub fn archetype(&mut self, name: &str, members: Vec<NodeId>) -> NodeId {
        self.ast.alloc_with_children(
            NodeKind::Archetype {
                name: name.to_string(),
            },
            members,
        )
    }

    /// An ability with a body is a full definition, without one a forward
    /// declaration waiting for an out-of-line `impl`.
    pub fn ability(
        &mut self,
        name: &str,
        is_abstract: bool,
        params: Vec<(&str, Span)>,
        body: Option<NodeId>,
    ) -> NodeId {
        let params = params
            .into_iter()
            .map(|(param, span)| {
                self.ast.alloc_leaf(
                    NodeKind::Param {
                        name: param.to_string(),
                    },
                    span,
                )
            })
            .collect();
        let param_list = self.ast.alloc_with_children(NodeKind::ParamList, params);
        let mut children = vec![param_list];
        children.extend(body);
        self.ast.alloc_with_children(
            NodeKind::Ability {
                name: name.to_string(),
                is_abstract,
            },
            children,
        )
    }

    pub fn enum_decl(&mut self, name: &str, variants: Vec<(&str, Span)>) -> NodeId {
        let variants = variants
            .into_iter()
            .map(|(variant, span)| {
                self.ast.alloc_leaf(
                    NodeKind::EnumVariant {
                        name: variant.to_string(),
                    },
                    span,
                )
            })
            .collect();
        self.ast.alloc_with_children(
            NodeKind::EnumDecl {
                name: name.to_string(),
            },
            variants,
        )
    }

    pub fn impl_def(&mut self, path: &[&str], body: NodeId) -> NodeId {
        self.ast.alloc_with_children(
            NodeKind::Impl {
                path: path.iter().map(|s| s.to_string()).collect(),
            },
            vec![body],
        )
    }

    pub fn field(&mut self, name: &str, init: Option<NodeId>) -> NodeId {
        self.ast.alloc_with_children(
            NodeKind::Field {
                name: name.to_string(),
            },
            init.into_iter().collect(),
        )
    }

    pub fn block(&mut self, stmts: Vec<NodeId>) -> NodeId {
        self.ast.alloc_with_children(NodeKind::Block, stmts)
    }

    pub fn test_block(&mut self, name: &str, body: NodeId) -> NodeId {
        self.ast.alloc_with_children(
            NodeKind::TestBlock {
                name: name.to_string(),
            },
            vec![body],
        )
    }

    pub fn let_stmt(&mut self, name: &str, init: NodeId) -> NodeId {
        self.ast.alloc_with_children(
            NodeKind::Let {
                name: name.to_string(),
            },
            vec![init],
        )
    }

    pub fn assign(&mut self, target: NodeId, value: NodeId) -> NodeId {
        self.ast
            .alloc_with_children(NodeKind::Assign, vec![target, value])
    }

    pub fn ret(&mut self, value: Option<NodeId>) -> NodeId {
        self.ast
            .alloc_with_children(NodeKind::Return, value.into_iter().collect())
    }

    pub fn expr_stmt(&mut self, expr: NodeId) -> NodeId {
        self.ast.alloc_with_children(NodeKind::ExprStmt, vec![expr])
    }

    pub fn if_stmt(&mut self, cond: NodeId, then: NodeId, els: Option<NodeId>) -> NodeId {
        let mut children = vec![cond, then];
        children.extend(els);
        self.ast.alloc_with_children(NodeKind::If, children)
    }

    pub fn while_stmt(&mut self, cond: NodeId, body: NodeId) -> NodeId {
        self.ast
            .alloc_with_children(NodeKind::While, vec![cond, body])
    }

    pub fn binary(&mut self, op: BinOp, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.ast
            .alloc_with_children(NodeKind::Binary { op }, vec![lhs, rhs])
    }

    pub fn unary(&mut self, op: UnaryOp, operand: NodeId) -> NodeId {
        self.ast
            .alloc_with_children(NodeKind::Unary { op }, vec![operand])
    }

    pub fn call(&mut self, callee: NodeId, args: Vec<NodeId>) -> NodeId {
        let mut children = vec![callee];
        children.extend(args);
        self.ast.alloc_with_children(NodeKind::Call, children)
    }

    pub fn member(&mut self, receiver: NodeId, name: &str) -> NodeId {
        self.ast.alloc_with_children(
            NodeKind::Member {
                name: name.to_string(),
            },
            vec![receiver],
        )
    }

    pub fn name(&mut self, name: &str, span: Span) -> NodeId {
        self.ast.alloc_leaf(
            NodeKind::NameRef {
                name: name.to_string(),
            },
            span,
        )
    }

    pub fn int(&mut self, value: i64, span: Span) -> NodeId {
        self.literal(Literal::Int(value), span)
    }

    pub fn float(&mut self, value: f64, span: Span) -> NodeId {
        self.literal(Literal::Float(value), span)
    }

    pub fn string(&mut self, value: &str, span: Span) -> NodeId {
        self.literal(Literal::Str(value.to_string()), span)
    }

    pub fn bool(&mut self, value: bool, span: Span) -> NodeId {
        self.literal(Literal::Bool(value), span)
    }

    pub fn unit(&mut self, span: Span) -> NodeId {
        self.literal(Literal::Unit, span)
    }

    fn literal(&mut self, value: Literal, span: Span) -> NodeId {
        self.ast.alloc_leaf(NodeKind::Literal { value }, span)
    }
}
