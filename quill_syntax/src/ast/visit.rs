use super::{Ast, KindTag, NodeId};

/// Depth-first traversal hooks. `enter_*` fires before a node's children
/// are visited, `exit_*` after all of them were. Dispatch is an exhaustive
/// match over [`KindTag`], so adding a node kind forces every call site to
/// be revisited instead of silently doing nothing.
///
/// Hooks receive the arena mutably; [`walk`] snapshots child lists so a
/// hook may rewrite the subtree it is standing on.
pub trait TreeVisitor: Sized {
    type Error;

    fn enter_node(&mut self, ast: &mut Ast, node: NodeId) -> Result<(), Self::Error> {
        dispatch_enter(self, ast, node)
    }

    fn exit_node(&mut self, ast: &mut Ast, node: NodeId) -> Result<(), Self::Error> {
        dispatch_exit(self, ast, node)
    }

    fn enter_module(&mut self, _ast: &mut Ast, _node: NodeId) -> Result<(), Self::Error> {
        Ok(())
    }
    fn exit_module(&mut self, _ast: &mut Ast, _node: NodeId) -> Result<(), Self::Error> {
        Ok(())
    }

    fn enter_import(&mut self, _ast: &mut Ast, _node: NodeId) -> Result<(), Self::Error> {
        Ok(())
    }
    fn exit_import(&mut self, _ast: &mut Ast, _node: NodeId) -> Result<(), Self::Error> {
        Ok(())
    }

    fn enter_archetype(&mut self, _ast: &mut Ast, _node: NodeId) -> Result<(), Self::Error> {
        Ok(())
    }
    fn exit_archetype(&mut self, _ast: &mut Ast, _node: NodeId) -> Result<(), Self::Error> {
        Ok(())
    }

    fn enter_ability(&mut self, _ast: &mut Ast, _node: NodeId) -> Result<(), Self::Error> {
        Ok(())
    }
    fn exit_ability(&mut self, _ast: &mut Ast, _node: NodeId) -> Result<(), Self::Error> {
        Ok(())
    }

    fn enter_enum_decl(&mut self, _ast: &mut Ast, _node: NodeId) -> Result<(), Self::Error> {
        Ok(())
    }
    fn exit_enum_decl(&mut self, _ast: &mut Ast, _node: NodeId) -> Result<(), Self::Error> {
        Ok(())
    }

    fn enter_enum_variant(&mut self, _ast: &mut Ast, _node: NodeId) -> Result<(), Self::Error> {
        Ok(())
    }
    fn exit_enum_variant(&mut self, _ast: &mut Ast, _node: NodeId) -> Result<(), Self::Error> {
        Ok(())
    }

    fn enter_impl(&mut self, _ast: &mut Ast, _node: NodeId) -> Result<(), Self::Error> {
        Ok(())
    }
    fn exit_impl(&mut self, _ast: &mut Ast, _node: NodeId) -> Result<(), Self::Error> {
        Ok(())
    }

    fn enter_field(&mut self, _ast: &mut Ast, _node: NodeId) -> Result<(), Self::Error> {
        Ok(())
    }
    fn exit_field(&mut self, _ast: &mut Ast, _node: NodeId) -> Result<(), Self::Error> {
        Ok(())
    }

    fn enter_param_list(&mut self, _ast: &mut Ast, _node: NodeId) -> Result<(), Self::Error> {
        Ok(())
    }
    fn exit_param_list(&mut self, _ast: &mut Ast, _node: NodeId) -> Result<(), Self::Error> {
        Ok(())
    }

    fn enter_param(&mut self, _ast: &mut Ast, _node: NodeId) -> Result<(), Self::Error> {
        Ok(())
    }
    fn exit_param(&mut self, _ast: &mut Ast, _node: NodeId) -> Result<(), Self::Error> {
        Ok(())
    }

    fn enter_block(&mut self, _ast: &mut Ast, _node: NodeId) -> Result<(), Self::Error> {
        Ok(())
    }
    fn exit_block(&mut self, _ast: &mut Ast, _node: NodeId) -> Result<(), Self::Error> {
        Ok(())
    }

    fn enter_test_block(&mut self, _ast: &mut Ast, _node: NodeId) -> Result<(), Self::Error> {
        Ok(())
    }
    fn exit_test_block(&mut self, _ast: &mut Ast, _node: NodeId) -> Result<(), Self::Error> {
        Ok(())
    }

    fn enter_let(&mut self, _ast: &mut Ast, _node: NodeId) -> Result<(), Self::Error> {
        Ok(())
    }
    fn exit_let(&mut self, _ast: &mut Ast, _node: NodeId) -> Result<(), Self::Error> {
        Ok(())
    }

    fn enter_assign(&mut self, _ast: &mut Ast, _node: NodeId) -> Result<(), Self::Error> {
        Ok(())
    }
    fn exit_assign(&mut self, _ast: &mut Ast, _node: NodeId) -> Result<(), Self::Error> {
        Ok(())
    }

    fn enter_return(&mut self, _ast: &mut Ast, _node: NodeId) -> Result<(), Self::Error> {
        Ok(())
    }
    fn exit_return(&mut self, _ast: &mut Ast, _node: NodeId) -> Result<(), Self::Error> {
        Ok(())
    }

    fn enter_expr_stmt(&mut self, _ast: &mut Ast, _node: NodeId) -> Result<(), Self::Error> {
        Ok(())
    }
    fn exit_expr_stmt(&mut self, _ast: &mut Ast, _node: NodeId) -> Result<(), Self::Error> {
        Ok(())
    }

    fn enter_if(&mut self, _ast: &mut Ast, _node: NodeId) -> Result<(), Self::Error> {
        Ok(())
    }
    fn exit_if(&mut self, _ast: &mut Ast, _node: NodeId) -> Result<(), Self::Error> {
        Ok(())
    }

    fn enter_while(&mut self, _ast: &mut Ast, _node: NodeId) -> Result<(), Self::Error> {
        Ok(())
    }
    fn exit_while(&mut self, _ast: &mut Ast, _node: NodeId) -> Result<(), Self::Error> {
        Ok(())
    }

    fn enter_binary(&mut self, _ast: &mut Ast, _node: NodeId) -> Result<(), Self::Error> {
        Ok(())
    }
    fn exit_binary(&mut self, _ast: &mut Ast, _node: NodeId) -> Result<(), Self::Error> {
        Ok(())
    }

    fn enter_unary(&mut self, _ast: &mut Ast, _node: NodeId) -> Result<(), Self::Error> {
        Ok(())
    }
    fn exit_unary(&mut self, _ast: &mut Ast, _node: NodeId) -> Result<(), Self::Error> {
        Ok(())
    }

    fn enter_call(&mut self, _ast: &mut Ast, _node: NodeId) -> Result<(), Self::Error> {
        Ok(())
    }
    fn exit_call(&mut self, _ast: &mut Ast, _node: NodeId) -> Result<(), Self::Error> {
        Ok(())
    }

    fn enter_member(&mut self, _ast: &mut Ast, _node: NodeId) -> Result<(), Self::Error> {
        Ok(())
    }
    fn exit_member(&mut self, _ast: &mut Ast, _node: NodeId) -> Result<(), Self::Error> {
        Ok(())
    }

    fn enter_name_ref(&mut self, _ast: &mut Ast, _node: NodeId) -> Result<(), Self::Error> {
        Ok(())
    }
    fn exit_name_ref(&mut self, _ast: &mut Ast, _node: NodeId) -> Result<(), Self::Error> {
        Ok(())
    }

    fn enter_literal(&mut self, _ast: &mut Ast, _node: NodeId) -> Result<(), Self::Error> {
        Ok(())
    }
    fn exit_literal(&mut self, _ast: &mut Ast, _node: NodeId) -> Result<(), Self::Error> {
        Ok(())
    }

    fn enter_token(&mut self, _ast: &mut Ast, _node: NodeId) -> Result<(), Self::Error> {
        Ok(())
    }
    fn exit_token(&mut self, _ast: &mut Ast, _node: NodeId) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Depth-first walk from `node`: pre-order enter, children left to right,
/// post-order exit. The child list is snapshotted before descending so
/// hooks may restructure the tree under their feet.
pub fn walk<V: TreeVisitor>(v: &mut V, ast: &mut Ast, node: NodeId) -> Result<(), V::Error> {
    v.enter_node(ast, node)?;
    let children = ast.children(node).to_vec();
    for child in children {
        walk(v, ast, child)?;
    }
    v.exit_node(ast, node)
}

pub fn dispatch_enter<V: TreeVisitor>(
    v: &mut V,
    ast: &mut Ast,
    node: NodeId,
) -> Result<(), V::Error> {
    match ast.tag(node) {
        KindTag::Module => v.enter_module(ast, node),
        KindTag::Import => v.enter_import(ast, node),
        KindTag::Archetype => v.enter_archetype(ast, node),
        KindTag::Ability => v.enter_ability(ast, node),
        KindTag::EnumDecl => v.enter_enum_decl(ast, node),
        KindTag::EnumVariant => v.enter_enum_variant(ast, node),
        KindTag::Impl => v.enter_impl(ast, node),
        KindTag::Field => v.enter_field(ast, node),
        KindTag::ParamList => v.enter_param_list(ast, node),
        KindTag::Param => v.enter_param(ast, node),
        KindTag::Block => v.enter_block(ast, node),
        KindTag::TestBlock => v.enter_test_block(ast, node),
        KindTag::Let => v.enter_let(ast, node),
        KindTag::Assign => v.enter_assign(ast, node),
        KindTag::Return => v.enter_return(ast, node),
        KindTag::ExprStmt => v.enter_expr_stmt(ast, node),
        KindTag::If => v.enter_if(ast, node),
        KindTag::While => v.enter_while(ast, node),
        KindTag::Binary => v.enter_binary(ast, node),
        KindTag::Unary => v.enter_unary(ast, node),
        KindTag::Call => v.enter_call(ast, node),
        KindTag::Member => v.enter_member(ast, node),
        KindTag::NameRef => v.enter_name_ref(ast, node),
        KindTag::Literal => v.enter_literal(ast, node),
        KindTag::Token => v.enter_token(ast, node),
    }
}

pub fn dispatch_exit<V: TreeVisitor>(
    v: &mut V,
    ast: &mut Ast,
    node: NodeId,
) -> Result<(), V::Error> {
    match ast.tag(node) {
        KindTag::Module => v.exit_module(ast, node),
        KindTag::Import => v.exit_import(ast, node),
        KindTag::Archetype => v.exit_archetype(ast, node),
        KindTag::Ability => v.exit_ability(ast, node),
        KindTag::EnumDecl => v.exit_enum_decl(ast, node),
        KindTag::EnumVariant => v.exit_enum_variant(ast, node),
        KindTag::Impl => v.exit_impl(ast, node),
        KindTag::Field => v.exit_field(ast, node),
        KindTag::ParamList => v.exit_param_list(ast, node),
        KindTag::Param => v.exit_param(ast, node),
        KindTag::Block => v.exit_block(ast, node),
        KindTag::TestBlock => v.exit_test_block(ast, node),
        KindTag::Let => v.exit_let(ast, node),
        KindTag::Assign => v.exit_assign(ast, node),
        KindTag::Return => v.exit_return(ast, node),
        KindTag::ExprStmt => v.exit_expr_stmt(ast, node),
        KindTag::If => v.exit_if(ast, node),
        KindTag::While => v.exit_while(ast, node),
        KindTag::Binary => v.exit_binary(ast, node),
        KindTag::Unary => v.exit_unary(ast, node),
        KindTag::Call => v.exit_call(ast, node),
        KindTag::Member => v.exit_member(ast, node),
        KindTag::NameRef => v.exit_name_ref(ast, node),
        KindTag::Literal => v.exit_literal(ast, node),
        KindTag::Token => v.exit_token(ast, node),
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use super::*;
    use crate::ast::{BinOp, Literal, NodeKind, Span};

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
        enters: usize,
        exits: usize,
    }

    impl TreeVisitor for Recorder {
        type Error = Infallible;

        fn enter_node(&mut self, ast: &mut Ast, node: NodeId) -> Result<(), Infallible> {
            self.enters += 1;
            self.events.push(format!("enter {:?}", ast.tag(node)));
            dispatch_enter(self, ast, node)
        }

        fn exit_node(&mut self, ast: &mut Ast, node: NodeId) -> Result<(), Infallible> {
            self.exits += 1;
            self.events.push(format!("exit {:?}", ast.tag(node)));
            dispatch_exit(self, ast, node)
        }
    }

    fn sample(ast: &mut Ast) -> NodeId {
        let lhs = ast.alloc_leaf(
            NodeKind::Literal {
                value: Literal::Int(1),
            },
            Span::new(0, 1),
        );
        let rhs = ast.alloc_leaf(
            NodeKind::Literal {
                value: Literal::Int(2),
            },
            Span::new(2, 3),
        );
        let sum = ast.alloc_with_children(NodeKind::Binary { op: BinOp::Add }, vec![lhs, rhs]);
        let stmt = ast.alloc_with_children(NodeKind::ExprStmt, vec![sum]);
        ast.alloc_with_children(NodeKind::Block, vec![stmt])
    }

    #[test]
    fn every_enter_has_a_matching_exit() {
        let mut ast = Ast::new();
        let root = sample(&mut ast);
        let mut rec = Recorder::default();
        walk(&mut rec, &mut ast, root).unwrap();
        assert_eq!(rec.enters, rec.exits);
        assert_eq!(rec.enters, 5);
    }

    #[test]
    fn enter_is_preorder_and_exit_is_postorder() {
        let mut ast = Ast::new();
        let root = sample(&mut ast);
        let mut rec = Recorder::default();
        walk(&mut rec, &mut ast, root).unwrap();
        similar_asserts::assert_eq!(
            rec.events.join(", "),
            "enter Block, enter ExprStmt, enter Binary, enter Literal, exit Literal, \
             enter Literal, exit Literal, exit Binary, exit ExprStmt, exit Block"
        );
    }
}
