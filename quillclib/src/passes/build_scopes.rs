use quill_syntax::ast::{visit, Ast, NodeId, NodeKind, TreeVisitor};

use crate::{
    diagnostics::{Diagnostics, Ice},
    pass::Pass,
    session::Session,
    symbols::{DuplicateName, ScopeArena, ScopeId},
};

/// Builds the scope tree. Scope-introducing nodes (module, archetype,
/// ability, enum, impl, block, test block) push a child scope that is
/// recorded as introduced by them; every node, introducer or not, records
/// the scope enclosing it. Named declarations register into the scope
/// enclosing them, so an ability's name lives outside the ability's own
/// scope while its parameters live inside it.
pub struct ScopeBuilder<'a> {
    session: &'a Session,
    scopes: &'a mut ScopeArena,
    stack: Vec<ScopeId>,
    diagnostics: Diagnostics,
    pushes: usize,
    pops: usize,
}

impl<'a> ScopeBuilder<'a> {
    pub fn new(session: &'a Session, scopes: &'a mut ScopeArena) -> Self {
        Self {
            session,
            scopes,
            stack: Vec::new(),
            diagnostics: Diagnostics::default(),
            pushes: 0,
            pops: 0,
        }
    }

    /// Push/pop balance, exposed for the traversal invariant tests.
    pub fn balance(&self) -> (usize, usize) {
        (self.pushes, self.pops)
    }

    fn current(&self) -> Option<ScopeId> {
        self.stack.last().copied()
    }

    fn push(&mut self, node: NodeId, parent: Option<ScopeId>) {
        let scope = self.scopes.new_scope(parent, node);
        self.stack.push(scope);
        self.pushes += 1;
    }

    fn pop(&mut self) {
        self.stack.pop();
        self.pops += 1;
    }

    fn declare(&mut self, ast: &Ast, node: NodeId, name: &str) {
        let Some(scope) = self.current() else {
            return;
        };
        if let Err(DuplicateName { previous }) = self.scopes.declare(scope, name, node) {
            self.diagnostics.error(
                format!(
                    "`{}` already declared in this scope: first declaration at {}, \
                     redeclaration at {}",
                    name,
                    describe_span(ast, previous),
                    describe_span(ast, node),
                ),
                Some(node),
            );
        }
    }
}

fn describe_span(ast: &Ast, node: NodeId) -> String {
    match ast.span_of(node) {
        Some(span) => format!("{}..{}", span.start, span.end),
        None => "<unknown>".to_string(),
    }
}

impl TreeVisitor for ScopeBuilder<'_> {
    type Error = Ice;

    fn enter_node(&mut self, ast: &mut Ast, node: NodeId) -> Result<(), Ice> {
        // Captured before dispatch so a scope-introducer records the scope
        // surrounding it, not the one it pushed. A module records nothing,
        // it is its own root.
        let surrounding = self.current();
        visit::dispatch_enter(self, ast, node)?;
        if let Some(scope) = surrounding {
            self.scopes.set_active(node, scope);
        }
        Ok(())
    }

    fn enter_module(&mut self, _ast: &mut Ast, node: NodeId) -> Result<(), Ice> {
        // Each module is the root of its own scope chain, imported or not.
        self.push(node, None);
        Ok(())
    }

    fn exit_module(&mut self, _ast: &mut Ast, _node: NodeId) -> Result<(), Ice> {
        self.pop();
        Ok(())
    }

    fn enter_archetype(&mut self, ast: &mut Ast, node: NodeId) -> Result<(), Ice> {
        let name = match ast.kind(node) {
            NodeKind::Archetype { name } => name.clone(),
            _ => unreachable!("dispatched as archetype"),
        };
        self.declare(ast, node, &name);
        self.push(node, self.current());
        Ok(())
    }

    fn exit_archetype(&mut self, _ast: &mut Ast, _node: NodeId) -> Result<(), Ice> {
        self.pop();
        Ok(())
    }

    fn enter_ability(&mut self, ast: &mut Ast, node: NodeId) -> Result<(), Ice> {
        let name = match ast.kind(node) {
            NodeKind::Ability { name, .. } => name.clone(),
            _ => unreachable!("dispatched as ability"),
        };
        self.declare(ast, node, &name);
        self.push(node, self.current());
        Ok(())
    }

    fn exit_ability(&mut self, _ast: &mut Ast, _node: NodeId) -> Result<(), Ice> {
        self.pop();
        Ok(())
    }

    fn enter_enum_decl(&mut self, ast: &mut Ast, node: NodeId) -> Result<(), Ice> {
        let name = match ast.kind(node) {
            NodeKind::EnumDecl { name } => name.clone(),
            _ => unreachable!("dispatched as enum"),
        };
        self.declare(ast, node, &name);
        self.push(node, self.current());
        Ok(())
    }

    fn exit_enum_decl(&mut self, _ast: &mut Ast, _node: NodeId) -> Result<(), Ice> {
        self.pop();
        Ok(())
    }

    fn enter_impl(&mut self, ast: &mut Ast, node: NodeId) -> Result<(), Ice> {
        let path = match ast.kind(node) {
            NodeKind::Impl { path } => path.join("."),
            _ => unreachable!("dispatched as impl"),
        };
        // Fresh-named so several impls of one path register side by side;
        // the link pass decides which one is the duplicate body.
        let name = self.session.fresh_name(&format!("impl:{path}"));
        self.declare(ast, node, &name);
        self.push(node, self.current());
        Ok(())
    }

    fn exit_impl(&mut self, _ast: &mut Ast, _node: NodeId) -> Result<(), Ice> {
        self.pop();
        Ok(())
    }

    fn enter_block(&mut self, _ast: &mut Ast, node: NodeId) -> Result<(), Ice> {
        self.push(node, self.current());
        Ok(())
    }

    fn exit_block(&mut self, _ast: &mut Ast, _node: NodeId) -> Result<(), Ice> {
        self.pop();
        Ok(())
    }

    fn enter_test_block(&mut self, _ast: &mut Ast, node: NodeId) -> Result<(), Ice> {
        self.push(node, self.current());
        Ok(())
    }

    fn exit_test_block(&mut self, _ast: &mut Ast, _node: NodeId) -> Result<(), Ice> {
        self.pop();
        Ok(())
    }

    fn enter_field(&mut self, ast: &mut Ast, node: NodeId) -> Result<(), Ice> {
        let name = match ast.kind(node) {
            NodeKind::Field { name } => name.clone(),
            _ => unreachable!("dispatched as field"),
        };
        self.declare(ast, node, &name);
        Ok(())
    }

    fn enter_param(&mut self, ast: &mut Ast, node: NodeId) -> Result<(), Ice> {
        let name = match ast.kind(node) {
            NodeKind::Param { name } => name.clone(),
            _ => unreachable!("dispatched as param"),
        };
        self.declare(ast, node, &name);
        Ok(())
    }

    fn enter_let(&mut self, ast: &mut Ast, node: NodeId) -> Result<(), Ice> {
        let name = match ast.kind(node) {
            NodeKind::Let { name } => name.clone(),
            _ => unreachable!("dispatched as let"),
        };
        self.declare(ast, node, &name);
        Ok(())
    }

    fn enter_enum_variant(&mut self, ast: &mut Ast, node: NodeId) -> Result<(), Ice> {
        let name = match ast.kind(node) {
            NodeKind::EnumVariant { name } => name.clone(),
            _ => unreachable!("dispatched as enum variant"),
        };
        self.declare(ast, node, &name);
        Ok(())
    }

    fn enter_name_ref(&mut self, ast: &mut Ast, node: NodeId) -> Result<(), Ice> {
        let name = match ast.kind(node) {
            NodeKind::NameRef { name } => name.clone(),
            _ => unreachable!("dispatched as name"),
        };
        let Some(scope) = self.current() else {
            return Ok(());
        };
        // Names that stay unresolved here may still refer to another
        // module; imports have not been pulled in yet, so stay silent.
        if let Some((found_in, _)) = self.scopes.lookup(scope, &name, true) {
            self.scopes.record_use(found_in, &name, node);
        }
        Ok(())
    }

    fn exit_member(&mut self, ast: &mut Ast, node: NodeId) -> Result<(), Ice> {
        // Scope-qualified member access: resolve the member with a
        // non-deep lookup inside the scope the receiver introduced.
        let member = match ast.kind(node) {
            NodeKind::Member { name } => name.clone(),
            _ => unreachable!("dispatched as member"),
        };
        let Some(scope) = self.current() else {
            return Ok(());
        };
        let Some(&receiver) = ast.children(node).first() else {
            return Ok(());
        };
        let NodeKind::NameRef { name: receiver_name } = ast.kind(receiver) else {
            return Ok(());
        };
        let receiver_name = receiver_name.clone();
        let Some((_, symbol)) = self.scopes.lookup(scope, &receiver_name, true) else {
            return Ok(());
        };
        let Some(receiver_scope) = self.scopes.introduced_by(symbol.decl) else {
            return Ok(());
        };
        if self.scopes.lookup(receiver_scope, &member, false).is_some() {
            self.scopes.record_use(receiver_scope, &member, node);
        }
        Ok(())
    }
}

impl Pass for ScopeBuilder<'_> {
    fn name(&self) -> &'static str {
        "build-scopes"
    }

    fn diagnostics_mut(&mut self) -> &mut Diagnostics {
        &mut self.diagnostics
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use quill_syntax::ast::{Ast, BinOp, Span, TreeBuilder};

    use super::*;
    use crate::pass::run_pass;

    fn sp(n: usize) -> Span {
        Span::new(n, n + 1)
    }

    /// `module m { ability add(a, b) { return a + b } }`
    fn sample_module(ast: &mut Ast) -> NodeId {
        let mut b = TreeBuilder::new(ast);
        let lhs = b.name("a", sp(4));
        let rhs = b.name("b", sp(6));
        let sum = b.binary(BinOp::Add, lhs, rhs);
        let ret = b.ret(Some(sum));
        let body = b.block(vec![ret]);
        let ability = b.ability("add", false, vec![("a", sp(1)), ("b", sp(2))], Some(body));
        b.module("m", Path::new("/src/m.ql.ast"), vec![ability])
    }

    #[test]
    fn every_scope_push_has_a_matching_pop() {
        let mut ast = Ast::new();
        let module = sample_module(&mut ast);
        let session = Session::new();
        let mut scopes = ScopeArena::new();
        let mut pass = ScopeBuilder::new(&session, &mut scopes);
        run_pass(&mut pass, &mut ast, module).unwrap();
        let (pushes, pops) = pass.balance();
        assert_eq!(pushes, pops);
        // module, ability, block
        assert_eq!(pushes, 3);
    }

    #[test]
    fn resolved_names_come_from_the_scope_chain() {
        let mut ast = Ast::new();
        let module = sample_module(&mut ast);
        let session = Session::new();
        let mut scopes = ScopeArena::new();
        let mut pass = ScopeBuilder::new(&session, &mut scopes);
        run_pass(&mut pass, &mut ast, module).unwrap();
        assert!(pass.take_diagnostics().is_empty());

        // `a` is declared in the ability scope and used once in the body.
        let ability_scope = scopes
            .iter()
            .find(|(_, s)| s.get("a").is_some())
            .map(|(id, _)| id)
            .unwrap();
        let symbol = scopes.scope(ability_scope).get("a").unwrap();
        assert_eq!(symbol.uses.len(), 1);

        // The use site's active scope chain passes through the declaring
        // scope.
        let use_site = symbol.uses[0];
        let mut cursor = scopes.active_at(use_site);
        let mut chain = Vec::new();
        while let Some(scope) = cursor {
            chain.push(scope);
            cursor = scopes.scope(scope).parent();
        }
        assert!(chain.contains(&ability_scope));
    }

    #[test]
    fn duplicate_names_in_one_scope_yield_one_diagnostic_naming_both() {
        let mut ast = Ast::new();
        let mut b = TreeBuilder::new(&mut ast);
        let one = b.int(1, sp(3));
        let first = b.let_stmt("x", one);
        let two = b.int(2, sp(7));
        let second = b.let_stmt("x", two);
        let block = b.block(vec![first, second]);
        let module = b.module("m", Path::new("/src/m.ql.ast"), vec![block]);

        let session = Session::new();
        let mut scopes = ScopeArena::new();
        let mut pass = ScopeBuilder::new(&session, &mut scopes);
        run_pass(&mut pass, &mut ast, module).unwrap();
        let diagnostics = pass.take_diagnostics();
        assert_eq!(diagnostics.len(), 1);
        let message = &diagnostics.iter().next().unwrap().message;
        assert!(message.contains("3..4"), "missing first site: {message}");
        assert!(message.contains("7..8"), "missing second site: {message}");
    }

    #[test]
    fn independent_duplicates_in_distinct_scopes_each_get_a_diagnostic() {
        let mut ast = Ast::new();
        let mut b = TreeBuilder::new(&mut ast);
        let mut blocks = Vec::new();
        for i in 0..3 {
            let one = b.int(1, sp(10 * i));
            let first = b.let_stmt("x", one);
            let two = b.int(2, sp(10 * i + 5));
            let second = b.let_stmt("x", two);
            blocks.push(b.block(vec![first, second]));
        }
        let module = b.module("m", Path::new("/src/m.ql.ast"), blocks);

        let session = Session::new();
        let mut scopes = ScopeArena::new();
        let mut pass = ScopeBuilder::new(&session, &mut scopes);
        run_pass(&mut pass, &mut ast, module).unwrap();
        assert_eq!(pass.take_diagnostics().len(), 3);
    }

    #[test]
    fn shadowing_in_a_nested_scope_is_not_a_duplicate() {
        let mut ast = Ast::new();
        let mut b = TreeBuilder::new(&mut ast);
        let one = b.int(1, sp(0));
        let outer = b.let_stmt("x", one);
        let two = b.int(2, sp(5));
        let inner_let = b.let_stmt("x", two);
        let inner = b.block(vec![inner_let]);
        let block = b.block(vec![outer, inner]);
        let module = b.module("m", Path::new("/src/m.ql.ast"), vec![block]);

        let session = Session::new();
        let mut scopes = ScopeArena::new();
        let mut pass = ScopeBuilder::new(&session, &mut scopes);
        run_pass(&mut pass, &mut ast, module).unwrap();
        assert!(pass.take_diagnostics().is_empty());
    }

    #[test]
    fn scope_introducers_record_the_scope_enclosing_them() {
        let mut ast = Ast::new();
        let module = sample_module(&mut ast);
        let session = Session::new();
        let mut scopes = ScopeArena::new();
        let mut pass = ScopeBuilder::new(&session, &mut scopes);
        run_pass(&mut pass, &mut ast, module).unwrap();

        let module_scope = scopes.introduced_by(module).unwrap();
        let ability = ast.children(module)[0];
        // The ability sits in the module scope, its own scope hangs under
        // it; the module itself has no enclosing scope.
        assert_eq!(scopes.active_at(ability), Some(module_scope));
        let ability_scope = scopes.introduced_by(ability).unwrap();
        assert_eq!(scopes.scope(ability_scope).parent(), Some(module_scope));
        assert_eq!(scopes.active_at(module), None);
    }

    #[test]
    fn several_impls_of_one_path_register_without_colliding() {
        let mut ast = Ast::new();
        let mut b = TreeBuilder::new(&mut ast);
        let first_body = b.block(vec![]);
        let first = b.impl_def(&["walk"], first_body);
        let second_body = b.block(vec![]);
        let second = b.impl_def(&["walk"], second_body);
        let decl = b.ability("walk", false, vec![], None);
        let module = b.module("m", Path::new("/src/m.ql.ast"), vec![decl, first, second]);

        let session = Session::new();
        let mut scopes = ScopeArena::new();
        let mut pass = ScopeBuilder::new(&session, &mut scopes);
        run_pass(&mut pass, &mut ast, module).unwrap();
        // No duplicate-name report here; the link pass owns the verdict on
        // which body is the extra one.
        assert!(pass.take_diagnostics().is_empty());
        let module_scope = scopes.introduced_by(module).unwrap();
        let impls = scopes
            .scope(module_scope)
            .symbols()
            .filter(|s| s.name.starts_with("impl:walk"))
            .count();
        assert_eq!(impls, 2);
    }

    #[test]
    fn member_access_resolves_non_deep_in_the_receivers_scope() {
        let mut ast = Ast::new();
        let mut b = TreeBuilder::new(&mut ast);
        let enum_decl = b.enum_decl("Color", vec![("Red", sp(1)), ("Green", sp(2))]);
        let receiver = b.name("Color", sp(5));
        let member = b.member(receiver, "Red");
        let stmt = b.expr_stmt(member);
        let block = b.block(vec![stmt]);
        let module = b.module("m", Path::new("/src/m.ql.ast"), vec![enum_decl, block]);

        let session = Session::new();
        let mut scopes = ScopeArena::new();
        let mut pass = ScopeBuilder::new(&session, &mut scopes);
        run_pass(&mut pass, &mut ast, module).unwrap();

        let enum_scope = scopes
            .iter()
            .find(|(_, s)| s.get("Red").is_some())
            .map(|(id, _)| id)
            .unwrap();
        assert_eq!(scopes.scope(enum_scope).get("Red").unwrap().uses.len(), 1);
    }
}
