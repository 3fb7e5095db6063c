use quill_syntax::ast::{Ast, KindTag, NodeId, NodeKind, TreeVisitor};

use crate::{
    diagnostics::{Diagnostics, Ice},
    pass::Pass,
    symbols::{ScopeArena, ScopeId},
};

const NAME: &str = "link-impls";

/// Splices out-of-line `impl` bodies onto the declarations they name. The
/// impl's path resolves from the module root: the first segment with a deep
/// lookup, every further segment non-deep inside the scope the previous
/// target introduced. A matched impl donates its body block to the
/// declaration, shares its scope with it and disappears from the tree.
pub struct LinkImpls<'a> {
    scopes: &'a mut ScopeArena,
    diagnostics: Diagnostics,
}

impl<'a> LinkImpls<'a> {
    pub fn new(scopes: &'a mut ScopeArena) -> Self {
        Self {
            scopes,
            diagnostics: Diagnostics::default(),
        }
    }

    fn run(&mut self, ast: &mut Ast, root: NodeId) -> Result<(), Ice> {
        // The arena holds the scopes of every module front-ended so far;
        // only the current module's tree is this run's business, earlier
        // modules already had their verdicts.
        let module_scope = self.scopes.introduced_by(root).ok_or_else(|| {
            Ice::new(NAME, "module was not scope-built before linking", Some(root))
        })?;
        let local = self.scopes.scopes_under(module_scope);

        let mut pending = Vec::new();
        for &scope in &local {
            for symbol in self.scopes.scope(scope).symbols() {
                if ast.tag(symbol.decl) == KindTag::Impl
                    && self.scopes.linked_decl(symbol.decl).is_none()
                {
                    pending.push((scope, symbol.decl));
                }
            }
        }
        for (scope, impl_node) in pending {
            self.link_one(ast, scope, impl_node)?;
        }
        self.report_missing_bodies(ast, &local);
        // Splicing reorders subtrees, so the kind index is stale now.
        ast.rebuild_index(root);
        Ok(())
    }

    fn link_one(&mut self, ast: &mut Ast, scope: ScopeId, impl_node: NodeId) -> Result<(), Ice> {
        let path = match ast.kind(impl_node) {
            NodeKind::Impl { path } => path.clone(),
            _ => unreachable!("collected as impl"),
        };
        if path.is_empty() {
            return Err(Ice::new(NAME, "impl with an empty target path", Some(impl_node)));
        }
        let dotted = path.join(".");

        let mut cursor = self.scopes.root_of(scope);
        let mut target = (scope, String::new(), impl_node);
        for (i, segment) in path.iter().enumerate() {
            let deep = i == 0;
            let Some((found_in, symbol)) = self.scopes.lookup(cursor, segment, deep) else {
                self.diagnostics.error(
                    format!("no declaration named `{segment}` for impl of `{dotted}`"),
                    Some(impl_node),
                );
                return Ok(());
            };
            target = (found_in, segment.clone(), symbol.decl);
            if i + 1 < path.len() {
                match self.scopes.introduced_by(symbol.decl) {
                    Some(inner) => cursor = inner,
                    None => {
                        self.diagnostics.error(
                            format!("`{segment}` does not contain members, cannot resolve `{dotted}`"),
                            Some(impl_node),
                        );
                        return Ok(());
                    }
                }
            }
        }
        let (decl_scope, decl_name, decl) = target;

        if let NodeKind::Ability {
            name,
            is_abstract: true,
        } = ast.kind(decl)
        {
            self.diagnostics.error(
                format!("`{name}` is abstract and cannot be given a body"),
                Some(impl_node),
            );
            return Ok(());
        }

        let body = ast
            .children(impl_node)
            .iter()
            .copied()
            .find(|&child| ast.tag(child) == KindTag::Block)
            .ok_or_else(|| Ice::new(NAME, "impl node without a body block", Some(impl_node)))?;

        let already_defined = ast
            .children(decl)
            .iter()
            .any(|&child| ast.tag(child) == KindTag::Block);
        if already_defined {
            self.diagnostics.error(
                format!("`{decl_name}` already has a body"),
                Some(impl_node),
            );
            return Ok(());
        }

        ast.add_children_right(decl, vec![body]);
        if let Some(parent) = ast.parent(impl_node) {
            let remaining: Vec<_> = ast
                .children(parent)
                .iter()
                .copied()
                .filter(|&child| child != impl_node)
                .collect();
            ast.set_children(parent, remaining);
        }
        if let Some(impl_scope) = self.scopes.introduced_by(impl_node) {
            self.scopes.share_scope(decl, impl_scope);
        }
        self.scopes.record_defn(decl_scope, &decl_name, impl_node);
        self.scopes.link_defn(impl_node, decl);
        Ok(())
    }

    /// A forward declaration that neither carries a body nor attracted an
    /// impl is dead weight; abstract declarations are exempt.
    fn report_missing_bodies(&mut self, ast: &Ast, local: &[ScopeId]) {
        let mut missing = Vec::new();
        for &scope in local {
            for symbol in self.scopes.scope(scope).symbols() {
                let NodeKind::Ability {
                    name,
                    is_abstract: false,
                } = ast.kind(symbol.decl)
                else {
                    continue;
                };
                let has_body = ast
                    .children(symbol.decl)
                    .iter()
                    .any(|&child| ast.tag(child) == KindTag::Block);
                if !has_body && symbol.defns.is_empty() {
                    missing.push((name.clone(), symbol.decl));
                }
            }
        }
        for (name, decl) in missing {
            self.diagnostics.error(
                format!("`{name}` is declared but never given a body"),
                Some(decl),
            );
        }
    }
}

impl TreeVisitor for LinkImpls<'_> {
    type Error = Ice;
}

impl Pass for LinkImpls<'_> {
    fn name(&self) -> &'static str {
        NAME
    }

    fn before_pass(&mut self, ast: &mut Ast, root: NodeId) -> Result<(), Ice> {
        self.run(ast, root)
    }

    fn terminated(&self) -> bool {
        true
    }

    fn diagnostics_mut(&mut self) -> &mut Diagnostics {
        &mut self.diagnostics
    }
}
