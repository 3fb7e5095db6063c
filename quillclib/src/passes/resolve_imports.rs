use std::path::PathBuf;

use quill_syntax::ast::{Ast, KindTag, NodeId, NodeKind, TreeVisitor};

use crate::{
    diagnostics::{Diagnostics, Ice},
    frontend::{module_path, Frontend, ModuleLoader},
    pass::Pass,
    passes,
    session::{CacheEntry, Session},
    symbols::ScopeArena,
};

const NAME: &str = "resolve-imports";

/// Outer fixpoint scans over the kind index; every scan resolving new
/// imports can make further ones reachable. Anything past this bound is a
/// cycle the cache failed to catch.
const MAX_FIXPOINT_ITERATIONS: usize = 128;

/// Pulls imported modules into the arena. Each import target maps to a
/// file next to the importing module; a fresh file is parsed, run through
/// the per-module front end and attached as a child of its import node.
/// Cache hits only record the module handle in the import's payload, so a
/// module has exactly one position in the tree no matter how often it is
/// imported. Hitting a module that is still in progress is a cycle; it is
/// reported as a warning and the import resolves to the partial module.
pub struct ResolveImports<'a, L, F> {
    session: &'a Session,
    loader: &'a L,
    frontend: &'a F,
    scopes: &'a mut ScopeArena,
    diagnostics: Diagnostics,
}

impl<'a, L: ModuleLoader, F: Frontend> ResolveImports<'a, L, F> {
    pub fn new(
        session: &'a Session,
        loader: &'a L,
        frontend: &'a F,
        scopes: &'a mut ScopeArena,
    ) -> Self {
        Self {
            session,
            loader,
            frontend,
            scopes,
            diagnostics: Diagnostics::default(),
        }
    }

    fn run(&mut self, ast: &mut Ast, root: NodeId) -> Result<(), Ice> {
        let mut iterations = 0;
        loop {
            iterations += 1;
            if iterations > MAX_FIXPOINT_ITERATIONS {
                return Err(Ice::new(
                    NAME,
                    "import resolution did not reach a fixpoint",
                    Some(root),
                ));
            }
            ast.rebuild_index(root);
            let unresolved: Vec<NodeId> = ast
                .nodes_of(KindTag::Import)
                .iter()
                .copied()
                .filter(|&import| {
                    matches!(ast.kind(import), NodeKind::Import { resolved: false, .. })
                })
                .collect();
            if unresolved.is_empty() {
                break;
            }
            tracing::debug!(
                iteration = iterations,
                pending = unresolved.len(),
                "resolving imports"
            );
            for import in unresolved {
                self.resolve_one(ast, import)?;
            }
        }
        ast.rebuild_index(root);
        Ok(())
    }

    fn resolve_one(&mut self, ast: &mut Ast, import: NodeId) -> Result<(), Ice> {
        let target = match ast.kind(import) {
            NodeKind::Import {
                target, resolved, ..
            } => {
                // Depth-first recursion may have beaten the outer scan to it.
                if *resolved {
                    return Ok(());
                }
                target.clone()
            }
            _ => unreachable!("collected as import"),
        };
        let base_dir = self.enclosing_module_dir(ast, import)?;
        let path = self.loader.canonical(&module_path(&base_dir, &target));

        match self.session.cached_module(&path) {
            Some(CacheEntry::Ready(module)) => {
                tracing::trace!(import = target, "import served from cache");
                mark_resolved(ast, import, Some(module));
            }
            Some(CacheEntry::InProgress(module)) => {
                self.diagnostics.warning(
                    format!("circular import of `{target}`"),
                    Some(import),
                );
                mark_resolved(ast, import, Some(module));
            }
            None => self.compile_fresh(ast, import, &target, path)?,
        }
        Ok(())
    }

    fn compile_fresh(
        &mut self,
        ast: &mut Ast,
        import: NodeId,
        target: &str,
        path: PathBuf,
    ) -> Result<(), Ice> {
        let source = match self.loader.load(&path) {
            Ok(source) => source,
            Err(err) => {
                self.diagnostics.error(
                    format!("cannot resolve import `{target}`: {err}"),
                    Some(import),
                );
                // Resolved-with-no-module, so later scans stop retrying.
                mark_resolved(ast, import, None);
                return Ok(());
            }
        };
        let module = match self.frontend.parse(ast, &path, &source) {
            Ok(module) => module,
            Err(err) => {
                self.diagnostics
                    .error(format!("broken import `{target}`: {err}"), Some(import));
                mark_resolved(ast, import, None);
                return Ok(());
            }
        };
        tracing::debug!(import = target, path = %path.display(), "compiling imported module");
        if let NodeKind::Module { imported, .. } = ast.kind_mut(module) {
            *imported = true;
        }
        self.session
            .cache_module(path.clone(), CacheEntry::InProgress(module));

        let nested = passes::front_end(ast, module, self.session, self.scopes)?;
        self.diagnostics.extend(nested);

        ast.add_children_right(import, vec![module]);
        mark_resolved(ast, import, Some(module));

        // Resolve the fresh module's own imports before the cache entry
        // flips to ready; a back-reference to this module inside that
        // subtree is a genuine cycle. Manual subtree scan since the kind
        // index does not know the new nodes yet.
        for nested_import in unresolved_imports_in(ast, module) {
            self.resolve_one(ast, nested_import)?;
        }
        self.session.cache_module(path, CacheEntry::Ready(module));
        Ok(())
    }

    fn enclosing_module_dir(&self, ast: &Ast, import: NodeId) -> Result<PathBuf, Ice> {
        let mut cursor = Some(import);
        while let Some(node) = cursor {
            if let NodeKind::Module { path, .. } = ast.kind(node) {
                return Ok(path
                    .parent()
                    .map(|dir| dir.to_path_buf())
                    .unwrap_or_default());
            }
            cursor = ast.parent(node);
        }
        Err(Ice::new(
            NAME,
            "import node outside of any module",
            Some(import),
        ))
    }
}

fn mark_resolved(ast: &mut Ast, import: NodeId, module: Option<NodeId>) {
    if let NodeKind::Import {
        resolved,
        module: slot,
        ..
    } = ast.kind_mut(import)
    {
        *resolved = true;
        *slot = module;
    }
}

fn unresolved_imports_in(ast: &Ast, root: NodeId) -> Vec<NodeId> {
    let mut found = Vec::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if matches!(ast.kind(node), NodeKind::Import { resolved: false, .. }) {
            found.push(node);
        }
        stack.extend(ast.children(node).iter().rev());
    }
    found
}

impl<L: ModuleLoader, F: Frontend> TreeVisitor for ResolveImports<'_, L, F> {
    type Error = Ice;
}

impl<L: ModuleLoader, F: Frontend> Pass for ResolveImports<'_, L, F> {
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

#[cfg(test)]
mod tests {
    use std::path::Path;

    use quill_syntax::ast::Ast;

    use super::*;
    use crate::{
        frontend::{JsonFrontend, MemLoader},
        pass::run_pass,
    };

    fn module_json(name: &str, imports: &[&str]) -> String {
        let children: Vec<String> = imports
            .iter()
            .enumerate()
            .map(|(i, target)| {
                format!(
                    r#"{{ "kind": {{ "Import": {{ "target": "{target}", "resolved": false, "module": null }} }},
                         "span": {{ "start": {}, "end": {} }} }}"#,
                    i * 2,
                    i * 2 + 1,
                )
            })
            .collect();
        format!(
            r#"{{ "kind": {{ "Module": {{ "name": "{name}", "path": "", "imported": false }} }},
                 "children": [{}] }}"#,
            children.join(",")
        )
    }

    struct Fixture {
        session: Session,
        loader: MemLoader,
        ast: Ast,
        scopes: ScopeArena,
        root: NodeId,
    }

    impl Fixture {
        fn new(files: Vec<(&'static str, String)>, entry: &str) -> Self {
            let session = Session::new();
            let loader = MemLoader::new(files);
            let mut ast = Ast::new();
            let mut scopes = ScopeArena::new();
            let source = loader.load(Path::new(entry)).unwrap();
            let root = JsonFrontend.parse(&mut ast, Path::new(entry), &source).unwrap();
            session.cache_module(PathBuf::from(entry), CacheEntry::InProgress(root));
            passes::front_end(&mut ast, root, &session, &mut scopes).unwrap();
            Self {
                session,
                loader,
                ast,
                scopes,
                root,
            }
        }

        fn resolve(&mut self) -> Diagnostics {
            let frontend = JsonFrontend;
            let mut pass = ResolveImports::new(
                &self.session,
                &self.loader,
                &frontend,
                &mut self.scopes,
            );
            run_pass(&mut pass, &mut self.ast, self.root).unwrap();
            self.session
                .cache_module(PathBuf::from("/src/main.ql.ast"), CacheEntry::Ready(self.root));
            pass.take_diagnostics()
        }
    }

    #[test]
    fn imported_module_is_attached_under_its_import() {
        let mut fx = Fixture::new(
            vec![
                ("/src/main.ql.ast", module_json("main", &["util"])),
                ("/src/util.ql.ast", module_json("util", &[])),
            ],
            "/src/main.ql.ast",
        );
        let diagnostics = fx.resolve();
        assert!(diagnostics.is_empty(), "{diagnostics:?}");
        similar_asserts::assert_eq!(
            fx.ast.pretty(fx.root),
            "(module main (import util (module util)))"
        );
        let import = fx.ast.nodes_of(KindTag::Import)[0];
        match fx.ast.kind(import) {
            NodeKind::Import {
                resolved, module, ..
            } => {
                assert!(*resolved);
                assert!(module.is_some());
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn diamond_imports_load_the_shared_module_once() {
        let mut fx = Fixture::new(
            vec![
                ("/src/main.ql.ast", module_json("main", &["a", "b"])),
                ("/src/a.ql.ast", module_json("a", &["shared"])),
                ("/src/b.ql.ast", module_json("b", &["shared"])),
                ("/src/shared.ql.ast", module_json("shared", &[])),
            ],
            "/src/main.ql.ast",
        );
        let diagnostics = fx.resolve();
        assert!(diagnostics.is_empty(), "{diagnostics:?}");
        assert_eq!(fx.loader.loads_of("/src/shared.ql.ast"), 1);

        // Both imports of `shared` resolved to the same module handle.
        let handles: Vec<_> = fx
            .ast
            .nodes_of(KindTag::Import)
            .iter()
            .filter_map(|&import| match fx.ast.kind(import) {
                NodeKind::Import {
                    target, module, ..
                } if target == "shared" => *module,
                _ => None,
            })
            .collect();
        assert_eq!(handles.len(), 2);
        assert_eq!(handles[0], handles[1]);
    }

    #[test]
    fn circular_imports_terminate_with_a_warning() {
        let mut fx = Fixture::new(
            vec![
                ("/src/main.ql.ast", module_json("main", &["a"])),
                ("/src/a.ql.ast", module_json("a", &["b"])),
                ("/src/b.ql.ast", module_json("b", &["a"])),
            ],
            "/src/main.ql.ast",
        );
        let diagnostics = fx.resolve();
        assert_eq!(diagnostics.warnings().count(), 1);
        let warning = diagnostics.warnings().next().unwrap();
        assert!(warning.message.contains("circular import"), "{warning:?}");
        // Each file still got compiled exactly once.
        assert_eq!(fx.loader.loads_of("/src/a.ql.ast"), 1);
        assert_eq!(fx.loader.loads_of("/src/b.ql.ast"), 1);
    }

    #[test]
    fn missing_import_is_an_error_on_the_import_node() {
        let mut fx = Fixture::new(
            vec![("/src/main.ql.ast", module_json("main", &["ghost"]))],
            "/src/main.ql.ast",
        );
        let diagnostics = fx.resolve();
        assert_eq!(diagnostics.errors().count(), 1);
        let error = diagnostics.errors().next().unwrap();
        assert!(error.message.contains("ghost"), "{error:?}");
        let import = fx.ast.nodes_of(KindTag::Import)[0];
        assert_eq!(error.node, Some(import));
        match fx.ast.kind(import) {
            NodeKind::Import {
                resolved, module, ..
            } => {
                assert!(*resolved);
                assert!(module.is_none());
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn resolution_is_idempotent() {
        let mut fx = Fixture::new(
            vec![
                ("/src/main.ql.ast", module_json("main", &["util"])),
                ("/src/util.ql.ast", module_json("util", &[])),
            ],
            "/src/main.ql.ast",
        );
        fx.resolve();
        let before = fx.ast.pretty(fx.root);
        let diagnostics = fx.resolve();
        assert!(diagnostics.is_empty(), "{diagnostics:?}");
        similar_asserts::assert_eq!(fx.ast.pretty(fx.root), before);
        assert_eq!(fx.loader.loads_of("/src/util.ql.ast"), 1);
    }

    #[test]
    fn dotted_targets_resolve_into_subdirectories() {
        let mut fx = Fixture::new(
            vec![
                ("/src/main.ql.ast", module_json("main", &["lib.helpers"])),
                ("/src/lib/helpers.ql.ast", module_json("helpers", &[])),
            ],
            "/src/main.ql.ast",
        );
        let diagnostics = fx.resolve();
        assert!(diagnostics.is_empty(), "{diagnostics:?}");
        assert_eq!(fx.loader.loads_of("/src/lib/helpers.ql.ast"), 1);
    }
}
