use std::path::Path;

use thiserror::Error;

use quill_syntax::ast::{Ast, NodeId};

use crate::{
    diagnostics::{Diagnostics, Ice},
    frontend::{Frontend, FrontendError, ModuleLoader},
    pass::{run_pass, Pass},
    passes::{self, lower::Lower, resolve_imports::ResolveImports},
    session::{CacheEntry, Session},
    symbols::ScopeArena,
    target::Fragment,
};

#[derive(Error, Debug)]
pub enum CompilationError {
    #[error(transparent)]
    Frontend(#[from] FrontendError),
    #[error(transparent)]
    Ice(#[from] Ice),
}

/// Everything a successful run produces: the entry module's node, the
/// lowered output and the diagnostics of every pass, in pass order.
pub struct CompileOutput {
    pub module: NodeId,
    pub fragment: Fragment,
    pub diagnostics: Diagnostics,
}

/// Drives one compilation: parse the entry module, build scopes, link
/// impls, pull in imports and lower. The arena and scope tree stay public
/// so embedders (and the CLI's `--print-ast`) can inspect them afterwards.
pub struct Compiler<L, F> {
    session: Session,
    loader: L,
    frontend: F,
    pub ast: Ast,
    pub scopes: ScopeArena,
}

impl<L: ModuleLoader, F: Frontend> Compiler<L, F> {
    pub fn new(loader: L, frontend: F) -> Self {
        Self {
            session: Session::new(),
            loader,
            frontend,
            ast: Ast::new(),
            scopes: ScopeArena::new(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn compile_entry(&mut self, path: &Path) -> Result<CompileOutput, CompilationError> {
        let canonical = self.loader.canonical(path);
        tracing::info!(path = %canonical.display(), "compiling entry module");
        let source = self.loader.load(&canonical)?;
        let module = self.frontend.parse(&mut self.ast, &canonical, &source)?;
        self.session
            .cache_module(canonical.clone(), CacheEntry::InProgress(module));

        let mut diagnostics =
            passes::front_end(&mut self.ast, module, &self.session, &mut self.scopes)?;

        let mut imports = ResolveImports::new(
            &self.session,
            &self.loader,
            &self.frontend,
            &mut self.scopes,
        );
        run_pass(&mut imports, &mut self.ast, module)?;
        diagnostics.extend(imports.take_diagnostics());
        self.session
            .cache_module(canonical, CacheEntry::Ready(module));

        let mut lower = Lower::new();
        run_pass(&mut lower, &mut self.ast, module)?;
        diagnostics.extend(lower.take_diagnostics());
        let fragment = lower.take_module(module)?;

        tracing::info!(
            errors = diagnostics.errors().count(),
            warnings = diagnostics.warnings().count(),
            "compilation finished"
        );
        Ok(CompileOutput {
            module,
            fragment,
            diagnostics,
        })
    }
}
