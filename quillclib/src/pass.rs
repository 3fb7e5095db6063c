use quill_syntax::ast::{visit, Ast, NodeId, TreeVisitor};

use crate::diagnostics::{Diagnostics, Ice};

/// One scheduled compiler pass. The engine runs `before_pass`, then one
/// full depth-first traversal through the [`TreeVisitor`] hooks. A pass
/// that reports itself terminated skips the traversal and `before_pass`
/// owns the whole loop (import resolution interleaves index rebuilds
/// between scans, which the automatic descent cannot do).
///
/// Recoverable findings go into the pass's own [`Diagnostics`]; only an
/// [`Ice`] aborts the pass.
pub trait Pass: TreeVisitor<Error = Ice> {
    fn name(&self) -> &'static str;

    fn before_pass(&mut self, _ast: &mut Ast, _root: NodeId) -> Result<(), Ice> {
        Ok(())
    }

    /// True when the pass disabled the automatic descent.
    fn terminated(&self) -> bool {
        false
    }

    fn diagnostics_mut(&mut self) -> &mut Diagnostics;

    fn take_diagnostics(&mut self) -> Diagnostics {
        std::mem::take(self.diagnostics_mut())
    }
}

pub fn run_pass<P: Pass>(pass: &mut P, ast: &mut Ast, root: NodeId) -> Result<(), Ice> {
    tracing::debug!(pass = pass.name(), "running pass");
    pass.before_pass(ast, root)?;
    if pass.terminated() {
        tracing::debug!(pass = pass.name(), "pass drives its own traversal");
        return Ok(());
    }
    visit::walk(pass, ast, root)
}
