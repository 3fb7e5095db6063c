use quill_syntax::ast::{Ast, NodeId};

use crate::{
    diagnostics::{Diagnostics, Ice},
    pass::{run_pass, Pass},
    session::Session,
    symbols::ScopeArena,
};

pub mod build_scopes;
pub mod link_impls;
pub mod lower;
pub mod resolve_imports;

/// The per-module front end: scope construction followed by decl/def
/// linking. Runs once for the entry module and once for every module the
/// import resolver pulls in.
pub fn front_end(
    ast: &mut Ast,
    module: NodeId,
    session: &Session,
    scopes: &mut ScopeArena,
) -> Result<Diagnostics, Ice> {
    let mut diagnostics = Diagnostics::default();
    let mut build = build_scopes::ScopeBuilder::new(session, scopes);
    run_pass(&mut build, ast, module)?;
    diagnostics.extend(build.take_diagnostics());
    let mut link = link_impls::LinkImpls::new(scopes);
    run_pass(&mut link, ast, module)?;
    diagnostics.extend(link.take_diagnostics());
    Ok(diagnostics)
}
