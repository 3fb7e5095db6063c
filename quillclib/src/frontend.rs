use std::{
    cell::RefCell,
    collections::HashMap,
    path::{Component, Path, PathBuf},
};

use serde::Deserialize;
use thiserror::Error;

use quill_syntax::ast::{Ast, KindTag, NodeId, NodeKind, Span};

/// Parse trees arrive serialized; the lexer and parser live in a separate
/// tool that writes one `<module>.ql.ast` file per source module.
pub const MODULE_EXT: &str = "ql.ast";

#[derive(Error, Debug)]
pub enum FrontendError {
    #[error("cannot read `{path}`: {reason}")]
    Load { path: PathBuf, reason: String },
    #[error("malformed parse tree in `{path}`: {reason}")]
    Parse { path: PathBuf, reason: String },
    #[error("`{path}` does not contain a module at the top level")]
    NotAModule { path: PathBuf },
    #[error("leaf node without a span in `{path}`")]
    MissingSpan { path: PathBuf },
}

/// Source access for import resolution. The canonical path keys the module
/// cache, so two spellings of the same file must canonicalize equally.
pub trait ModuleLoader {
    fn load(&self, path: &Path) -> Result<String, FrontendError>;

    fn canonical(&self, path: &Path) -> PathBuf {
        normalize(path)
    }
}

/// Loader over the real filesystem, used by the CLI.
pub struct FsLoader;

impl ModuleLoader for FsLoader {
    fn load(&self, path: &Path) -> Result<String, FrontendError> {
        std::fs::read_to_string(path).map_err(|err| FrontendError::Load {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })
    }

    fn canonical(&self, path: &Path) -> PathBuf {
        std::fs::canonicalize(path).unwrap_or_else(|_| normalize(path))
    }
}

/// In-memory loader for tests and embedding; records every load so tests
/// can assert how often a module was actually compiled.
#[derive(Default)]
pub struct MemLoader {
    files: HashMap<PathBuf, String>,
    loads: RefCell<Vec<PathBuf>>,
}

impl MemLoader {
    pub fn new(files: impl IntoIterator<Item = (&'static str, String)>) -> Self {
        Self {
            files: files
                .into_iter()
                .map(|(path, source)| (PathBuf::from(path), source))
                .collect(),
            loads: RefCell::new(Vec::new()),
        }
    }

    pub fn loads_of(&self, path: &str) -> usize {
        let path = PathBuf::from(path);
        self.loads.borrow().iter().filter(|&p| *p == path).count()
    }
}

impl ModuleLoader for MemLoader {
    fn load(&self, path: &Path) -> Result<String, FrontendError> {
        self.loads.borrow_mut().push(path.to_path_buf());
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| FrontendError::Load {
                path: path.to_path_buf(),
                reason: "no such file".to_string(),
            })
    }
}

/// Target path of an import: segments of the dotted module name resolved
/// relative to the importing file's directory.
pub fn module_path(base_dir: &Path, target: &str) -> PathBuf {
    let mut path = base_dir.to_path_buf();
    let mut segments = target.split('.').peekable();
    while let Some(segment) = segments.next() {
        if segments.peek().is_some() {
            path.push(segment);
        } else {
            path.push(format!("{segment}.{MODULE_EXT}"));
        }
    }
    path
}

/// Lexical normalization: strips `.` and folds `..` without touching the
/// filesystem, so in-memory loaders behave like the real one.
pub fn normalize(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !result.pop() {
                    result.push(Component::ParentDir);
                }
            }
            other => result.push(other),
        }
    }
    result
}

/// The upstream parser boundary: turns one source artifact into a module
/// subtree inside the shared arena. The only contract is a kind tag per
/// node, ordered children and resolvable spans.
pub trait Frontend {
    fn parse(&self, ast: &mut Ast, path: &Path, source: &str) -> Result<NodeId, FrontendError>;
}

/// Serialized parse-tree node as the external parser writes it.
#[derive(Debug, Deserialize)]
pub struct RawNode {
    pub kind: NodeKind,
    #[serde(default)]
    pub span: Option<Span>,
    #[serde(default)]
    pub children: Vec<RawNode>,
}

/// Reads the JSON parse trees produced by the external parser.
pub struct JsonFrontend;

impl Frontend for JsonFrontend {
    fn parse(&self, ast: &mut Ast, path: &Path, source: &str) -> Result<NodeId, FrontendError> {
        let raw: RawNode = serde_json::from_str(source).map_err(|err| FrontendError::Parse {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
        if raw.kind.tag() != KindTag::Module {
            return Err(FrontendError::NotAModule {
                path: path.to_path_buf(),
            });
        }
        let module = build(ast, path, raw)?;
        if let NodeKind::Module { path: module_path, .. } = ast.kind_mut(module) {
            *module_path = path.to_path_buf();
        }
        Ok(module)
    }
}

fn build(ast: &mut Ast, path: &Path, raw: RawNode) -> Result<NodeId, FrontendError> {
    if raw.children.is_empty() {
        return match raw.span {
            Some(span) => Ok(ast.alloc_leaf(raw.kind, span)),
            // Childless containers are fine, valueless leaves are not.
            None if matches!(
                raw.kind.tag(),
                KindTag::Block | KindTag::ParamList | KindTag::Module
            ) =>
            {
                Ok(ast.alloc(raw.kind))
            }
            None => Err(FrontendError::MissingSpan {
                path: path.to_path_buf(),
            }),
        };
    }
    let children = raw
        .children
        .into_iter()
        .map(|child| build(ast, path, child))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ast.alloc_with_children(raw.kind, children))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_path_resolves_dotted_targets() {
        assert_eq!(
            module_path(Path::new("/proj/src"), "lib.helpers"),
            PathBuf::from("/proj/src/lib/helpers.ql.ast")
        );
    }

    #[test]
    fn normalize_folds_dot_segments() {
        assert_eq!(
            normalize(Path::new("/a/b/../c/./d.ql.ast")),
            PathBuf::from("/a/c/d.ql.ast")
        );
    }

    #[test]
    fn json_frontend_reads_a_module_tree() {
        let source = r#"{
            "kind": { "Module": { "name": "m", "path": "", "imported": false } },
            "children": [
                { "kind": { "Import": { "target": "util", "resolved": false, "module": null } },
                  "span": { "start": 0, "end": 2 } }
            ]
        }"#;
        let mut ast = Ast::new();
        let module = JsonFrontend
            .parse(&mut ast, Path::new("/src/m.ql.ast"), source)
            .unwrap();
        similar_asserts::assert_eq!(ast.pretty(module), "(module m (import? util))");
        match ast.kind(module) {
            NodeKind::Module { path, .. } => {
                assert_eq!(path, &PathBuf::from("/src/m.ql.ast"));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn top_level_must_be_a_module() {
        let source = r#"{ "kind": "Block" }"#;
        let mut ast = Ast::new();
        let err = JsonFrontend
            .parse(&mut ast, Path::new("/src/m.ql.ast"), source)
            .unwrap_err();
        assert!(matches!(err, FrontendError::NotAModule { .. }));
    }

    #[test]
    fn leaves_must_carry_spans() {
        let source = r#"{
            "kind": { "Module": { "name": "m", "path": "", "imported": false } },
            "children": [ { "kind": { "NameRef": { "name": "x" } } } ]
        }"#;
        let mut ast = Ast::new();
        let err = JsonFrontend
            .parse(&mut ast, Path::new("/src/m.ql.ast"), source)
            .unwrap_err();
        assert!(matches!(err, FrontendError::MissingSpan { .. }));
    }
}
