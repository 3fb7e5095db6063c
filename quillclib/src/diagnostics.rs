use quill_syntax::ast::NodeId;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// One recoverable finding of a pass. Reported against a node where one is
/// available; a reporting layer resolves the node to a source location.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub node: Option<NodeId>,
}

/// Ordered list of diagnostics a pass accumulated. Passes record and keep
/// going so one run surfaces every independent problem it can find.
#[derive(Debug, Default)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    pub fn error(&mut self, message: impl Into<String>, node: Option<NodeId>) {
        self.0.push(Diagnostic {
            severity: Severity::Error,
            message: message.into(),
            node,
        });
    }

    pub fn warning(&mut self, message: impl Into<String>, node: Option<NodeId>) {
        self.0.push(Diagnostic {
            severity: Severity::Warning,
            message: message.into(),
            node,
        });
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.0.extend(other.0);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.0.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter().filter(|d| d.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter().filter(|d| d.severity == Severity::Warning)
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Internal compiler error: a tree shape that must be impossible after the
/// preceding passes. Always fatal, aborts the pass that raised it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("internal compiler error in pass `{pass}`: {message}")]
pub struct Ice {
    pub pass: &'static str,
    pub message: String,
    pub node: Option<NodeId>,
}

impl Ice {
    pub fn new(pass: &'static str, message: impl Into<String>, node: Option<NodeId>) -> Self {
        Self {
            pass,
            message: message.into(),
            node,
        }
    }
}
