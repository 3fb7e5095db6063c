use serde::Serialize;

/// Runtime helpers the lowered code may depend on. Each maps to exactly one
/// preamble import, appended at most once per lowering run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Helper {
    Runtime,
    Enums,
    Tests,
}

impl Helper {
    pub fn module(self) -> &'static str {
        match self {
            Helper::Runtime => "quill_rt",
            Helper::Enums => "quill_rt.enums",
            Helper::Tests => "quill_rt.testing",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Constant {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Unit,
}

/// The lowered, target-side AST. Opaque to this pipeline beyond
/// construction; the downstream consumer serializes or executes it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Fragment {
    Module {
        name: String,
        body: Vec<Fragment>,
    },
    /// Synthetic preamble entry produced by the needs-helper mechanism.
    HelperImport {
        module: String,
    },
    Import {
        name: String,
        module: Option<Box<Fragment>>,
    },
    FuncDef {
        name: String,
        params: Vec<String>,
        body: Vec<Fragment>,
    },
    ClassDef {
        name: String,
        body: Vec<Fragment>,
    },
    EnumDef {
        name: String,
        variants: Vec<String>,
    },
    TestCase {
        name: String,
        body: Vec<Fragment>,
    },
    /// Error handler wrapped around every function-like body; reports the
    /// original source context on failure.
    TryWrap {
        context: String,
        body: Vec<Fragment>,
    },
    /// Ordered statement list of a block; consumed by the enclosing
    /// construct, never serialized on its own.
    Suite(Vec<Fragment>),
    Let {
        name: String,
        value: Box<Fragment>,
    },
    Assign {
        target: Box<Fragment>,
        value: Box<Fragment>,
    },
    Return {
        value: Option<Box<Fragment>>,
    },
    If {
        cond: Box<Fragment>,
        then: Vec<Fragment>,
        els: Vec<Fragment>,
    },
    While {
        cond: Box<Fragment>,
        body: Vec<Fragment>,
    },
    BinOp {
        op: String,
        lhs: Box<Fragment>,
        rhs: Box<Fragment>,
    },
    UnaryOp {
        op: String,
        operand: Box<Fragment>,
    },
    Call {
        callee: Box<Fragment>,
        args: Vec<Fragment>,
    },
    Attribute {
        value: Box<Fragment>,
        attr: String,
    },
    Name(String),
    Const(Constant),
    ExprStmt(Box<Fragment>),
    /// Placeholder for constructs outside the supported subset; always
    /// accompanied by a diagnostic.
    Unsupported {
        reason: String,
    },
}

impl Fragment {
    pub fn boxed(self) -> Box<Fragment> {
        Box::new(self)
    }
}
