use std::collections::{HashMap, HashSet};

use lazy_static::lazy_static;
use quill_syntax::ast::{Ast, BinOp, KindTag, Literal, NodeId, NodeKind, TreeVisitor, UnaryOp};

use crate::{
    diagnostics::{Diagnostics, Ice},
    pass::Pass,
    target::{Constant, Fragment, Helper},
};

const NAME: &str = "lower";

lazy_static! {
    /// Source operators with a direct target-side spelling. Pipe and range
    /// are absent on purpose: pipe rewrites into a call, range has no
    /// target equivalent.
    static ref BINARY_OPS: HashMap<BinOp, &'static str> = {
        let mut ops = HashMap::new();
        ops.insert(BinOp::Add, "+");
        ops.insert(BinOp::Sub, "-");
        ops.insert(BinOp::Mul, "*");
        ops.insert(BinOp::Div, "/");
        ops.insert(BinOp::Mod, "%");
        ops.insert(BinOp::Eq, "==");
        ops.insert(BinOp::Neq, "!=");
        ops.insert(BinOp::Lt, "<");
        ops.insert(BinOp::LtEq, "<=");
        ops.insert(BinOp::Gt, ">");
        ops.insert(BinOp::GtEq, ">=");
        ops.insert(BinOp::And, "and");
        ops.insert(BinOp::Or, "or");
        ops
    };
}

/// Helper bookkeeping for one module being lowered. Imported modules hang
/// inside their importer's tree, so frames nest; each module's helper
/// imports must land in that module's own body.
struct ModuleFrame {
    name: String,
    satisfied: HashSet<Helper>,
    preamble: Vec<Fragment>,
}

/// Bottom-up lowering into the target tree. Every exit hook consumes the
/// fragments its children produced and leaves one fragment for the parent;
/// after the walk the root module's fragment is the whole output.
pub struct Lower {
    diagnostics: Diagnostics,
    outputs: HashMap<NodeId, Fragment>,
    frames: Vec<ModuleFrame>,
}

impl Lower {
    pub fn new() -> Self {
        Self {
            diagnostics: Diagnostics::default(),
            outputs: HashMap::new(),
            frames: Vec::new(),
        }
    }

    /// The finished output for the root module. Failing to find one means a
    /// hook forgot to emit.
    pub fn take_module(&mut self, root: NodeId) -> Result<Fragment, Ice> {
        self.outputs
            .remove(&root)
            .ok_or_else(|| Ice::new(NAME, "no fragment produced for the root module", Some(root)))
    }

    fn emit(&mut self, node: NodeId, fragment: Fragment) {
        self.outputs.insert(node, fragment);
    }

    fn take(&mut self, node: NodeId) -> Result<Fragment, Ice> {
        self.outputs
            .remove(&node)
            .ok_or_else(|| Ice::new(NAME, "child was lowered out of order", Some(node)))
    }

    fn take_suite(&mut self, node: NodeId) -> Result<Vec<Fragment>, Ice> {
        match self.take(node)? {
            Fragment::Suite(stmts) => Ok(stmts),
            _ => Err(Ice::new(NAME, "expected a statement suite", Some(node))),
        }
    }

    /// Registers a helper dependency; the matching preamble import is
    /// appended at most once per enclosing module.
    fn needs(&mut self, helper: Helper) {
        if let Some(frame) = self.frames.last_mut() {
            if frame.satisfied.insert(helper) {
                frame.preamble.push(Fragment::HelperImport {
                    module: helper.module().to_string(),
                });
            }
        }
    }

    fn context_for(&self, ast: &Ast, node: NodeId, name: &str) -> String {
        let mut context = self
            .frames
            .iter()
            .map(|frame| frame.name.as_str())
            .collect::<Vec<_>>()
            .join(".");
        if !context.is_empty() {
            context.push('.');
        }
        context.push_str(name);
        if let Some(span) = ast.span_of(node) {
            context.push_str(&format!(" at {}..{}", span.start, span.end));
        }
        context
    }

    fn params_of(&self, ast: &Ast, node: NodeId) -> Vec<String> {
        ast.children(node)
            .iter()
            .copied()
            .find(|&child| ast.tag(child) == KindTag::ParamList)
            .map(|params| {
                ast.children(params)
                    .iter()
                    .filter_map(|&param| match ast.kind(param) {
                        NodeKind::Param { name } => Some(name.clone()),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn block_child(&self, ast: &Ast, node: NodeId) -> Option<NodeId> {
        ast.children(node)
            .iter()
            .copied()
            .find(|&child| ast.tag(child) == KindTag::Block)
    }
}

impl Default for Lower {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeVisitor for Lower {
    type Error = Ice;

    fn enter_module(&mut self, ast: &mut Ast, node: NodeId) -> Result<(), Ice> {
        let name = match ast.kind(node) {
            NodeKind::Module { name, .. } => name.clone(),
            _ => unreachable!("dispatched as module"),
        };
        self.frames.push(ModuleFrame {
            name,
            satisfied: HashSet::new(),
            preamble: Vec::new(),
        });
        Ok(())
    }

    fn exit_module(&mut self, ast: &mut Ast, node: NodeId) -> Result<(), Ice> {
        let frame = match self.frames.pop() {
            Some(frame) => frame,
            None => return Err(Ice::new(NAME, "module exit without an enter", Some(node))),
        };
        let name = frame.name;
        let mut body = frame.preamble;
        for &child in ast.children(node).to_vec().iter() {
            // Items that failed earlier passes (an unmatched impl, say)
            // left no fragment; the diagnostic already covers them.
            if let Some(fragment) = self.outputs.remove(&child) {
                body.push(fragment);
            }
        }
        self.emit(node, Fragment::Module { name, body });
        Ok(())
    }

    fn exit_import(&mut self, ast: &mut Ast, node: NodeId) -> Result<(), Ice> {
        let target = match ast.kind(node) {
            NodeKind::Import { target, .. } => target.clone(),
            _ => unreachable!("dispatched as import"),
        };
        // A freshly compiled module hangs under its import and lowered with
        // it; a cache hit resolves by name only.
        let module = ast
            .children(node)
            .iter()
            .copied()
            .find(|&child| ast.tag(child) == KindTag::Module)
            .and_then(|child| self.outputs.remove(&child))
            .map(Fragment::boxed);
        self.emit(
            node,
            Fragment::Import {
                name: target,
                module,
            },
        );
        Ok(())
    }

    fn exit_archetype(&mut self, ast: &mut Ast, node: NodeId) -> Result<(), Ice> {
        let name = match ast.kind(node) {
            NodeKind::Archetype { name } => name.clone(),
            _ => unreachable!("dispatched as archetype"),
        };
        let mut body = Vec::new();
        for &child in ast.children(node).to_vec().iter() {
            body.push(self.take(child)?);
        }
        self.emit(node, Fragment::ClassDef { name, body });
        Ok(())
    }

    fn exit_ability(&mut self, ast: &mut Ast, node: NodeId) -> Result<(), Ice> {
        let (name, is_abstract) = match ast.kind(node) {
            NodeKind::Ability { name, is_abstract } => (name.clone(), *is_abstract),
            _ => unreachable!("dispatched as ability"),
        };
        let params = self.params_of(ast, node);
        let body = match self.block_child(ast, node) {
            Some(block) if !is_abstract => {
                let suite = self.take_suite(block)?;
                self.needs(Helper::Runtime);
                vec![Fragment::TryWrap {
                    context: self.context_for(ast, node, &name),
                    body: suite,
                }]
            }
            Some(block) => {
                // Linking already rejected bodies on abstract declarations.
                self.outputs.remove(&block);
                Vec::new()
            }
            None => Vec::new(),
        };
        self.emit(node, Fragment::FuncDef { name, params, body });
        Ok(())
    }

    fn exit_enum_decl(&mut self, ast: &mut Ast, node: NodeId) -> Result<(), Ice> {
        let name = match ast.kind(node) {
            NodeKind::EnumDecl { name } => name.clone(),
            _ => unreachable!("dispatched as enum"),
        };
        let variants = ast
            .children(node)
            .iter()
            .filter_map(|&child| match ast.kind(child) {
                NodeKind::EnumVariant { name } => Some(name.clone()),
                _ => None,
            })
            .collect();
        self.needs(Helper::Enums);
        self.emit(node, Fragment::EnumDef { name, variants });
        Ok(())
    }

    fn exit_impl(&mut self, ast: &mut Ast, node: NodeId) -> Result<(), Ice> {
        // Only impls the linker could not match survive to this point.
        // Their diagnostic is already recorded; discard the lowered body.
        for &child in ast.children(node).to_vec().iter() {
            self.outputs.remove(&child);
        }
        Ok(())
    }

    fn exit_field(&mut self, ast: &mut Ast, node: NodeId) -> Result<(), Ice> {
        let name = match ast.kind(node) {
            NodeKind::Field { name } => name.clone(),
            _ => unreachable!("dispatched as field"),
        };
        let value = match ast.children(node).first().copied() {
            Some(init) => self.take(init)?,
            None => Fragment::Const(Constant::Unit),
        };
        self.emit(
            node,
            Fragment::Assign {
                target: Fragment::Name(name).boxed(),
                value: value.boxed(),
            },
        );
        Ok(())
    }

    fn exit_block(&mut self, ast: &mut Ast, node: NodeId) -> Result<(), Ice> {
        let mut stmts = Vec::new();
        for &child in ast.children(node).to_vec().iter() {
            stmts.push(self.take(child)?);
        }
        self.emit(node, Fragment::Suite(stmts));
        Ok(())
    }

    fn exit_test_block(&mut self, ast: &mut Ast, node: NodeId) -> Result<(), Ice> {
        let name = match ast.kind(node) {
            NodeKind::TestBlock { name } => name.clone(),
            _ => unreachable!("dispatched as test block"),
        };
        let block = self.block_child(ast, node).ok_or_else(|| {
            Ice::new(NAME, "test block without a body", Some(node))
        })?;
        let body = self.take_suite(block)?;
        self.needs(Helper::Tests);
        self.emit(node, Fragment::TestCase { name, body });
        Ok(())
    }

    fn exit_let(&mut self, ast: &mut Ast, node: NodeId) -> Result<(), Ice> {
        let name = match ast.kind(node) {
            NodeKind::Let { name } => name.clone(),
            _ => unreachable!("dispatched as let"),
        };
        let init = ast
            .children(node)
            .first()
            .copied()
            .ok_or_else(|| Ice::new(NAME, "let without an initializer", Some(node)))?;
        let value = self.take(init)?.boxed();
        self.emit(node, Fragment::Let { name, value });
        Ok(())
    }

    fn exit_assign(&mut self, ast: &mut Ast, node: NodeId) -> Result<(), Ice> {
        let [target, value] = ast.children(node) else {
            return Err(Ice::new(NAME, "assignment must have two operands", Some(node)));
        };
        let (target, value) = (*target, *value);
        let target = self.take(target)?.boxed();
        let value = self.take(value)?.boxed();
        self.emit(node, Fragment::Assign { target, value });
        Ok(())
    }

    fn exit_return(&mut self, ast: &mut Ast, node: NodeId) -> Result<(), Ice> {
        let value = match ast.children(node).first().copied() {
            Some(child) => Some(self.take(child)?.boxed()),
            None => None,
        };
        self.emit(node, Fragment::Return { value });
        Ok(())
    }

    fn exit_expr_stmt(&mut self, ast: &mut Ast, node: NodeId) -> Result<(), Ice> {
        let expr = ast
            .children(node)
            .first()
            .copied()
            .ok_or_else(|| Ice::new(NAME, "expression statement without a body", Some(node)))?;
        let expr = self.take(expr)?.boxed();
        self.emit(node, Fragment::ExprStmt(expr));
        Ok(())
    }

    fn exit_if(&mut self, ast: &mut Ast, node: NodeId) -> Result<(), Ice> {
        let children = ast.children(node).to_vec();
        let (&cond, &then) = match (children.first(), children.get(1)) {
            (Some(cond), Some(then)) => (cond, then),
            _ => return Err(Ice::new(NAME, "if without condition and body", Some(node))),
        };
        let cond = self.take(cond)?.boxed();
        let then = self.take_suite(then)?;
        let els = match children.get(2).copied() {
            Some(els) => self.take_suite(els)?,
            None => Vec::new(),
        };
        self.emit(node, Fragment::If { cond, then, els });
        Ok(())
    }

    fn exit_while(&mut self, ast: &mut Ast, node: NodeId) -> Result<(), Ice> {
        let [cond, body] = ast.children(node) else {
            return Err(Ice::new(NAME, "while without condition and body", Some(node)));
        };
        let (cond, body) = (*cond, *body);
        let cond = self.take(cond)?.boxed();
        let body = self.take_suite(body)?;
        self.emit(node, Fragment::While { cond, body });
        Ok(())
    }

    fn exit_binary(&mut self, ast: &mut Ast, node: NodeId) -> Result<(), Ice> {
        let op = match ast.kind(node) {
            NodeKind::Binary { op } => *op,
            _ => unreachable!("dispatched as binary"),
        };
        let [lhs, rhs] = ast.children(node) else {
            return Err(Ice::new(NAME, "binary operator must have two operands", Some(node)));
        };
        let (lhs, rhs) = (*lhs, *rhs);
        let lhs = self.take(lhs)?;
        let rhs = self.take(rhs)?;
        let fragment = if op == BinOp::Pipe {
            // `x |> f` is sugar for `f(x)`.
            Fragment::Call {
                callee: rhs.boxed(),
                args: vec![lhs],
            }
        } else if let Some(&symbol) = BINARY_OPS.get(&op) {
            Fragment::BinOp {
                op: symbol.to_string(),
                lhs: lhs.boxed(),
                rhs: rhs.boxed(),
            }
        } else {
            let reason = format!("operator `{}` has no lowered form", op.symbol());
            self.diagnostics.error(reason.clone(), Some(node));
            Fragment::Unsupported { reason }
        };
        self.emit(node, fragment);
        Ok(())
    }

    fn exit_unary(&mut self, ast: &mut Ast, node: NodeId) -> Result<(), Ice> {
        let op = match ast.kind(node) {
            NodeKind::Unary { op } => *op,
            _ => unreachable!("dispatched as unary"),
        };
        let operand = ast
            .children(node)
            .first()
            .copied()
            .ok_or_else(|| Ice::new(NAME, "unary operator without an operand", Some(node)))?;
        let operand = self.take(operand)?.boxed();
        let symbol = match op {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "not",
        };
        self.emit(
            node,
            Fragment::UnaryOp {
                op: symbol.to_string(),
                operand,
            },
        );
        Ok(())
    }

    fn exit_call(&mut self, ast: &mut Ast, node: NodeId) -> Result<(), Ice> {
        let children = ast.children(node).to_vec();
        let callee = children
            .first()
            .copied()
            .ok_or_else(|| Ice::new(NAME, "call without a callee", Some(node)))?;
        let callee = self.take(callee)?.boxed();
        let args = children[1..]
            .iter()
            .map(|&arg| self.take(arg))
            .collect::<Result<Vec<_>, _>>()?;
        self.emit(node, Fragment::Call { callee, args });
        Ok(())
    }

    fn exit_member(&mut self, ast: &mut Ast, node: NodeId) -> Result<(), Ice> {
        let attr = match ast.kind(node) {
            NodeKind::Member { name } => name.clone(),
            _ => unreachable!("dispatched as member"),
        };
        let receiver = ast
            .children(node)
            .first()
            .copied()
            .ok_or_else(|| Ice::new(NAME, "member access without a receiver", Some(node)))?;
        let value = self.take(receiver)?.boxed();
        self.emit(node, Fragment::Attribute { value, attr });
        Ok(())
    }

    fn exit_name_ref(&mut self, ast: &mut Ast, node: NodeId) -> Result<(), Ice> {
        let name = match ast.kind(node) {
            NodeKind::NameRef { name } => name.clone(),
            _ => unreachable!("dispatched as name"),
        };
        self.emit(node, Fragment::Name(name));
        Ok(())
    }

    fn exit_literal(&mut self, ast: &mut Ast, node: NodeId) -> Result<(), Ice> {
        let constant = match ast.kind(node) {
            NodeKind::Literal { value } => match value {
                Literal::Int(v) => Constant::Int(*v),
                Literal::Float(v) => Constant::Float(*v),
                Literal::Str(v) => Constant::Str(v.clone()),
                Literal::Bool(v) => Constant::Bool(*v),
                Literal::Unit => Constant::Unit,
            },
            _ => unreachable!("dispatched as literal"),
        };
        self.emit(node, Fragment::Const(constant));
        Ok(())
    }

    fn exit_token(&mut self, _ast: &mut Ast, node: NodeId) -> Result<(), Ice> {
        Err(Ice::new(
            NAME,
            "raw parse token survived to lowering",
            Some(node),
        ))
    }
}

impl Pass for Lower {
    fn name(&self) -> &'static str {
        NAME
    }

    fn diagnostics_mut(&mut self) -> &mut Diagnostics {
        &mut self.diagnostics
    }
}
