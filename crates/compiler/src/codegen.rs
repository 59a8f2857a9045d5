//! LLVM IR Code Generation
//!
//! A tree-walk printer producing textual LLVM IR (.ll). No LLVM library
//! is linked; the output targets opaque pointers (LLVM 15+).
//!
//! # Value Representation
//!
//! Surface values cross into the runtime as opaque handles:
//!
//! - `numeric` → `ptr` to a tagged numeric (the runtime probes the
//!   integer fast path for overflow on every operation and promotes to
//!   arbitrary precision when it trips)
//! - `string` → `ptr` to an SSO envelope
//! - `boolean` → `i1` in registers, widened to `i64` at ABI boundaries
//! - optionals → `ptr` to a presence-tagged wrapper
//!
//! Literals lower to private constant globals holding their source text;
//! the runtime re-infers the numeric storage kind from that text, so a
//! literal too wide for a machine integer starts life in the big
//! representation.
//!
//! # Shape of the output
//!
//! One IR function per surface function (`@opal_fn_<name>`; `main`
//! becomes the C entry point returning 0). Every local gets its own
//! `alloca` slot with a per-declaration suffix, so sibling blocks that
//! reuse a name never collide. Expression values are SSA temporaries
//! `%tN`; control flow uses labeled blocks with a per-function counter.
//!
//! Generated code does not emit per-value release calls; a compiled
//! program's values are reclaimed at process exit. The runtime's
//! ownership contracts still govern every handle the generated code
//! passes back into it.

use crate::ast::{BinOp, Expr, Function, Program, Stmt, Type, UnOp};
use crate::semantic::{FuncSig, TypeEnv, collect_signatures, expr_type};
use std::collections::HashMap;
use std::fmt;
use std::fmt::Write as _;

/// A code-generation failure (a bug upstream: semantic analysis should
/// reject everything this module cannot lower).
#[derive(Debug, Clone)]
pub struct CodeGenError {
    pub message: String,
}

impl fmt::Display for CodeGenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "codegen: {}", self.message)
    }
}

impl std::error::Error for CodeGenError {}

impl From<fmt::Error> for CodeGenError {
    fn from(e: fmt::Error) -> Self {
        CodeGenError {
            message: format!("formatting failed: {e}"),
        }
    }
}

fn bug<T>(message: impl Into<String>) -> Result<T, CodeGenError> {
    Err(CodeGenError {
        message: message.into(),
    })
}

/// Runtime function declarations, one `declare` line each, emitted at
/// the top of every module.
pub const RUNTIME_DECLARATIONS: &[&str] = &[
    // Tagged numerics
    "declare ptr @opal_numeric_from_literal(ptr)",
    "declare ptr @opal_numeric_from_i64(i64)",
    "declare i64 @opal_numeric_as_i64(ptr)",
    "declare ptr @opal_numeric_parse(ptr)",
    "declare ptr @opal_numeric_add(ptr, ptr)",
    "declare ptr @opal_numeric_sub(ptr, ptr)",
    "declare ptr @opal_numeric_mul(ptr, ptr)",
    "declare ptr @opal_numeric_div(ptr, ptr)",
    "declare ptr @opal_numeric_neg(ptr)",
    "declare i64 @opal_numeric_compare(ptr, ptr)",
    "declare ptr @opal_numeric_to_string(ptr)",
    "declare ptr @opal_numeric_min(ptr, ptr)",
    "declare ptr @opal_numeric_max(ptr, ptr)",
    "declare ptr @opal_numeric_abs(ptr)",
    // SSO strings
    "declare ptr @opal_string_create(ptr)",
    "declare i64 @opal_string_length(ptr)",
    "declare ptr @opal_string_concat(ptr, ptr)",
    "declare i64 @opal_string_compare(ptr, ptr)",
    "declare i64 @opal_string_equals(ptr, ptr)",
    "declare ptr @opal_string_substring(ptr, i64, i64)",
    "declare i64 @opal_string_find(ptr, ptr)",
    "declare i64 @opal_string_starts_with(ptr, ptr)",
    "declare i64 @opal_string_ends_with(ptr, ptr)",
    // Optionals
    "declare ptr @opal_optional_none()",
    "declare ptr @opal_optional_some_numeric(ptr)",
    "declare ptr @opal_optional_some_string(ptr)",
    "declare ptr @opal_optional_some_bool(i64)",
    "declare i64 @opal_optional_has_value(ptr)",
    "declare ptr @opal_optional_get_numeric(ptr)",
    "declare ptr @opal_optional_get_string(ptr)",
    "declare i64 @opal_optional_get_bool(ptr)",
    // Console I/O
    "declare void @opal_print_numeric(ptr)",
    "declare void @opal_print_string(ptr)",
    "declare void @opal_print_bool(i64)",
    "declare ptr @opal_read_line()",
    // File I/O shims
    "declare ptr @opal_read_file_string(ptr)",
    "declare i64 @opal_write_file_string(ptr, ptr)",
    "declare i64 @opal_append_file_string(ptr, ptr)",
    "declare i64 @opal_file_exists_string(ptr)",
    "declare i64 @opal_file_size_string(ptr)",
    // Keyed state store
    "declare i64 @opal_state_init()",
    "declare i64 @opal_state_close()",
    "declare i64 @opal_state_set_str(ptr, ptr)",
    "declare ptr @opal_state_get_str(ptr)",
    "declare i64 @opal_state_has_str(ptr)",
    "declare i64 @opal_state_delete_str(ptr)",
    "declare i64 @opal_state_clear()",
    "declare i64 @opal_state_config_set_str(ptr, ptr)",
    "declare i64 @opal_state_save()",
    "declare i64 @opal_state_load()",
];

/// Pick the triple for the machine we are compiling on.
pub fn default_target_triple() -> &'static str {
    if cfg!(all(target_os = "macos", target_arch = "aarch64")) {
        "arm64-apple-macosx"
    } else if cfg!(target_os = "macos") {
        "x86_64-apple-macosx"
    } else if cfg!(all(target_os = "linux", target_arch = "aarch64")) {
        "aarch64-unknown-linux-gnu"
    } else {
        "x86_64-unknown-linux-gnu"
    }
}

pub struct CodeGen {
    sigs: HashMap<String, FuncSig>,
    output: String,
    literals: Vec<Vec<u8>>,
    temp: usize,
    label: usize,
    slot: usize,
    emit_comments: bool,
    target_triple: String,
}

/// Per-function lowering state: the typing environment plus the alloca
/// slot each visible local lives in.
struct Frame<'a> {
    env: TypeEnv<'a>,
    slots: HashMap<String, String>,
}

struct FuncCtx {
    ret: Option<Type>,
    is_main: bool,
}

impl CodeGen {
    pub fn new(target_triple: impl Into<String>, emit_comments: bool) -> CodeGen {
        CodeGen {
            sigs: HashMap::new(),
            output: String::new(),
            literals: Vec::new(),
            temp: 0,
            label: 0,
            slot: 0,
            emit_comments,
            target_triple: target_triple.into(),
        }
    }

    /// Generate LLVM IR for an analyzed program.
    pub fn generate(&mut self, program: &Program) -> Result<String, CodeGenError> {
        self.sigs = collect_signatures(program).map_err(|e| CodeGenError {
            message: format!("unanalyzed program: {e}"),
        })?;

        for function in &program.functions {
            self.gen_function(function)?;
        }

        let mut ir = String::new();
        writeln!(ir, "; ModuleID = 'opal'")?;
        writeln!(ir, "target triple = \"{}\"", self.target_triple)?;
        writeln!(ir)?;

        if !self.literals.is_empty() {
            writeln!(ir, "; Literal constants")?;
            for (index, bytes) in self.literals.iter().enumerate() {
                writeln!(
                    ir,
                    "@.lit.{index} = private unnamed_addr constant [{} x i8] c\"{}\"",
                    bytes.len() + 1,
                    encode_literal(bytes)
                )?;
            }
            writeln!(ir)?;
        }

        writeln!(ir, "; Runtime function declarations")?;
        for decl in RUNTIME_DECLARATIONS {
            writeln!(ir, "{decl}")?;
        }
        writeln!(ir)?;

        ir.push_str(&self.output);
        Ok(ir)
    }

    // ------------------------------------------------------------------
    // Functions
    // ------------------------------------------------------------------

    fn gen_function(&mut self, function: &Function) -> Result<(), CodeGenError> {
        // Temporaries, labels and slots restart per function.
        self.temp = 0;
        self.label = 0;
        self.slot = 0;

        let sigs = self.sigs.clone();
        let mut frame = Frame {
            env: TypeEnv {
                sigs: &sigs,
                locals: HashMap::new(),
            },
            slots: HashMap::new(),
        };

        let ctx = FuncCtx {
            ret: function.ret.clone(),
            is_main: function.name == "main",
        };

        let params: Vec<String> = function
            .params
            .iter()
            .map(|p| format!("{} %arg.{}", llvm_type(&p.ty), p.name))
            .collect();

        if ctx.is_main {
            writeln!(self.output, "define i32 @main() {{")?;
        } else {
            let ret = match &function.ret {
                Some(ty) => llvm_type(ty),
                None => "void",
            };
            writeln!(
                self.output,
                "define {ret} @opal_fn_{}({}) {{",
                function.name,
                params.join(", ")
            )?;
        }
        writeln!(self.output, "entry:")?;

        for param in &function.params {
            let ty = llvm_type(&param.ty);
            let slot = format!("%{}.addr", param.name);
            writeln!(self.output, "  {slot} = alloca {ty}")?;
            writeln!(self.output, "  store {ty} %arg.{}, ptr {slot}", param.name)?;
            frame
                .env
                .locals
                .insert(param.name.clone(), param.ty.clone());
            frame.slots.insert(param.name.clone(), slot);
        }

        let terminated = self.gen_block(&function.body, &mut frame, &ctx)?;
        if !terminated {
            if ctx.is_main {
                writeln!(self.output, "  ret i32 0")?;
            } else if function.ret.is_none() {
                writeln!(self.output, "  ret void")?;
            } else {
                // Analysis proved every path returns; this block is dead.
                writeln!(self.output, "  unreachable")?;
            }
        }
        writeln!(self.output, "}}")?;
        writeln!(self.output)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    /// Lower a block; true when it ended in a terminator. Statements
    /// after a `return` are dead and skipped; locals declared by the
    /// block go out of scope with it.
    fn gen_block(
        &mut self,
        block: &[Stmt],
        frame: &mut Frame,
        ctx: &FuncCtx,
    ) -> Result<bool, CodeGenError> {
        let mut declared_here = Vec::new();
        let mut terminated = false;
        for stmt in block {
            if self.gen_stmt(stmt, frame, ctx, &mut declared_here)? {
                terminated = true;
                break;
            }
        }
        for name in declared_here {
            frame.env.locals.remove(&name);
            frame.slots.remove(&name);
        }
        Ok(terminated)
    }

    fn gen_stmt(
        &mut self,
        stmt: &Stmt,
        frame: &mut Frame,
        ctx: &FuncCtx,
        declared_here: &mut Vec<String>,
    ) -> Result<bool, CodeGenError> {
        match stmt {
            Stmt::Declare {
                ty,
                name,
                value,
                span,
            } => {
                if self.emit_comments {
                    writeln!(self.output, "  ; line {}: declare {name}", span.line)?;
                }
                let (val, actual) = self.gen_expr(value, frame)?;
                let val = self.coerce(val, &actual, ty)?;
                let llty = llvm_type(ty);
                let slot = self.fresh_slot(name);
                writeln!(self.output, "  {slot} = alloca {llty}")?;
                writeln!(self.output, "  store {llty} {val}, ptr {slot}")?;
                frame.env.locals.insert(name.clone(), ty.clone());
                frame.slots.insert(name.clone(), slot);
                declared_here.push(name.clone());
                Ok(false)
            }
            Stmt::Assign { name, value, span } => {
                if self.emit_comments {
                    writeln!(self.output, "  ; line {}: assign {name}", span.line)?;
                }
                let Some(declared) = frame.env.locals.get(name).cloned() else {
                    return bug(format!("assignment to unknown local '{name}'"));
                };
                let Some(slot) = frame.slots.get(name).cloned() else {
                    return bug(format!("no slot for local '{name}'"));
                };
                let (val, actual) = self.gen_expr(value, frame)?;
                let val = self.coerce(val, &actual, &declared)?;
                writeln!(
                    self.output,
                    "  store {} {val}, ptr {slot}",
                    llvm_type(&declared)
                )?;
                Ok(false)
            }
            Stmt::If {
                cond,
                then_body,
                else_body,
                ..
            } => {
                let (cond_val, _) = self.gen_expr(cond, frame)?;
                let suffix = self.next_label();
                let then_label = format!("if.then.{suffix}");
                let else_label = format!("if.else.{suffix}");
                let end_label = format!("if.end.{suffix}");
                let has_else = !else_body.is_empty();

                let false_target = if has_else { &else_label } else { &end_label };
                writeln!(
                    self.output,
                    "  br i1 {cond_val}, label %{then_label}, label %{false_target}"
                )?;

                writeln!(self.output, "{then_label}:")?;
                let then_terminated = self.gen_block(then_body, frame, ctx)?;
                if !then_terminated {
                    writeln!(self.output, "  br label %{end_label}")?;
                }

                let mut else_terminated = false;
                if has_else {
                    writeln!(self.output, "{else_label}:")?;
                    else_terminated = self.gen_block(else_body, frame, ctx)?;
                    if !else_terminated {
                        writeln!(self.output, "  br label %{end_label}")?;
                    }
                }

                writeln!(self.output, "{end_label}:")?;
                if then_terminated && else_terminated {
                    // No branch reaches this block; close it out.
                    writeln!(self.output, "  unreachable")?;
                    return Ok(true);
                }
                Ok(false)
            }
            Stmt::While { cond, body, .. } => {
                let suffix = self.next_label();
                let cond_label = format!("while.cond.{suffix}");
                let body_label = format!("while.body.{suffix}");
                let end_label = format!("while.end.{suffix}");

                writeln!(self.output, "  br label %{cond_label}")?;
                writeln!(self.output, "{cond_label}:")?;
                let (cond_val, _) = self.gen_expr(cond, frame)?;
                writeln!(
                    self.output,
                    "  br i1 {cond_val}, label %{body_label}, label %{end_label}"
                )?;

                writeln!(self.output, "{body_label}:")?;
                let terminated = self.gen_block(body, frame, ctx)?;
                if !terminated {
                    writeln!(self.output, "  br label %{cond_label}")?;
                }
                writeln!(self.output, "{end_label}:")?;
                Ok(false)
            }
            Stmt::Return { value, .. } => {
                match (&ctx.ret, value) {
                    (_, None) if ctx.is_main => writeln!(self.output, "  ret i32 0")?,
                    (None, None) => writeln!(self.output, "  ret void")?,
                    (Some(ret), Some(value)) => {
                        let ret = ret.clone();
                        let (val, actual) = self.gen_expr(value, frame)?;
                        let val = self.coerce(val, &actual, &ret)?;
                        writeln!(self.output, "  ret {} {val}", llvm_type(&ret))?;
                    }
                    _ => return bug("return shape survived analysis"),
                }
                Ok(true)
            }
            Stmt::Print { value, span } => {
                if self.emit_comments {
                    writeln!(self.output, "  ; line {}: print", span.line)?;
                }
                let (val, ty) = self.gen_expr(value, frame)?;
                match ty {
                    Type::Numeric => {
                        writeln!(self.output, "  call void @opal_print_numeric(ptr {val})")?;
                    }
                    Type::String => {
                        writeln!(self.output, "  call void @opal_print_string(ptr {val})")?;
                    }
                    Type::Boolean => {
                        let wide = self.fresh();
                        writeln!(self.output, "  {wide} = zext i1 {val} to i64")?;
                        writeln!(self.output, "  call void @opal_print_bool(i64 {wide})")?;
                    }
                    other => return bug(format!("print of {other} survived analysis")),
                }
                Ok(false)
            }
            Stmt::Expr { value, .. } => {
                // A call to a void user function has no value to produce.
                if let Expr::Call { name, args, .. } = value
                    && let Some(sig) = frame.env.sigs.get(name)
                    && sig.ret.is_none()
                {
                    let params = sig.params.clone();
                    let name = name.clone();
                    let lowered = self.gen_args(args, &params, frame)?;
                    writeln!(
                        self.output,
                        "  call void @opal_fn_{name}({})",
                        lowered.join(", ")
                    )?;
                    return Ok(false);
                }
                self.gen_expr(value, frame)?;
                Ok(false)
            }
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    /// Lower an expression to `(value, type)`: an SSA register or an
    /// immediate, plus the surface type it carries.
    fn gen_expr(&mut self, expr: &Expr, frame: &Frame) -> Result<(String, Type), CodeGenError> {
        match expr {
            Expr::Number { text, .. } => {
                let lit = self.literal(text.as_bytes());
                let reg = self.fresh();
                writeln!(
                    self.output,
                    "  {reg} = call ptr @opal_numeric_from_literal(ptr {lit})"
                )?;
                Ok((reg, Type::Numeric))
            }
            Expr::Str { value, .. } => {
                let lit = self.literal(value.as_bytes());
                let reg = self.fresh();
                writeln!(
                    self.output,
                    "  {reg} = call ptr @opal_string_create(ptr {lit})"
                )?;
                Ok((reg, Type::String))
            }
            Expr::Bool { value, .. } => Ok(((*value as u8).to_string(), Type::Boolean)),
            Expr::None { .. } => {
                let reg = self.fresh();
                writeln!(self.output, "  {reg} = call ptr @opal_optional_none()")?;
                Ok((reg, Type::None))
            }
            Expr::Ident { name, .. } => {
                let Some(ty) = frame.env.locals.get(name).cloned() else {
                    return bug(format!("unknown local '{name}'"));
                };
                let Some(slot) = frame.slots.get(name).cloned() else {
                    return bug(format!("no slot for local '{name}'"));
                };
                let llty = llvm_type(&ty);
                let reg = self.fresh();
                writeln!(self.output, "  {reg} = load {llty}, ptr {slot}")?;
                Ok((reg, ty))
            }
            Expr::Unary { op, operand, .. } => {
                let (val, ty) = self.gen_expr(operand, frame)?;
                let reg = self.fresh();
                match op {
                    UnOp::Neg => {
                        writeln!(
                            self.output,
                            "  {reg} = call ptr @opal_numeric_neg(ptr {val})"
                        )?;
                        Ok((reg, ty))
                    }
                    UnOp::Not => {
                        writeln!(self.output, "  {reg} = xor i1 {val}, true")?;
                        Ok((reg, Type::Boolean))
                    }
                }
            }
            Expr::Binary { op, lhs, rhs, .. } => {
                let (left, left_ty) = self.gen_expr(lhs, frame)?;
                let (right, _) = self.gen_expr(rhs, frame)?;
                self.gen_binary(*op, left, right, &left_ty)
            }
            Expr::Call { name, args, .. } => self.gen_call(name, args, frame),
        }
    }

    fn gen_binary(
        &mut self,
        op: BinOp,
        left: String,
        right: String,
        operand_ty: &Type,
    ) -> Result<(String, Type), CodeGenError> {
        match operand_ty {
            Type::Numeric => match op {
                BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div => {
                    let callee = match op {
                        BinOp::Add => "opal_numeric_add",
                        BinOp::Sub => "opal_numeric_sub",
                        BinOp::Mul => "opal_numeric_mul",
                        _ => "opal_numeric_div",
                    };
                    let reg = self.fresh();
                    writeln!(
                        self.output,
                        "  {reg} = call ptr @{callee}(ptr {left}, ptr {right})"
                    )?;
                    Ok((reg, Type::Numeric))
                }
                _ => {
                    let ordered = self.fresh();
                    writeln!(
                        self.output,
                        "  {ordered} = call i64 @opal_numeric_compare(ptr {left}, ptr {right})"
                    )?;
                    let reg = self.fresh();
                    writeln!(
                        self.output,
                        "  {reg} = icmp {} i64 {ordered}, 0",
                        compare_predicate(op)
                    )?;
                    Ok((reg, Type::Boolean))
                }
            },
            Type::String => match op {
                BinOp::Add => {
                    let reg = self.fresh();
                    writeln!(
                        self.output,
                        "  {reg} = call ptr @opal_string_concat(ptr {left}, ptr {right})"
                    )?;
                    Ok((reg, Type::String))
                }
                BinOp::Eq | BinOp::Neq => {
                    let raw = self.fresh();
                    writeln!(
                        self.output,
                        "  {raw} = call i64 @opal_string_equals(ptr {left}, ptr {right})"
                    )?;
                    let reg = self.fresh();
                    let predicate = if op == BinOp::Eq { "ne" } else { "eq" };
                    writeln!(self.output, "  {reg} = icmp {predicate} i64 {raw}, 0")?;
                    Ok((reg, Type::Boolean))
                }
                _ => {
                    let ordered = self.fresh();
                    writeln!(
                        self.output,
                        "  {ordered} = call i64 @opal_string_compare(ptr {left}, ptr {right})"
                    )?;
                    let reg = self.fresh();
                    writeln!(
                        self.output,
                        "  {reg} = icmp {} i64 {ordered}, 0",
                        compare_predicate(op)
                    )?;
                    Ok((reg, Type::Boolean))
                }
            },
            Type::Boolean => {
                let reg = self.fresh();
                match op {
                    BinOp::Eq => writeln!(self.output, "  {reg} = icmp eq i1 {left}, {right}")?,
                    BinOp::Neq => writeln!(self.output, "  {reg} = icmp ne i1 {left}, {right}")?,
                    BinOp::And => writeln!(self.output, "  {reg} = and i1 {left}, {right}")?,
                    BinOp::Or => writeln!(self.output, "  {reg} = or i1 {left}, {right}")?,
                    other => return bug(format!("boolean operator '{other}' survived analysis")),
                }
                Ok((reg, Type::Boolean))
            }
            other => bug(format!("operator on {other} survived analysis")),
        }
    }

    fn gen_call(
        &mut self,
        name: &str,
        args: &[Expr],
        frame: &Frame,
    ) -> Result<(String, Type), CodeGenError> {
        if let Some(result) = self.gen_builtin(name, args, frame)? {
            return Ok(result);
        }

        let Some(sig) = frame.env.sigs.get(name) else {
            return bug(format!("call to unknown function '{name}'"));
        };
        let params = sig.params.clone();
        let Some(ret) = sig.ret.clone() else {
            return bug(format!("void call to '{name}' in value position"));
        };

        let lowered = self.gen_args(args, &params, frame)?;
        let reg = self.fresh();
        writeln!(
            self.output,
            "  {reg} = call {} @opal_fn_{name}({})",
            llvm_type(&ret),
            lowered.join(", ")
        )?;
        Ok((reg, ret))
    }

    /// Lower call arguments, coercing each to its parameter type, and
    /// render them as `ty value` strings.
    fn gen_args(
        &mut self,
        args: &[Expr],
        params: &[Type],
        frame: &Frame,
    ) -> Result<Vec<String>, CodeGenError> {
        let mut lowered = Vec::with_capacity(args.len());
        for (arg, param) in args.iter().zip(params) {
            let (val, actual) = self.gen_expr(arg, frame)?;
            let val = self.coerce(val, &actual, param)?;
            lowered.push(format!("{} {val}", llvm_type(param)));
        }
        Ok(lowered)
    }

    /// Builtin lowering. Returns `None` for names that are not builtins.
    fn gen_builtin(
        &mut self,
        name: &str,
        args: &[Expr],
        frame: &Frame,
    ) -> Result<Option<(String, Type)>, CodeGenError> {
        macro_rules! eval {
            ($index:expr) => {
                self.gen_expr(&args[$index], frame)?.0
            };
        }

        let result = match name {
            "length" => {
                let s = eval!(0);
                let raw = self.call_i64(&format!("@opal_string_length(ptr {s})"))?;
                (self.wrap_numeric(&raw)?, Type::Numeric)
            }
            "substring" => {
                let s = eval!(0);
                let start = eval!(1);
                let len = eval!(2);
                let start_i = self.call_i64(&format!("@opal_numeric_as_i64(ptr {start})"))?;
                let len_i = self.call_i64(&format!("@opal_numeric_as_i64(ptr {len})"))?;
                let sub = self.fresh();
                writeln!(
                    self.output,
                    "  {sub} = call ptr @opal_string_substring(ptr {s}, i64 {start_i}, i64 {len_i})"
                )?;
                // A start past the end comes back null; surface semantics
                // give the empty string instead.
                let is_null = self.fresh();
                writeln!(self.output, "  {is_null} = icmp eq ptr {sub}, null")?;
                let empty_lit = self.literal(b"");
                let empty = self.fresh();
                writeln!(
                    self.output,
                    "  {empty} = call ptr @opal_string_create(ptr {empty_lit})"
                )?;
                let reg = self.fresh();
                writeln!(
                    self.output,
                    "  {reg} = select i1 {is_null}, ptr {empty}, ptr {sub}"
                )?;
                (reg, Type::String)
            }
            "index_of" => {
                let s = eval!(0);
                let needle = eval!(1);
                let raw = self.call_i64(&format!("@opal_string_find(ptr {s}, ptr {needle})"))?;
                (self.wrap_numeric(&raw)?, Type::Numeric)
            }
            "starts_with" | "ends_with" => {
                let s = eval!(0);
                let affix = eval!(1);
                let callee = if name == "starts_with" {
                    "opal_string_starts_with"
                } else {
                    "opal_string_ends_with"
                };
                let raw = self.call_i64(&format!("@{callee}(ptr {s}, ptr {affix})"))?;
                (self.truthy(&raw)?, Type::Boolean)
            }
            "to_string" => {
                let n = eval!(0);
                let reg = self.fresh();
                writeln!(
                    self.output,
                    "  {reg} = call ptr @opal_numeric_to_string(ptr {n})"
                )?;
                (reg, Type::String)
            }
            "to_numeric" => {
                let s = eval!(0);
                let reg = self.fresh();
                writeln!(self.output, "  {reg} = call ptr @opal_numeric_parse(ptr {s})")?;
                (reg, Type::Numeric)
            }
            "min" | "max" => {
                let a = eval!(0);
                let b = eval!(1);
                let callee = if name == "min" {
                    "opal_numeric_min"
                } else {
                    "opal_numeric_max"
                };
                let reg = self.fresh();
                writeln!(
                    self.output,
                    "  {reg} = call ptr @{callee}(ptr {a}, ptr {b})"
                )?;
                (reg, Type::Numeric)
            }
            "abs" => {
                let n = eval!(0);
                let reg = self.fresh();
                writeln!(self.output, "  {reg} = call ptr @opal_numeric_abs(ptr {n})")?;
                (reg, Type::Numeric)
            }
            "read_file" => {
                let path = eval!(0);
                let reg = self.fresh();
                writeln!(
                    self.output,
                    "  {reg} = call ptr @opal_read_file_string(ptr {path})"
                )?;
                (reg, Type::Optional(Box::new(Type::String)))
            }
            "write_file" | "append_file" => {
                let path = eval!(0);
                let content = eval!(1);
                let callee = if name == "write_file" {
                    "opal_write_file_string"
                } else {
                    "opal_append_file_string"
                };
                let raw = self.call_i64(&format!("@{callee}(ptr {path}, ptr {content})"))?;
                (self.truthy(&raw)?, Type::Boolean)
            }
            "file_exists" => {
                let path = eval!(0);
                let raw = self.call_i64(&format!("@opal_file_exists_string(ptr {path})"))?;
                (self.truthy(&raw)?, Type::Boolean)
            }
            "file_size" => {
                let path = eval!(0);
                let raw = self.call_i64(&format!("@opal_file_size_string(ptr {path})"))?;
                (self.wrap_numeric(&raw)?, Type::Numeric)
            }
            "read_line" => {
                let reg = self.fresh();
                writeln!(self.output, "  {reg} = call ptr @opal_read_line()")?;
                (reg, Type::String)
            }
            "state_init" | "state_close" | "state_clear" | "state_save" | "state_load" => {
                let raw = self.call_i64(&format!("@opal_{name}()"))?;
                (self.truthy(&raw)?, Type::Boolean)
            }
            "state_set" | "state_config_set" => {
                let key = eval!(0);
                let value = eval!(1);
                let raw = self.call_i64(&format!("@opal_{name}_str(ptr {key}, ptr {value})"))?;
                (self.truthy(&raw)?, Type::Boolean)
            }
            "state_get" => {
                let key = eval!(0);
                let reg = self.fresh();
                writeln!(
                    self.output,
                    "  {reg} = call ptr @opal_state_get_str(ptr {key})"
                )?;
                (reg, Type::String)
            }
            "state_has" | "state_delete" => {
                let key = eval!(0);
                let raw = self.call_i64(&format!("@opal_{name}_str(ptr {key})"))?;
                (self.truthy(&raw)?, Type::Boolean)
            }
            "has_value" => {
                let optional = eval!(0);
                let raw = self.call_i64(&format!("@opal_optional_has_value(ptr {optional})"))?;
                (self.truthy(&raw)?, Type::Boolean)
            }
            "value_of" => {
                let inner = self.optional_inner(&args[0], frame)?;
                let optional = eval!(0);
                (self.extract_optional(&optional, &inner)?, inner)
            }
            "value_or" => {
                let inner = self.optional_inner(&args[0], frame)?;
                let optional = eval!(0);
                let (default, default_ty) = self.gen_expr(&args[1], frame)?;
                let default = self.coerce(default, &default_ty, &inner)?;

                let raw = self.call_i64(&format!("@opal_optional_has_value(ptr {optional})"))?;
                let cond = self.truthy(&raw)?;
                let suffix = self.next_label();
                let some_label = format!("or.some.{suffix}");
                let none_label = format!("or.none.{suffix}");
                let end_label = format!("or.end.{suffix}");
                writeln!(
                    self.output,
                    "  br i1 {cond}, label %{some_label}, label %{none_label}"
                )?;
                writeln!(self.output, "{some_label}:")?;
                let extracted = self.extract_optional(&optional, &inner)?;
                writeln!(self.output, "  br label %{end_label}")?;
                writeln!(self.output, "{none_label}:")?;
                writeln!(self.output, "  br label %{end_label}")?;
                writeln!(self.output, "{end_label}:")?;
                let reg = self.fresh();
                writeln!(
                    self.output,
                    "  {reg} = phi {} [ {extracted}, %{some_label} ], [ {default}, %{none_label} ]",
                    llvm_type(&inner)
                )?;
                (reg, inner)
            }
            _ => return Ok(None),
        };
        Ok(Some(result))
    }

    /// The wrapped type of an optional-typed argument.
    fn optional_inner(&self, arg: &Expr, frame: &Frame) -> Result<Type, CodeGenError> {
        match expr_type(arg, &frame.env) {
            Ok(Type::Optional(inner)) => Ok(*inner),
            Ok(other) => bug(format!("optional access on {other} survived analysis")),
            Err(e) => bug(format!("untyped expression: {e}")),
        }
    }

    /// Extract the wrapped value out of an optional handle by type.
    fn extract_optional(&mut self, optional: &str, inner: &Type) -> Result<String, CodeGenError> {
        match inner {
            Type::Numeric => {
                let reg = self.fresh();
                writeln!(
                    self.output,
                    "  {reg} = call ptr @opal_optional_get_numeric(ptr {optional})"
                )?;
                Ok(reg)
            }
            Type::String => {
                let reg = self.fresh();
                writeln!(
                    self.output,
                    "  {reg} = call ptr @opal_optional_get_string(ptr {optional})"
                )?;
                Ok(reg)
            }
            Type::Boolean => {
                let raw = self.call_i64(&format!("@opal_optional_get_bool(ptr {optional})"))?;
                self.truthy(&raw)
            }
            other => bug(format!("optional of {other} survived analysis")),
        }
    }

    /// Store-compatibility coercion: wrap a scalar into its optional
    /// when the destination asks for one.
    fn coerce(
        &mut self,
        val: String,
        actual: &Type,
        declared: &Type,
    ) -> Result<String, CodeGenError> {
        if actual == declared || *actual == Type::None {
            return Ok(val);
        }
        let Type::Optional(inner) = declared else {
            return bug(format!("cannot lower {actual} into {declared}"));
        };
        match inner.as_ref() {
            Type::Numeric => {
                let reg = self.fresh();
                writeln!(
                    self.output,
                    "  {reg} = call ptr @opal_optional_some_numeric(ptr {val})"
                )?;
                Ok(reg)
            }
            Type::String => {
                let reg = self.fresh();
                writeln!(
                    self.output,
                    "  {reg} = call ptr @opal_optional_some_string(ptr {val})"
                )?;
                Ok(reg)
            }
            Type::Boolean => {
                let wide = self.fresh();
                writeln!(self.output, "  {wide} = zext i1 {val} to i64")?;
                let reg = self.fresh();
                writeln!(
                    self.output,
                    "  {reg} = call ptr @opal_optional_some_bool(i64 {wide})"
                )?;
                Ok(reg)
            }
            other => bug(format!("optional of {other} survived analysis")),
        }
    }

    // ------------------------------------------------------------------
    // Emission helpers
    // ------------------------------------------------------------------

    fn call_i64(&mut self, callee_and_args: &str) -> Result<String, CodeGenError> {
        let reg = self.fresh();
        writeln!(self.output, "  {reg} = call i64 {callee_and_args}")?;
        Ok(reg)
    }

    /// i64 → tagged numeric handle.
    fn wrap_numeric(&mut self, raw: &str) -> Result<String, CodeGenError> {
        let reg = self.fresh();
        writeln!(
            self.output,
            "  {reg} = call ptr @opal_numeric_from_i64(i64 {raw})"
        )?;
        Ok(reg)
    }

    /// i64 1/0 → i1.
    fn truthy(&mut self, raw: &str) -> Result<String, CodeGenError> {
        let reg = self.fresh();
        writeln!(self.output, "  {reg} = icmp ne i64 {raw}, 0")?;
        Ok(reg)
    }

    fn fresh(&mut self) -> String {
        let reg = format!("%t{}", self.temp);
        self.temp += 1;
        reg
    }

    fn fresh_slot(&mut self, name: &str) -> String {
        let slot = format!("%{name}.addr.{}", self.slot);
        self.slot += 1;
        slot
    }

    fn next_label(&mut self) -> usize {
        self.label += 1;
        self.label
    }

    /// Intern a literal and return its global's name.
    fn literal(&mut self, bytes: &[u8]) -> String {
        let index = match self.literals.iter().position(|l| l == bytes) {
            Some(index) => index,
            None => {
                self.literals.push(bytes.to_vec());
                self.literals.len() - 1
            }
        };
        format!("@.lit.{index}")
    }
}

fn llvm_type(ty: &Type) -> &'static str {
    match ty {
        Type::Boolean => "i1",
        _ => "ptr",
    }
}

fn compare_predicate(op: BinOp) -> &'static str {
    match op {
        BinOp::Eq => "eq",
        BinOp::Neq => "ne",
        BinOp::Lt => "slt",
        BinOp::Lte => "sle",
        BinOp::Gt => "sgt",
        BinOp::Gte => "sge",
        // Callers only hand over comparison operators.
        _ => "eq",
    }
}

/// Encode literal bytes for a `c"..."` constant, with a trailing nul.
fn encode_literal(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() + 3);
    for &b in bytes.iter().chain(std::iter::once(&0u8)) {
        match b {
            0x20..=0x7e if b != b'"' && b != b'\\' => out.push(b as char),
            _ => {
                out.push_str(&format!("\\{b:02X}"));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use crate::semantic::analyze;

    fn compile(source: &str) -> String {
        let program = Parser::new(source).unwrap().parse().unwrap();
        analyze(&program).unwrap();
        CodeGen::new(default_target_triple(), false)
            .generate(&program)
            .unwrap()
    }

    #[test]
    fn test_hello_world() {
        let ir = compile(
            r#"
            function main()
              print "Hello, World!"
            end
            "#,
        );
        assert!(ir.contains("define i32 @main()"));
        assert!(ir.contains("call ptr @opal_string_create"));
        assert!(ir.contains("call void @opal_print_string"));
        assert!(ir.contains("ret i32 0"));
        assert!(ir.contains("c\"Hello, World!\\00\""));
    }

    #[test]
    fn test_numeric_literals_keep_text() {
        let ir = compile(
            r#"
            function main()
              numeric wide = 99999999999999999999
              print wide
            end
            "#,
        );
        // The runtime infers the storage kind from the literal text.
        assert!(ir.contains("c\"99999999999999999999\\00\""));
        assert!(ir.contains("call ptr @opal_numeric_from_literal"));
    }

    #[test]
    fn test_arithmetic_and_comparison() {
        let ir = compile(
            r#"
            function main()
              numeric a = 6
              numeric b = 7
              print a * b
              print a < b
            end
            "#,
        );
        assert!(ir.contains("call ptr @opal_numeric_mul"));
        assert!(ir.contains("call i64 @opal_numeric_compare"));
        assert!(ir.contains("icmp slt i64"));
    }

    #[test]
    fn test_recursion_and_branches() {
        let ir = compile(
            r#"
            function factorial(numeric n) as numeric
              if n <= 1 then
                return 1
              end
              return n * factorial(n - 1)
            end

            function main()
              print factorial(10)
            end
            "#,
        );
        assert!(ir.contains("define ptr @opal_fn_factorial(ptr %arg.n)"));
        assert!(ir.contains("call ptr @opal_fn_factorial(ptr"));
        assert!(ir.contains("if.then.1:"));
        assert!(ir.contains("br i1"));
    }

    #[test]
    fn test_while_loop_shape() {
        let ir = compile(
            r#"
            function main()
              numeric i = 0
              while i < 10 do
                i = i + 1
              end
              print i
            end
            "#,
        );
        assert!(ir.contains("while.cond.1:"));
        assert!(ir.contains("while.body.1:"));
        assert!(ir.contains("while.end.1:"));
        assert!(ir.contains("br label %while.cond.1"));
    }

    #[test]
    fn test_sibling_blocks_get_distinct_slots() {
        let ir = compile(
            r#"
            function main()
              if true then
                numeric x = 1
                print x
              end
              if true then
                string x = "fresh"
                print x
              end
            end
            "#,
        );
        assert!(ir.contains("%x.addr.0 = alloca ptr"));
        assert!(ir.contains("%x.addr.1 = alloca ptr"));
    }

    #[test]
    fn test_optional_wrapping_and_access() {
        let ir = compile(
            r#"
            function main()
              numeric? maybe = 42
              if has_value(maybe) then
                print value_of(maybe)
              end
              print value_or(maybe, 0)
            end
            "#,
        );
        assert!(ir.contains("call ptr @opal_optional_some_numeric"));
        assert!(ir.contains("call i64 @opal_optional_has_value"));
        assert!(ir.contains("call ptr @opal_optional_get_numeric"));
        assert!(ir.contains("phi ptr"));
    }

    #[test]
    fn test_state_builtins_lower_to_adapters() {
        let ir = compile(
            r#"
            function main()
              boolean live = state_init()
              boolean stored = state_set("k", "v")
              print state_get("k")
              boolean closed = state_close()
            end
            "#,
        );
        assert!(ir.contains("call i64 @opal_state_init()"));
        assert!(ir.contains("call i64 @opal_state_set_str(ptr"));
        assert!(ir.contains("call ptr @opal_state_get_str(ptr"));
    }

    #[test]
    fn test_string_escape_encoding() {
        let ir = compile(
            r#"
            function main()
              print "tab\there \"quote\""
            end
            "#,
        );
        assert!(ir.contains("c\"tab\\09here \\22quote\\22\\00\""));
    }

    #[test]
    fn test_every_called_symbol_is_declared() {
        let ir = compile(
            r#"
            function helper(string s) as numeric
              return length(s) + file_size(s)
            end

            function main()
              string line = read_line()
              numeric n = helper(line)
              print min(n, abs(n))
              print substring(line, 0, 3)
              boolean saved = write_file("out.txt", line)
              print saved
            end
            "#,
        );
        for line in ir.lines() {
            let Some(at) = line.find("@opal_") else {
                continue;
            };
            if !line.trim_start().starts_with("declare") && !line.starts_with("define") {
                let symbol: String = line[at + 1..]
                    .chars()
                    .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
                    .collect();
                if symbol.starts_with("opal_fn_") {
                    continue;
                }
                assert!(
                    RUNTIME_DECLARATIONS
                        .iter()
                        .any(|d| d.contains(&format!("@{symbol}("))),
                    "symbol {symbol} is called but never declared"
                );
            }
        }
    }

    #[test]
    fn test_comments_toggle() {
        let source = r#"
            function main()
              numeric x = 1
              print x
            end
        "#;
        let program = Parser::new(source).unwrap().parse().unwrap();
        analyze(&program).unwrap();
        let plain = CodeGen::new("x86_64-unknown-linux-gnu", false)
            .generate(&program)
            .unwrap();
        let commented = CodeGen::new("x86_64-unknown-linux-gnu", true)
            .generate(&program)
            .unwrap();
        assert!(!plain.contains("; line"));
        assert!(commented.contains("; line"));
    }
}
