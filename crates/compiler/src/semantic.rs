//! Semantic analysis
//!
//! Validates a parsed program before code generation: declaration before
//! use, operator and call typing, condition types, and complete return
//! paths for value-returning functions. Locals are block-scoped: a
//! declaration dies with the block that made it, and redeclaring a name
//! that is still visible (shadowing included) is an error.
//!
//! The type rules here are the single source of truth; the code
//! generator re-derives expression types through [`expr_type`] with the
//! same environment shape, so the two phases cannot disagree.

use crate::ast::{BinOp, Expr, Function, Program, Span, Stmt, Type, UnOp};
use std::collections::HashMap;
use std::fmt;

/// A semantic failure with the source position it was detected at.
#[derive(Debug, Clone)]
pub struct SemanticError {
    pub message: String,
    pub span: Span,
}

impl fmt::Display for SemanticError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.span, self.message)
    }
}

impl std::error::Error for SemanticError {}

fn err<T>(message: impl Into<String>, span: Span) -> Result<T, SemanticError> {
    Err(SemanticError {
        message: message.into(),
        span,
    })
}

/// A user function's signature.
#[derive(Debug, Clone)]
pub struct FuncSig {
    pub params: Vec<Type>,
    pub ret: Option<Type>,
}

/// Typing environment shared between analysis and code generation.
pub struct TypeEnv<'a> {
    pub sigs: &'a HashMap<String, FuncSig>,
    pub locals: HashMap<String, Type>,
}

/// `actual` may be stored into a slot declared as `declared`: exact
/// match, a scalar into its optional (implicit wrap), or `none` into any
/// optional.
pub fn assignable(declared: &Type, actual: &Type) -> bool {
    if declared == actual {
        return true;
    }
    match declared {
        Type::Optional(inner) => **inner == *actual || *actual == Type::None,
        _ => false,
    }
}

/// Fixed-signature builtins: `(parameter types, result type)`. The
/// optional accessors (`has_value`, `value_of`, `value_or`) are generic
/// over the wrapped type and are handled directly in [`expr_type`].
pub fn builtin_signature(name: &str) -> Option<(Vec<Type>, Type)> {
    use Type::{Boolean, Numeric, String as Str};
    let optional_string = Type::Optional(Box::new(Str));
    let sig = match name {
        "length" => (vec![Str], Numeric),
        "substring" => (vec![Str, Numeric, Numeric], Str),
        "index_of" => (vec![Str, Str], Numeric),
        "starts_with" | "ends_with" => (vec![Str, Str], Boolean),
        "to_string" => (vec![Numeric], Str),
        "to_numeric" => (vec![Str], Numeric),
        "min" | "max" => (vec![Numeric, Numeric], Numeric),
        "abs" => (vec![Numeric], Numeric),
        "read_file" => (vec![Str], optional_string),
        "write_file" | "append_file" => (vec![Str, Str], Boolean),
        "file_exists" => (vec![Str], Boolean),
        "file_size" => (vec![Str], Numeric),
        "read_line" => (vec![], Str),
        "state_init" | "state_close" | "state_clear" | "state_save" | "state_load" => {
            (vec![], Boolean)
        }
        "state_set" | "state_config_set" => (vec![Str, Str], Boolean),
        "state_get" => (vec![Str], Str),
        "state_has" | "state_delete" => (vec![Str], Boolean),
        _ => return None,
    };
    Some(sig)
}

fn is_builtin(name: &str) -> bool {
    builtin_signature(name).is_some() || matches!(name, "has_value" | "value_of" | "value_or")
}

/// Compute an expression's type, reporting the first violation found.
pub fn expr_type(expr: &Expr, env: &TypeEnv) -> Result<Type, SemanticError> {
    match expr {
        Expr::Number { .. } => Ok(Type::Numeric),
        Expr::Str { .. } => Ok(Type::String),
        Expr::Bool { .. } => Ok(Type::Boolean),
        Expr::None { .. } => Ok(Type::None),
        Expr::Ident { name, span } => match env.locals.get(name) {
            Some(ty) => Ok(ty.clone()),
            None => err(format!("undeclared variable '{name}'"), *span),
        },
        Expr::Unary { op, operand, span } => {
            let inner = expr_type(operand, env)?;
            match op {
                UnOp::Neg if inner == Type::Numeric => Ok(Type::Numeric),
                UnOp::Neg => err(format!("cannot negate a value of type {inner}"), *span),
                UnOp::Not if inner == Type::Boolean => Ok(Type::Boolean),
                UnOp::Not => err(format!("'not' needs a boolean, found {inner}"), *span),
            }
        }
        Expr::Binary { op, lhs, rhs, span } => {
            let left = expr_type(lhs, env)?;
            let right = expr_type(rhs, env)?;
            binary_type(*op, &left, &right, *span)
        }
        Expr::Call { name, args, span } => call_type(name, args, *span, env),
    }
}

fn binary_type(op: BinOp, left: &Type, right: &Type, span: Span) -> Result<Type, SemanticError> {
    use Type::{Boolean, Numeric, String as Str};
    let mismatch = || {
        err(
            format!("operator '{op}' cannot combine {left} and {right}"),
            span,
        )
    };
    match op {
        BinOp::Add => match (left, right) {
            (Numeric, Numeric) => Ok(Numeric),
            (Str, Str) => Ok(Str),
            _ => mismatch(),
        },
        BinOp::Sub | BinOp::Mul | BinOp::Div => match (left, right) {
            (Numeric, Numeric) => Ok(Numeric),
            _ => mismatch(),
        },
        BinOp::Eq | BinOp::Neq => match (left, right) {
            (Numeric, Numeric) | (Str, Str) | (Boolean, Boolean) => Ok(Boolean),
            _ => mismatch(),
        },
        BinOp::Lt | BinOp::Lte | BinOp::Gt | BinOp::Gte => match (left, right) {
            (Numeric, Numeric) | (Str, Str) => Ok(Boolean),
            _ => mismatch(),
        },
        BinOp::And | BinOp::Or => match (left, right) {
            (Boolean, Boolean) => Ok(Boolean),
            _ => mismatch(),
        },
    }
}

fn call_type(
    name: &str,
    args: &[Expr],
    span: Span,
    env: &TypeEnv,
) -> Result<Type, SemanticError> {
    // The generic optional accessors first.
    match name {
        "has_value" | "value_of" => {
            if args.len() != 1 {
                return err(format!("{name} takes one argument"), span);
            }
            let arg = expr_type(&args[0], env)?;
            let Type::Optional(inner) = arg else {
                return err(format!("{name} needs an optional value, found {arg}"), span);
            };
            return Ok(if name == "has_value" {
                Type::Boolean
            } else {
                *inner
            });
        }
        "value_or" => {
            if args.len() != 2 {
                return err("value_or takes two arguments", span);
            }
            let arg = expr_type(&args[0], env)?;
            let default = expr_type(&args[1], env)?;
            let Type::Optional(inner) = arg else {
                return err(format!("value_or needs an optional value, found {arg}"), span);
            };
            if *inner != default {
                return err(
                    format!("value_or default must be {inner}, found {default}"),
                    span,
                );
            }
            return Ok(*inner);
        }
        _ => {}
    }

    if let Some((params, ret)) = builtin_signature(name) {
        check_args(name, &params, args, span, env)?;
        return Ok(ret);
    }

    match env.sigs.get(name) {
        None => err(format!("call to undefined function '{name}'"), span),
        Some(sig) => {
            check_args(name, &sig.params, args, span, env)?;
            match &sig.ret {
                Some(ret) => Ok(ret.clone()),
                None => err(
                    format!("function '{name}' returns no value"),
                    span,
                ),
            }
        }
    }
}

fn check_args(
    name: &str,
    params: &[Type],
    args: &[Expr],
    span: Span,
    env: &TypeEnv,
) -> Result<(), SemanticError> {
    if params.len() != args.len() {
        return err(
            format!(
                "'{name}' takes {} argument{}, found {}",
                params.len(),
                if params.len() == 1 { "" } else { "s" },
                args.len()
            ),
            span,
        );
    }
    for (param, arg) in params.iter().zip(args) {
        let actual = expr_type(arg, env)?;
        if !assignable(param, &actual) {
            return err(
                format!("'{name}' expects {param}, found {actual}"),
                arg.span(),
            );
        }
    }
    Ok(())
}

/// Collect every function signature, rejecting duplicates and builtin
/// shadowing.
pub fn collect_signatures(program: &Program) -> Result<HashMap<String, FuncSig>, SemanticError> {
    let mut sigs = HashMap::new();
    for function in &program.functions {
        if is_builtin(&function.name) {
            return err(
                format!("function '{}' shadows a builtin", function.name),
                function.span,
            );
        }
        let sig = FuncSig {
            params: function.params.iter().map(|p| p.ty.clone()).collect(),
            ret: function.ret.clone(),
        };
        if sigs.insert(function.name.clone(), sig).is_some() {
            return err(
                format!("function '{}' defined twice", function.name),
                function.span,
            );
        }
    }
    Ok(sigs)
}

/// Validate the whole program.
pub fn analyze(program: &Program) -> Result<(), SemanticError> {
    let sigs = collect_signatures(program)?;

    let Some(main) = program.find_function("main") else {
        return err(
            "no 'main' function defined",
            Span { line: 1, column: 1 },
        );
    };
    if !main.params.is_empty() {
        return err("'main' takes no parameters", main.span);
    }
    if main.ret.is_some() {
        return err("'main' returns no value", main.span);
    }

    for function in &program.functions {
        check_function(function, &sigs)?;
    }
    Ok(())
}

fn check_function(
    function: &Function,
    sigs: &HashMap<String, FuncSig>,
) -> Result<(), SemanticError> {
    let mut env = TypeEnv {
        sigs,
        locals: HashMap::new(),
    };
    for param in &function.params {
        if param.ty == Type::None {
            return err("'none' is not a parameter type", param.span);
        }
        if env
            .locals
            .insert(param.name.clone(), param.ty.clone())
            .is_some()
        {
            return err(
                format!("duplicate parameter '{}'", param.name),
                param.span,
            );
        }
    }

    check_block(&function.body, function, &mut env)?;

    if function.ret.is_some() && !block_returns(&function.body) {
        return err(
            format!(
                "function '{}' does not return a value on every path",
                function.name
            ),
            function.span,
        );
    }
    Ok(())
}

fn check_block(
    block: &[Stmt],
    function: &Function,
    env: &mut TypeEnv,
) -> Result<(), SemanticError> {
    let mut declared_here = Vec::new();
    for stmt in block {
        check_stmt(stmt, function, env, &mut declared_here)?;
    }
    // Block scope: the block's declarations die with it.
    for name in declared_here {
        env.locals.remove(&name);
    }
    Ok(())
}

fn check_stmt(
    stmt: &Stmt,
    function: &Function,
    env: &mut TypeEnv,
    declared_here: &mut Vec<String>,
) -> Result<(), SemanticError> {
    match stmt {
        Stmt::Declare {
            ty,
            name,
            value,
            span,
        } => {
            let actual = expr_type(value, env)?;
            if !assignable(ty, &actual) {
                return err(
                    format!("cannot initialize {ty} '{name}' with {actual}"),
                    value.span(),
                );
            }
            if env.locals.insert(name.clone(), ty.clone()).is_some() {
                return err(format!("'{name}' is already declared"), *span);
            }
            declared_here.push(name.clone());
            Ok(())
        }
        Stmt::Assign { name, value, span } => {
            let Some(declared) = env.locals.get(name).cloned() else {
                return err(format!("assignment to undeclared variable '{name}'"), *span);
            };
            let actual = expr_type(value, env)?;
            if !assignable(&declared, &actual) {
                return err(
                    format!("cannot assign {actual} to {declared} '{name}'"),
                    value.span(),
                );
            }
            Ok(())
        }
        Stmt::If {
            cond,
            then_body,
            else_body,
            ..
        } => {
            let cond_ty = expr_type(cond, env)?;
            if cond_ty != Type::Boolean {
                return err(
                    format!("'if' condition must be boolean, found {cond_ty}"),
                    cond.span(),
                );
            }
            check_block(then_body, function, env)?;
            check_block(else_body, function, env)
        }
        Stmt::While { cond, body, .. } => {
            let cond_ty = expr_type(cond, env)?;
            if cond_ty != Type::Boolean {
                return err(
                    format!("'while' condition must be boolean, found {cond_ty}"),
                    cond.span(),
                );
            }
            check_block(body, function, env)
        }
        Stmt::Return { value, span } => match (&function.ret, value) {
            (None, None) => Ok(()),
            (None, Some(value)) => err(
                format!("function '{}' returns no value", function.name),
                value.span(),
            ),
            (Some(ret), None) => err(
                format!("function '{}' must return {ret}", function.name),
                *span,
            ),
            (Some(ret), Some(value)) => {
                let actual = expr_type(value, env)?;
                if !assignable(ret, &actual) {
                    return err(
                        format!("function '{}' must return {ret}, found {actual}", function.name),
                        value.span(),
                    );
                }
                Ok(())
            }
        },
        Stmt::Print { value, .. } => {
            let ty = expr_type(value, env)?;
            match ty {
                Type::Numeric | Type::String | Type::Boolean => Ok(()),
                other => err(
                    format!("'print' cannot format a value of type {other}"),
                    value.span(),
                ),
            }
        }
        Stmt::Expr { value, span: _ } => {
            // A call to a void function is the one expression allowed to
            // produce nothing at statement level.
            if let Expr::Call { name, args, span } = value
                && !is_builtin(name)
                && let Some(sig) = env.sigs.get(name)
                && sig.ret.is_none()
            {
                let params = sig.params.clone();
                return check_args(name, &params, args, *span, env);
            }
            expr_type(value, env).map(|_| ())
        }
    }
}

/// True when every path through the block ends in a `return`.
fn block_returns(block: &[Stmt]) -> bool {
    block.iter().any(|stmt| match stmt {
        Stmt::Return { .. } => true,
        Stmt::If {
            then_body,
            else_body,
            ..
        } => !else_body.is_empty() && block_returns(then_body) && block_returns(else_body),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn analyze_source(source: &str) -> Result<(), SemanticError> {
        let program = Parser::new(source).unwrap().parse().unwrap();
        analyze(&program)
    }

    fn expect_error(source: &str, needle: &str) {
        let error = analyze_source(source).expect_err("expected a semantic error");
        assert!(
            error.message.contains(needle),
            "error '{}' does not mention '{needle}'",
            error.message
        );
    }

    #[test]
    fn test_valid_program() {
        analyze_source(
            r#"
            function factorial(numeric n) as numeric
              if n <= 1 then
                return 1
              else
                return n * factorial(n - 1)
              end
            end

            function main()
              numeric x = factorial(5)
              print x
            end
            "#,
        )
        .unwrap();
    }

    #[test]
    fn test_missing_main() {
        expect_error("function helper() end", "no 'main' function");
    }

    #[test]
    fn test_main_shape() {
        expect_error("function main(numeric x) end", "takes no parameters");
        expect_error(
            "function main() as numeric return 1 end",
            "returns no value",
        );
    }

    #[test]
    fn test_undeclared_variable() {
        expect_error("function main() print x end", "undeclared variable 'x'");
        expect_error("function main() x = 1 end", "undeclared variable");
    }

    #[test]
    fn test_duplicate_declaration() {
        expect_error(
            "function main() numeric x = 1 numeric x = 2 end",
            "already declared",
        );
        // Shadowing an outer local inside a block is also rejected.
        expect_error(
            r#"
            function main()
              numeric x = 1
              if true then
                numeric x = 2
              end
            end
            "#,
            "already declared",
        );
    }

    #[test]
    fn test_block_scope_ends_with_block() {
        expect_error(
            r#"
            function main()
              if true then
                numeric x = 1
              end
              print x
            end
            "#,
            "undeclared variable 'x'",
        );
        // A sibling block may reuse the name once the first is closed.
        analyze_source(
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
        )
        .unwrap();
    }

    #[test]
    fn test_type_mismatches() {
        expect_error(
            "function main() numeric x = \"text\" end",
            "cannot initialize numeric",
        );
        expect_error(
            "function main() boolean b = 1 + true end",
            "cannot combine",
        );
        expect_error(
            "function main() if 1 then print 1 end end",
            "condition must be boolean",
        );
        expect_error(
            "function main() string s = \"a\" s = 5 end",
            "cannot assign numeric to string",
        );
    }

    #[test]
    fn test_string_concat_and_compare() {
        analyze_source(
            r#"
            function main()
              string s = "a" + "b"
              boolean flag = s < "c"
              print flag
            end
            "#,
        )
        .unwrap();
    }

    #[test]
    fn test_return_paths() {
        expect_error(
            r#"
            function f(numeric n) as numeric
              if n > 0 then
                return 1
              end
            end
            function main() print f(1) end
            "#,
            "every path",
        );
    }

    #[test]
    fn test_call_checking() {
        expect_error(
            "function main() print missing(1) end",
            "undefined function",
        );
        expect_error(
            r#"
            function f(numeric a, numeric b) as numeric return a end
            function main() print f(1) end
            "#,
            "takes 2 arguments",
        );
        expect_error(
            r#"
            function f(string s) as numeric return 1 end
            function main() print f(5) end
            "#,
            "expects string",
        );
    }

    #[test]
    fn test_optionals() {
        analyze_source(
            r#"
            function pick(boolean flag) as numeric?
              if flag then
                return 42
              end
              return none
            end

            function main()
              numeric? maybe = pick(true)
              if has_value(maybe) then
                print value_of(maybe)
              end
              print value_or(maybe, 0)
            end
            "#,
        )
        .unwrap();
    }

    #[test]
    fn test_optional_misuse() {
        expect_error(
            "function main() numeric? o = none print o end",
            "'print' cannot format",
        );
        expect_error(
            "function main() print has_value(5) end",
            "needs an optional",
        );
        expect_error(
            "function main() numeric? o = none print value_or(o, \"s\") end",
            "default must be numeric",
        );
        expect_error(
            "function main() numeric n = none end",
            "cannot initialize numeric",
        );
    }

    #[test]
    fn test_builtin_shadowing() {
        expect_error(
            "function length(string s) as numeric return 1 end function main() end",
            "shadows a builtin",
        );
    }

    #[test]
    fn test_state_builtins() {
        analyze_source(
            r#"
            function main()
              boolean live = state_init()
              boolean saved = state_set("k", "v")
              string v = state_get("k")
              print v
              boolean closed = state_close()
            end
            "#,
        )
        .unwrap();
    }

    #[test]
    fn test_void_function_statement() {
        analyze_source(
            r#"
            function log_line(string s)
              print s
            end
            function main()
              log_line("hello")
            end
            "#,
        )
        .unwrap();
        expect_error(
            r#"
            function log_line(string s)
              print s
            end
            function main()
              string s = log_line("x")
            end
            "#,
            "returns no value",
        );
    }
}
