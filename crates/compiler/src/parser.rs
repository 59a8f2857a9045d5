//! Recursive-descent parser for Opal syntax
//!
//! Syntax:
//! ```text
//! function factorial(numeric n) as numeric
//!   if n <= 1 then
//!     return 1
//!   end
//!   return n * factorial(n - 1)
//! end
//! ```
//!
//! Newlines are not significant; `#` starts a comment running to the end
//! of the line. The grammar is statement-oriented with the usual
//! expression precedence (or < and < equality < relational < additive <
//! multiplicative < unary).

use crate::ast::{BinOp, Expr, Function, Param, Program, Span, Stmt, Type, UnOp};
use std::fmt;

/// A parse failure with the source position it was detected at.
#[derive(Debug, Clone)]
pub struct ParseError {
    pub message: String,
    pub span: Span,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.span, self.message)
    }
}

impl std::error::Error for ParseError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Ident,
    Number,
    Str,
    Symbol,
}

/// A token with source position information.
#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    text: String,
    span: Span,
}

const KEYWORDS: &[&str] = &[
    "function", "as", "end", "if", "then", "else", "while", "do", "return", "print", "numeric",
    "string", "boolean", "true", "false", "none", "and", "or", "not",
];

fn is_keyword(text: &str) -> bool {
    KEYWORDS.contains(&text)
}

fn tokenize(source: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let bytes = source.as_bytes();
    let mut pos = 0;
    let mut line = 1;
    let mut column = 1;

    macro_rules! here {
        () => {
            Span { line, column }
        };
    }

    while pos < bytes.len() {
        let b = bytes[pos];
        match b {
            b'\n' => {
                pos += 1;
                line += 1;
                column = 1;
            }
            b' ' | b'\t' | b'\r' => {
                pos += 1;
                column += 1;
            }
            b'#' => {
                while pos < bytes.len() && bytes[pos] != b'\n' {
                    pos += 1;
                }
            }
            b'"' => {
                let span = here!();
                pos += 1;
                column += 1;
                let mut value = String::new();
                loop {
                    match bytes.get(pos) {
                        None | Some(b'\n') => {
                            return Err(ParseError {
                                message: "unclosed string literal".to_string(),
                                span,
                            });
                        }
                        Some(b'"') => {
                            pos += 1;
                            column += 1;
                            break;
                        }
                        Some(b'\\') => {
                            let escape = bytes.get(pos + 1);
                            let replacement = match escape {
                                Some(b'n') => '\n',
                                Some(b't') => '\t',
                                Some(b'"') => '"',
                                Some(b'\\') => '\\',
                                _ => {
                                    return Err(ParseError {
                                        message: format!(
                                            "unknown escape '\\{}'",
                                            escape.map(|&e| e as char).unwrap_or(' ')
                                        ),
                                        span: here!(),
                                    });
                                }
                            };
                            value.push(replacement);
                            pos += 2;
                            column += 2;
                        }
                        Some(&other) => {
                            value.push(other as char);
                            pos += 1;
                            column += 1;
                        }
                    }
                }
                tokens.push(Token {
                    kind: TokenKind::Str,
                    text: value,
                    span,
                });
            }
            b'0'..=b'9' => {
                let span = here!();
                let start = pos;
                let mut seen_dot = false;
                while pos < bytes.len()
                    && (bytes[pos].is_ascii_digit() || (bytes[pos] == b'.' && !seen_dot))
                {
                    if bytes[pos] == b'.' {
                        // A dot only continues the number when a digit follows.
                        if !bytes.get(pos + 1).is_some_and(|d| d.is_ascii_digit()) {
                            break;
                        }
                        seen_dot = true;
                    }
                    pos += 1;
                    column += 1;
                }
                tokens.push(Token {
                    kind: TokenKind::Number,
                    text: source[start..pos].to_string(),
                    span,
                });
            }
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => {
                let span = here!();
                let start = pos;
                while pos < bytes.len()
                    && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_')
                {
                    pos += 1;
                    column += 1;
                }
                tokens.push(Token {
                    kind: TokenKind::Ident,
                    text: source[start..pos].to_string(),
                    span,
                });
            }
            _ => {
                let span = here!();
                let two: Option<&str> = source.get(pos..pos + 2);
                let symbol = match two {
                    Some(s @ ("==" | "!=" | "<=" | ">=")) => s,
                    _ => match source.get(pos..pos + 1) {
                        Some(s @ ("<" | ">" | "+" | "-" | "*" | "/" | "(" | ")" | "," | "=" | "?")) => s,
                        _ => {
                            return Err(ParseError {
                                message: format!("unexpected character '{}'", b as char),
                                span,
                            });
                        }
                    },
                };
                tokens.push(Token {
                    kind: TokenKind::Symbol,
                    text: symbol.to_string(),
                    span,
                });
                pos += symbol.len();
                column += symbol.len();
            }
        }
    }

    Ok(tokens)
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(source: &str) -> Result<Parser, ParseError> {
        Ok(Parser {
            tokens: tokenize(source)?,
            pos: 0,
        })
    }

    pub fn parse(&mut self) -> Result<Program, ParseError> {
        let mut program = Program {
            functions: Vec::new(),
        };
        while !self.at_end() {
            program.functions.push(self.function()?);
        }
        Ok(program)
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    fn function(&mut self) -> Result<Function, ParseError> {
        let span = self.expect_keyword("function")?;
        let name = self.expect_ident("function name")?;

        self.expect_symbol("(")?;
        let mut params = Vec::new();
        if !self.check_symbol(")") {
            loop {
                let ty = self.type_name()?;
                let param_span = self.peek_span();
                let param_name = self.expect_ident("parameter name")?;
                params.push(Param {
                    name: param_name,
                    ty,
                    span: param_span,
                });
                if !self.eat_symbol(",") {
                    break;
                }
            }
        }
        self.expect_symbol(")")?;

        let ret = if self.eat_keyword("as") {
            Some(self.type_name()?)
        } else {
            None
        };

        let body = self.block(&["end"])?;
        self.expect_keyword("end")?;

        Ok(Function {
            name,
            params,
            ret,
            body,
            span,
        })
    }

    fn type_name(&mut self) -> Result<Type, ParseError> {
        let token = self.advance("type name")?;
        let base = match token.text.as_str() {
            "numeric" => Type::Numeric,
            "string" => Type::String,
            "boolean" => Type::Boolean,
            other => {
                return Err(ParseError {
                    message: format!("expected a type name, found '{other}'"),
                    span: token.span,
                });
            }
        };
        if self.eat_symbol("?") {
            Ok(Type::Optional(Box::new(base)))
        } else {
            Ok(base)
        }
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    /// Parse statements until one of `terminators` (not consumed).
    fn block(&mut self, terminators: &[&str]) -> Result<Vec<Stmt>, ParseError> {
        let mut statements = Vec::new();
        loop {
            if self.at_end() {
                return Err(ParseError {
                    message: format!("expected '{}' before end of input", terminators[0]),
                    span: self.last_span(),
                });
            }
            if terminators.iter().any(|t| self.check_keyword(t)) {
                return Ok(statements);
            }
            statements.push(self.statement()?);
        }
    }

    fn statement(&mut self) -> Result<Stmt, ParseError> {
        let span = self.peek_span();

        if self.check_keyword("numeric")
            || self.check_keyword("string")
            || self.check_keyword("boolean")
        {
            let ty = self.type_name()?;
            let name = self.expect_ident("variable name")?;
            self.expect_symbol("=")?;
            let value = self.expression()?;
            return Ok(Stmt::Declare {
                ty,
                name,
                value,
                span,
            });
        }

        if self.eat_keyword("if") {
            let cond = self.expression()?;
            self.expect_keyword("then")?;
            let then_body = self.block(&["else", "end"])?;
            let else_body = if self.eat_keyword("else") {
                self.block(&["end"])?
            } else {
                Vec::new()
            };
            self.expect_keyword("end")?;
            return Ok(Stmt::If {
                cond,
                then_body,
                else_body,
                span,
            });
        }

        if self.eat_keyword("while") {
            let cond = self.expression()?;
            self.expect_keyword("do")?;
            let body = self.block(&["end"])?;
            self.expect_keyword("end")?;
            return Ok(Stmt::While { cond, body, span });
        }

        if self.eat_keyword("return") {
            let value = if self.return_has_value() {
                Some(self.expression()?)
            } else {
                None
            };
            return Ok(Stmt::Return { value, span });
        }

        if self.eat_keyword("print") {
            let value = self.expression()?;
            return Ok(Stmt::Print { value, span });
        }

        // Assignment or expression statement.
        if self.peek_kind() == Some(TokenKind::Ident)
            && !is_keyword(&self.tokens[self.pos].text)
            && self.peek_symbol_at(1, "=")
        {
            let name = self.expect_ident("variable name")?;
            self.expect_symbol("=")?;
            let value = self.expression()?;
            return Ok(Stmt::Assign { name, value, span });
        }

        let value = self.expression()?;
        Ok(Stmt::Expr { value, span })
    }

    /// A `return` carries a value unless the next token closes the block
    /// or opens another statement.
    fn return_has_value(&self) -> bool {
        match self.tokens.get(self.pos) {
            None => false,
            Some(token) => !matches!(
                token.text.as_str(),
                "end" | "else" | "if" | "while" | "return" | "print" | "numeric" | "string"
                    | "boolean" | "function"
            ),
        }
    }

    // ------------------------------------------------------------------
    // Expressions (precedence climbing)
    // ------------------------------------------------------------------

    fn expression(&mut self) -> Result<Expr, ParseError> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.and_expr()?;
        while self.check_keyword("or") {
            let span = self.peek_span();
            self.advance("operator")?;
            let rhs = self.and_expr()?;
            lhs = Expr::Binary {
                op: BinOp::Or,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            };
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.equality()?;
        while self.check_keyword("and") {
            let span = self.peek_span();
            self.advance("operator")?;
            let rhs = self.equality()?;
            lhs = Expr::Binary {
                op: BinOp::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            };
        }
        Ok(lhs)
    }

    fn equality(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.relational()?;
        loop {
            let op = if self.check_symbol("==") {
                BinOp::Eq
            } else if self.check_symbol("!=") {
                BinOp::Neq
            } else {
                return Ok(lhs);
            };
            let span = self.peek_span();
            self.advance("operator")?;
            let rhs = self.relational()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            };
        }
    }

    fn relational(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.additive()?;
        loop {
            let op = if self.check_symbol("<=") {
                BinOp::Lte
            } else if self.check_symbol(">=") {
                BinOp::Gte
            } else if self.check_symbol("<") {
                BinOp::Lt
            } else if self.check_symbol(">") {
                BinOp::Gt
            } else {
                return Ok(lhs);
            };
            let span = self.peek_span();
            self.advance("operator")?;
            let rhs = self.additive()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            };
        }
    }

    fn additive(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = if self.check_symbol("+") {
                BinOp::Add
            } else if self.check_symbol("-") {
                BinOp::Sub
            } else {
                return Ok(lhs);
            };
            let span = self.peek_span();
            self.advance("operator")?;
            let rhs = self.multiplicative()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            };
        }
    }

    fn multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.unary()?;
        loop {
            let op = if self.check_symbol("*") {
                BinOp::Mul
            } else if self.check_symbol("/") {
                BinOp::Div
            } else {
                return Ok(lhs);
            };
            let span = self.peek_span();
            self.advance("operator")?;
            let rhs = self.unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            };
        }
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        if self.check_symbol("-") {
            let span = self.peek_span();
            self.advance("operator")?;
            let operand = self.unary()?;
            return Ok(Expr::Unary {
                op: UnOp::Neg,
                operand: Box::new(operand),
                span,
            });
        }
        if self.check_keyword("not") {
            let span = self.peek_span();
            self.advance("operator")?;
            let operand = self.unary()?;
            return Ok(Expr::Unary {
                op: UnOp::Not,
                operand: Box::new(operand),
                span,
            });
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let token = self.advance("expression")?.clone();
        match token.kind {
            TokenKind::Number => Ok(Expr::Number {
                text: token.text,
                span: token.span,
            }),
            TokenKind::Str => Ok(Expr::Str {
                value: token.text,
                span: token.span,
            }),
            TokenKind::Ident => match token.text.as_str() {
                "true" => Ok(Expr::Bool {
                    value: true,
                    span: token.span,
                }),
                "false" => Ok(Expr::Bool {
                    value: false,
                    span: token.span,
                }),
                "none" => Ok(Expr::None { span: token.span }),
                name if is_keyword(name) => Err(ParseError {
                    message: format!("unexpected keyword '{name}' in expression"),
                    span: token.span,
                }),
                name => {
                    if self.eat_symbol("(") {
                        let mut args = Vec::new();
                        if !self.check_symbol(")") {
                            loop {
                                args.push(self.expression()?);
                                if !self.eat_symbol(",") {
                                    break;
                                }
                            }
                        }
                        self.expect_symbol(")")?;
                        Ok(Expr::Call {
                            name: name.to_string(),
                            args,
                            span: token.span,
                        })
                    } else {
                        Ok(Expr::Ident {
                            name: name.to_string(),
                            span: token.span,
                        })
                    }
                }
            },
            TokenKind::Symbol if token.text == "(" => {
                let inner = self.expression()?;
                self.expect_symbol(")")?;
                Ok(inner)
            }
            _ => Err(ParseError {
                message: format!("unexpected '{}' in expression", token.text),
                span: token.span,
            }),
        }
    }

    // ------------------------------------------------------------------
    // Token helpers
    // ------------------------------------------------------------------

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.tokens.get(self.pos).map(|t| t.kind)
    }

    fn peek_span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .map(|t| t.span)
            .unwrap_or_else(|| self.last_span())
    }

    fn last_span(&self) -> Span {
        self.tokens
            .last()
            .map(|t| t.span)
            .unwrap_or(Span { line: 1, column: 1 })
    }

    fn advance(&mut self, what: &str) -> Result<&Token, ParseError> {
        if self.pos < self.tokens.len() {
            self.pos += 1;
            Ok(&self.tokens[self.pos - 1])
        } else {
            Err(ParseError {
                message: format!("expected {what}, found end of input"),
                span: self.last_span(),
            })
        }
    }

    fn check_keyword(&self, keyword: &str) -> bool {
        self.tokens
            .get(self.pos)
            .is_some_and(|t| t.kind == TokenKind::Ident && t.text == keyword)
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.check_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<Span, ParseError> {
        let span = self.peek_span();
        if self.eat_keyword(keyword) {
            Ok(span)
        } else {
            Err(ParseError {
                message: format!(
                    "expected '{keyword}', found {}",
                    self.describe_current()
                ),
                span,
            })
        }
    }

    fn check_symbol(&self, symbol: &str) -> bool {
        self.tokens
            .get(self.pos)
            .is_some_and(|t| t.kind == TokenKind::Symbol && t.text == symbol)
    }

    fn peek_symbol_at(&self, offset: usize, symbol: &str) -> bool {
        self.tokens
            .get(self.pos + offset)
            .is_some_and(|t| t.kind == TokenKind::Symbol && t.text == symbol)
    }

    fn eat_symbol(&mut self, symbol: &str) -> bool {
        if self.check_symbol(symbol) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_symbol(&mut self, symbol: &str) -> Result<(), ParseError> {
        let span = self.peek_span();
        if self.eat_symbol(symbol) {
            Ok(())
        } else {
            Err(ParseError {
                message: format!("expected '{symbol}', found {}", self.describe_current()),
                span,
            })
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<String, ParseError> {
        match self.tokens.get(self.pos) {
            Some(token) if token.kind == TokenKind::Ident && !is_keyword(&token.text) => {
                self.pos += 1;
                Ok(self.tokens[self.pos - 1].text.clone())
            }
            _ => Err(ParseError {
                message: format!("expected {what}, found {}", self.describe_current()),
                span: self.peek_span(),
            }),
        }
    }

    fn describe_current(&self) -> String {
        match self.tokens.get(self.pos) {
            Some(token) => format!("'{}'", token.text),
            None => "end of input".to_string(),
        }
    }
}
