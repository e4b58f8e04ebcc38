//! Parser for code cell bodies.
//!
//! A code cell holds the body of a closure `|project, cell, env| { ... }`.
//! The body is parsed with `syn` into a flat list of statements:
//!
//! ```text
//! let sources = ["a", "b"];               // Let
//! env.install("std");                     // Call (target = env)
//! project.add_module("a", "std/source");  // Call (target = project)
//! cell.emit(sources);                     // Call (target = cell)
//! panic!("not ready");                    // Panic
//! project                                 // Tail::Project
//! ```
//!
//! Line numbers are 1-based and relative to the cell source.

use std::fmt;

use proc_macro2::Span;
use syn::spanned::Spanned;
use syn::{Expr, Lit, LitStr, Pat, Stmt, UnOp};

/// A literal value manipulated by a cell body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Str(String),
    Int(i64),
    Bool(bool),
    List(Vec<Value>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Str(_) => "string",
            Self::Int(_) => "integer",
            Self::Bool(_) => "bool",
            Self::List(_) => "list",
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Str(s) => serde_json::Value::String(s.clone()),
            Self::Int(i) => serde_json::Value::from(*i),
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => write!(f, "{:?}", s),
            Self::Int(i) => write!(f, "{}", i),
            Self::Bool(b) => write!(f, "{}", b),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

/// The closure parameter a call is made on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Project,
    Cell,
    Env,
}

impl Target {
    fn from_ident(ident: &str) -> Option<Self> {
        match ident {
            "project" => Some(Self::Project),
            "cell" => Some(Self::Cell),
            "env" => Some(Self::Env),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Cell => "cell",
            Self::Env => "env",
        }
    }
}

/// An argument before bindings are resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Value(Value),
    Binding(String),
    List(Vec<Operand>),
}

/// A statement of a cell body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Let {
        name: String,
        value: Operand,
        line: usize,
    },
    Call {
        target: Target,
        method: String,
        args: Vec<Operand>,
        line: usize,
    },
    Panic {
        message: String,
        line: usize,
    },
}

/// What the body hands back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tail {
    /// `project` or `return project;`
    Project,
    /// The body falls off the end without a value.
    Missing,
    /// Anything else.
    Other { description: String, line: usize },
}

/// A parsed cell body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    pub statements: Vec<Statement>,
    pub tail: Tail,
}

/// A syntax or structure error in a cell body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub line: usize,
    pub message: String,
}

impl ParseError {
    fn at(span: Span, message: impl Into<String>) -> Self {
        Self {
            line: line_of(span),
            message: message.into(),
        }
    }
}

/// The body is wrapped in braces on its own line, so source lines are shifted by one.
fn line_of(span: Span) -> usize {
    span.start().line.saturating_sub(1).max(1)
}

/// Parse a cell body.
pub fn parse(source: &str) -> Result<Script, ParseError> {
    let wrapped = format!("{{\n{}\n}}", source);
    let block: syn::Block = syn::parse_str(&wrapped).map_err(|e| ParseError {
        line: line_of(e.span()),
        message: e.to_string(),
    })?;

    let mut statements = Vec::new();
    let mut tail = Tail::Missing;
    let count = block.stmts.len();

    for (index, stmt) in block.stmts.iter().enumerate() {
        if tail != Tail::Missing {
            return Err(ParseError::at(
                stmt.span(),
                "unreachable statement after the returned value",
            ));
        }
        let is_last = index + 1 == count;

        match stmt {
            Stmt::Local(local) => statements.push(parse_let(local)?),
            Stmt::Macro(stmt_macro) => statements.push(parse_panic(&stmt_macro.mac)?),
            Stmt::Expr(Expr::Return(ret), _) => {
                tail = parse_returned(ret.expr.as_deref(), ret.span());
            }
            Stmt::Expr(Expr::Macro(expr_macro), _) => {
                statements.push(parse_panic(&expr_macro.mac)?);
            }
            Stmt::Expr(expr, None) if is_last => tail = parse_returned(Some(expr), expr.span()),
            Stmt::Expr(expr, _) => statements.push(parse_call(expr)?),
            Stmt::Item(item) => {
                return Err(ParseError::at(
                    item.span(),
                    "item definitions are not supported in cell bodies",
                ));
            }
        }
    }

    Ok(Script { statements, tail })
}

fn parse_let(local: &syn::Local) -> Result<Statement, ParseError> {
    let pat = match &local.pat {
        Pat::Type(pat_type) => pat_type.pat.as_ref(),
        pat => pat,
    };
    let Pat::Ident(pat_ident) = pat else {
        return Err(ParseError::at(
            local.pat.span(),
            "only simple `let name = value;` bindings are supported",
        ));
    };
    let name = pat_ident.ident.to_string();
    if Target::from_ident(&name).is_some() {
        return Err(ParseError::at(
            pat_ident.span(),
            format!("`{}` cannot be rebound", name),
        ));
    }
    let init = local.init.as_ref().ok_or_else(|| {
        ParseError::at(local.span(), format!("binding `{}` needs a value", name))
    })?;

    Ok(Statement::Let {
        name,
        value: parse_operand(&init.expr)?,
        line: line_of(local.span()),
    })
}

fn parse_panic(mac: &syn::Macro) -> Result<Statement, ParseError> {
    if !mac.path.is_ident("panic") {
        let name = mac
            .path
            .segments
            .last()
            .map(|s| s.ident.to_string())
            .unwrap_or_default();
        return Err(ParseError::at(
            mac.path.span(),
            format!("unsupported macro `{}!`", name),
        ));
    }

    let message = if mac.tokens.is_empty() {
        "explicit panic".to_string()
    } else {
        mac.parse_body::<LitStr>()
            .map_err(|_| {
                ParseError::at(mac.span(), "`panic!` takes a single string literal")
            })?
            .value()
    };

    Ok(Statement::Panic {
        message,
        line: line_of(mac.path.span()),
    })
}

fn parse_call(expr: &Expr) -> Result<Statement, ParseError> {
    let Expr::MethodCall(call) = expr else {
        return Err(ParseError::at(
            expr.span(),
            "expected a call such as `project.add_module(..)`",
        ));
    };

    let target = match call.receiver.as_ref() {
        Expr::Path(path) => path
            .path
            .get_ident()
            .and_then(|ident| Target::from_ident(&ident.to_string())),
        Expr::MethodCall(_) => {
            return Err(ParseError::at(
                call.receiver.span(),
                "method chaining is not supported",
            ));
        }
        _ => None,
    }
    .ok_or_else(|| {
        ParseError::at(
            call.receiver.span(),
            "calls must be made on `project`, `cell` or `env`",
        )
    })?;

    let args = call
        .args
        .iter()
        .map(parse_operand)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Statement::Call {
        target,
        method: call.method.to_string(),
        args,
        line: line_of(call.method.span()),
    })
}

fn parse_operand(expr: &Expr) -> Result<Operand, ParseError> {
    match expr {
        Expr::Lit(expr_lit) => parse_lit(&expr_lit.lit, false).map(Operand::Value),
        Expr::Unary(unary) if matches!(unary.op, UnOp::Neg(_)) => match unary.expr.as_ref() {
            Expr::Lit(expr_lit) => parse_lit(&expr_lit.lit, true).map(Operand::Value),
            other => Err(ParseError::at(other.span(), "only integer literals can be negated")),
        },
        Expr::Array(array) => array
            .elems
            .iter()
            .map(parse_operand)
            .collect::<Result<Vec<_>, _>>()
            .map(Operand::List),
        Expr::Reference(reference) => parse_operand(&reference.expr),
        Expr::Paren(paren) => parse_operand(&paren.expr),
        Expr::Path(path) => {
            let ident = path.path.get_ident().ok_or_else(|| {
                ParseError::at(path.span(), "paths are not supported, use a binding name")
            })?;
            let name = ident.to_string();
            if Target::from_ident(&name).is_some() {
                return Err(ParseError::at(
                    ident.span(),
                    format!("`{}` cannot be passed as a value", name),
                ));
            }
            Ok(Operand::Binding(name))
        }
        other => Err(ParseError::at(
            other.span(),
            "expected a literal, a list or a binding name",
        )),
    }
}

fn parse_lit(lit: &Lit, negate: bool) -> Result<Value, ParseError> {
    match lit {
        Lit::Int(int) => {
            let value: i64 = int
                .base10_parse()
                .map_err(|e| ParseError::at(int.span(), e.to_string()))?;
            Ok(Value::Int(if negate { -value } else { value }))
        }
        _ if negate => Err(ParseError::at(lit.span(), "only integer literals can be negated")),
        Lit::Str(s) => Ok(Value::Str(s.value())),
        Lit::Bool(b) => Ok(Value::Bool(b.value)),
        other => Err(ParseError::at(other.span(), "unsupported literal")),
    }
}

fn parse_returned(expr: Option<&Expr>, span: Span) -> Tail {
    match expr {
        Some(Expr::Path(path)) if path.path.is_ident("project") => Tail::Project,
        Some(Expr::Paren(paren)) => parse_returned(Some(&paren.expr), span),
        Some(expr) => Tail::Other {
            description: describe(expr),
            line: line_of(expr.span()),
        },
        None => Tail::Other {
            description: "nothing".to_string(),
            line: line_of(span),
        },
    }
}

fn describe(expr: &Expr) -> String {
    match expr {
        Expr::Lit(_) => "a literal".to_string(),
        Expr::Array(_) => "a list".to_string(),
        Expr::Path(path) => path
            .path
            .get_ident()
            .map(|ident| format!("`{}`", ident))
            .unwrap_or_else(|| "a path".to_string()),
        Expr::MethodCall(call) => format!("the value of `.{}(..)`", call.method),
        _ => "an expression".to_string(),
    }
}
