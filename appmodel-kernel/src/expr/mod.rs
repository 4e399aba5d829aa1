//! Context expressions ("when" clauses).
//!
//! An [`Expr`] is parsed once and evaluated many times against a changing
//! context. Syntax errors surface from [`Expr::parse`]; evaluation through
//! [`Expr::eval`] never fails. Missing keys are falsy and type mismatches
//! evaluate to `false`, so menu and keybinding filtering keep working when a
//! clause references keys the host never set.

mod ast;
mod eval;
mod lexer;
mod parser;

pub use ast::{CmpOp, Node};

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use appmodel_api::Value;
use indexmap::IndexMap;
use thiserror::Error;

/// Malformed expression syntax.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at offset {position}")]
pub struct ParseError {
    pub message: String,
    /// Byte offset into the source.
    pub position: usize,
}

impl ParseError {
    pub(crate) fn new(message: impl Into<String>, position: usize) -> Self {
        Self { message: message.into(), position }
    }
}

/// Evaluation failure. Only visible through [`Expr::evaluate`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("cannot apply '{op}' to {left} and {right}")]
    TypeMismatch {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },
}

/// Read access to context values.
///
/// Implementations return `Value::Missing` for unset keys.
pub trait Lookup {
    fn lookup(&self, key: &str) -> Value;
}

/// The empty context: every key is missing.
impl Lookup for () {
    fn lookup(&self, _key: &str) -> Value {
        Value::Missing
    }
}

impl Lookup for HashMap<String, Value> {
    fn lookup(&self, key: &str) -> Value {
        self.get(key).cloned().unwrap_or(Value::Missing)
    }
}

impl Lookup for BTreeMap<String, Value> {
    fn lookup(&self, key: &str) -> Value {
        self.get(key).cloned().unwrap_or(Value::Missing)
    }
}

impl Lookup for IndexMap<String, Value> {
    fn lookup(&self, key: &str) -> Value {
        self.get(key).cloned().unwrap_or(Value::Missing)
    }
}

impl<T: Lookup + ?Sized> Lookup for &T {
    fn lookup(&self, key: &str) -> Value {
        (**self).lookup(key)
    }
}

/// Adapts a closure into a [`Lookup`].
pub struct FnLookup<F>(pub F);

impl<F: Fn(&str) -> Value> Lookup for FnLookup<F> {
    fn lookup(&self, key: &str) -> Value {
        (self.0)(key)
    }
}

/// A parsed, immutable boolean predicate over context keys.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    root: Node,
}

impl Expr {
    /// Parse `source`. Fails on empty input, unbalanced parentheses,
    /// unknown operators and nesting deeper than 256 levels.
    pub fn parse(source: &str) -> Result<Self, ParseError> {
        parser::parse(source).map(|root| Self { root })
    }

    /// Expression reading a single context key.
    pub fn key(name: impl Into<String>) -> Self {
        Self { root: Node::Name(name.into()) }
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Self { root: Node::Literal(value.into()) }
    }

    pub fn and(self, other: Expr) -> Self {
        Self { root: Node::And(Box::new(self.root), Box::new(other.root)) }
    }

    pub fn or(self, other: Expr) -> Self {
        Self { root: Node::Or(Box::new(self.root), Box::new(other.root)) }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Self { root: Node::Not(Box::new(self.root)) }
    }

    pub fn compare(self, op: CmpOp, other: Expr) -> Self {
        Self {
            root: Node::Compare { op, left: Box::new(self.root), right: Box::new(other.root) },
        }
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    /// Evaluate to a boolean. Evaluation errors are logged and read as `false`.
    pub fn eval(&self, ctx: &dyn Lookup) -> bool {
        match eval::evaluate(&self.root, ctx) {
            Ok(value) => value.is_truthy(),
            Err(e) => {
                tracing::trace!(expr = %self, error = %e, "expression evaluation failed");
                false
            }
        }
    }

    /// Evaluate to a value, surfacing type mismatches.
    pub fn evaluate(&self, ctx: &dyn Lookup) -> Result<Value, EvalError> {
        eval::evaluate(&self.root, ctx)
    }

    /// Every context key the expression reads, sorted and deduplicated.
    pub fn keys(&self) -> BTreeSet<String> {
        let mut names = Vec::new();
        self.root.walk_names(&mut names);
        names.into_iter().map(str::to_string).collect()
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)
    }
}

impl FromStr for Expr {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Parse an optional clause, treating `None` as "always true".
pub(crate) fn parse_optional(source: Option<&str>) -> Result<Option<Expr>, ParseError> {
    source.map(Expr::parse).transpose()
}

/// Evaluate an optional clause; no clause means true.
pub(crate) fn eval_optional(expr: Option<&Expr>, ctx: &dyn Lookup) -> bool {
    expr.map_or(true, |e| e.eval(ctx))
}
