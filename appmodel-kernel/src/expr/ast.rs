//! Abstract Syntax Tree for "when" clauses.

use appmodel_api::Value;
use std::fmt;

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
}

impl CmpOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
            CmpOp::In => "in",
            CmpOp::NotIn => "not in",
        }
    }
}

/// A node of a parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// A constant: `true`, `3`, `'text'`, `null`.
    Literal(Value),
    /// A list literal: `['a', 'b']`.
    List(Vec<Node>),
    /// A context key lookup.
    Name(String),
    Not(Box<Node>),
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
    Compare {
        op: CmpOp,
        left: Box<Node>,
        right: Box<Node>,
    },
}

// Binding strength, loosest first. Used to print the minimum of parentheses.
const PREC_OR: u8 = 1;
const PREC_AND: u8 = 2;
const PREC_NOT: u8 = 3;
const PREC_CMP: u8 = 4;
const PREC_ATOM: u8 = 5;

impl Node {
    fn precedence(&self) -> u8 {
        match self {
            Node::Or(..) => PREC_OR,
            Node::And(..) => PREC_AND,
            Node::Not(_) => PREC_NOT,
            Node::Compare { .. } => PREC_CMP,
            Node::Literal(_) | Node::List(_) | Node::Name(_) => PREC_ATOM,
        }
    }

    /// Visit every context key this node reads.
    pub fn walk_names<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Node::Literal(_) => {}
            Node::Name(name) => out.push(name),
            Node::List(items) => items.iter().for_each(|n| n.walk_names(out)),
            Node::Not(inner) => inner.walk_names(out),
            Node::And(l, r) | Node::Or(l, r) => {
                l.walk_names(out);
                r.walk_names(out);
            }
            Node::Compare { left, right, .. } => {
                left.walk_names(out);
                right.walk_names(out);
            }
        }
    }

    fn fmt_at(&self, f: &mut fmt::Formatter<'_>, min_prec: u8) -> fmt::Result {
        let wrap = self.precedence() < min_prec;
        if wrap {
            write!(f, "(")?;
        }
        match self {
            Node::Literal(value) => write_literal(f, value)?,
            Node::Name(name) => write!(f, "{}", name)?,
            Node::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    item.fmt_at(f, PREC_OR)?;
                }
                write!(f, "]")?;
            }
            Node::Not(inner) => {
                write!(f, "!")?;
                inner.fmt_at(f, PREC_NOT)?;
            }
            Node::And(l, r) => {
                l.fmt_at(f, PREC_AND)?;
                write!(f, " && ")?;
                r.fmt_at(f, PREC_NOT)?;
            }
            Node::Or(l, r) => {
                l.fmt_at(f, PREC_OR)?;
                write!(f, " || ")?;
                r.fmt_at(f, PREC_AND)?;
            }
            Node::Compare { op, left, right } => {
                left.fmt_at(f, PREC_ATOM)?;
                write!(f, " {} ", op.symbol())?;
                right.fmt_at(f, PREC_ATOM)?;
            }
        }
        if wrap {
            write!(f, ")")?;
        }
        Ok(())
    }
}

fn write_literal(f: &mut fmt::Formatter<'_>, value: &Value) -> fmt::Result {
    match value {
        Value::String(s) => {
            write!(f, "'")?;
            for c in s.chars() {
                if c == '\'' || c == '\\' {
                    write!(f, "\\")?;
                }
                write!(f, "{}", c)?;
            }
            write!(f, "'")
        }
        // Debug always writes a decimal point or an exponent, so the literal
        // re-parses as a float.
        Value::Float(x) => write!(f, "{:?}", x),
        Value::List(items) => {
            write!(f, "[")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write_literal(f, item)?;
            }
            write!(f, "]")
        }
        other => write!(f, "{}", other),
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_at(f, PREC_OR)
    }
}
