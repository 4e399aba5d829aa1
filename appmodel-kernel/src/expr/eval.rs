//! Evaluator - walks an expression tree against a context.
//!
//! Missing keys never raise: they evaluate to `Value::Missing`, which is
//! falsy, unequal to everything, and makes ordering comparisons false.
//! Only genuine type mismatches (`'a' < 1`) produce an `EvalError`.

use std::cmp::Ordering;

use appmodel_api::Value;

use super::ast::{CmpOp, Node};
use super::{EvalError, Lookup};

pub fn evaluate(node: &Node, ctx: &dyn Lookup) -> Result<Value, EvalError> {
    match node {
        Node::Literal(value) => Ok(value.clone()),
        Node::Name(name) => Ok(ctx.lookup(name)),
        Node::List(items) => items
            .iter()
            .map(|item| evaluate(item, ctx))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        Node::Not(inner) => Ok(Value::Bool(!evaluate(inner, ctx)?.is_truthy())),
        // Short-circuit: the right side is only evaluated when it can matter.
        Node::And(left, right) => {
            if !evaluate(left, ctx)?.is_truthy() {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(evaluate(right, ctx)?.is_truthy()))
        }
        Node::Or(left, right) => {
            if evaluate(left, ctx)?.is_truthy() {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(evaluate(right, ctx)?.is_truthy()))
        }
        Node::Compare { op, left, right } => {
            let l = evaluate(left, ctx)?;
            let r = evaluate(right, ctx)?;
            compare(*op, &l, &r).map(Value::Bool)
        }
    }
}

fn compare(op: CmpOp, left: &Value, right: &Value) -> Result<bool, EvalError> {
    match op {
        CmpOp::Eq => Ok(left.loose_eq(right)),
        CmpOp::Ne => Ok(!left.loose_eq(right)),
        CmpOp::In => contains(right, left, op),
        CmpOp::NotIn => contains(right, left, op).map(|found| !found),
        CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge => {
            if left.is_missing() || right.is_missing() {
                return Ok(false);
            }
            let ordering = order(left, right).ok_or_else(|| mismatch(op, left, right))?;
            Ok(match op {
                CmpOp::Lt => ordering == Ordering::Less,
                CmpOp::Le => ordering != Ordering::Greater,
                CmpOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            })
        }
    }
}

fn order(left: &Value, right: &Value) -> Option<Ordering> {
    if let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) {
        return a.partial_cmp(&b);
    }
    match (left, right) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn contains(haystack: &Value, needle: &Value, op: CmpOp) -> Result<bool, EvalError> {
    match (haystack, needle) {
        (Value::Missing, _) | (_, Value::Missing) => Ok(false),
        (Value::List(items), _) => Ok(items.iter().any(|item| item.loose_eq(needle))),
        (Value::String(s), Value::String(sub)) => Ok(s.contains(sub.as_str())),
        _ => Err(mismatch(op, needle, haystack)),
    }
}

fn mismatch(op: CmpOp, left: &Value, right: &Value) -> EvalError {
    EvalError::TypeMismatch {
        op: op.symbol(),
        left: left.type_name(),
        right: right.type_name(),
    }
}
