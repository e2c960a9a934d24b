// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Evaluate terms under a concrete assignment of values to variables.
//!
//! Integer arithmetic is exact: an operation whose result does not fit in 64
//! bits is an [`EvalError::Overflow`] rather than a wrapped value, so callers
//! can tell "false" apart from "could not be computed".

use itertools::Itertools;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::syntax::*;

/// A concrete value of one of the sorts.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, PartialOrd, Ord)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
}

impl Value {
    /// The sort this value belongs to.
    pub fn sort(&self) -> Sort {
        match self {
            Value::Bool(_) => Sort::Bool,
            Value::Int(_) => Sort::Int,
        }
    }

    /// The value as a (constant) term.
    pub fn to_term(&self) -> Term {
        match self {
            Value::Bool(b) => Term::Literal(*b),
            Value::Int(i) => Term::Int(*i),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
        }
    }
}

/// An assignment maps the names of Id terms to values.
pub type Assignment = im::HashMap<String, Value>;

/// Render an assignment with the variables sorted by name.
pub fn assignment_to_string(assignment: &Assignment) -> String {
    assignment
        .iter()
        .sorted()
        .map(|(name, v)| format!("{name} = {v}"))
        .join(", ")
}

/// An error encountered during evaluation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    /// A variable had no value in the assignment.
    #[error("variable {0} is unassigned")]
    Unassigned(String),
    /// Functions must be inlined before evaluation.
    #[error("cannot evaluate application of {0}")]
    Uninterpreted(String),
    /// An operator was applied to a value of the wrong sort.
    #[error("expected {expected} but found {found}")]
    SortMismatch {
        #[allow(missing_docs)]
        expected: Sort,
        #[allow(missing_docs)]
        found: Sort,
    },
    /// Integer arithmetic left the 64-bit range.
    #[error("integer overflow")]
    Overflow,
}

fn as_bool(v: Value) -> Result<bool, EvalError> {
    match v {
        Value::Bool(b) => Ok(b),
        _ => Err(EvalError::SortMismatch {
            expected: Sort::Bool,
            found: v.sort(),
        }),
    }
}

fn as_int(v: Value) -> Result<i64, EvalError> {
    match v {
        Value::Int(i) => Ok(i),
        _ => Err(EvalError::SortMismatch {
            expected: Sort::Int,
            found: v.sort(),
        }),
    }
}

/// Evaluate a term to a value.
pub fn eval(t: &Term, assignment: &Assignment) -> Result<Value, EvalError> {
    let bool_ = |t: &Term| eval(t, assignment).and_then(as_bool);
    let int_ = |t: &Term| eval(t, assignment).and_then(as_int);
    match t {
        Term::Literal(b) => Ok(Value::Bool(*b)),
        Term::Int(i) => Ok(Value::Int(*i)),
        Term::Id(name) => assignment
            .get(name)
            .copied()
            .ok_or_else(|| EvalError::Unassigned(name.clone())),
        Term::App(f, _) => Err(EvalError::Uninterpreted(f.clone())),
        Term::UnaryOp(UOp::Not, arg) => Ok(Value::Bool(!bool_(arg)?)),
        Term::UnaryOp(UOp::Neg, arg) => int_(arg)?
            .checked_neg()
            .map(Value::Int)
            .ok_or(EvalError::Overflow),
        Term::BinOp(BinOp::Equals, lhs, rhs) => {
            let (l, r) = (eval(lhs, assignment)?, eval(rhs, assignment)?);
            if l.sort() != r.sort() {
                return Err(EvalError::SortMismatch {
                    expected: l.sort(),
                    found: r.sort(),
                });
            }
            Ok(Value::Bool(l == r))
        }
        Term::BinOp(BinOp::Implies, lhs, rhs) => Ok(Value::Bool(!bool_(lhs)? || bool_(rhs)?)),
        Term::NAryOp(NOp::And, args) => {
            for arg in args {
                if !bool_(arg)? {
                    return Ok(Value::Bool(false));
                }
            }
            Ok(Value::Bool(true))
        }
        Term::NAryOp(NOp::Or, args) => {
            for arg in args {
                if bool_(arg)? {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        Term::NumOp(op, lhs, rhs) => {
            let (l, r) = (int_(lhs)?, int_(rhs)?);
            let v = match op {
                NumOp::Add => l.checked_add(r),
                NumOp::Sub => l.checked_sub(r),
                NumOp::Mul => l.checked_mul(r),
            };
            v.map(Value::Int).ok_or(EvalError::Overflow)
        }
        Term::NumRel(rel, lhs, rhs) => {
            let (l, r) = (int_(lhs)?, int_(rhs)?);
            let v = match rel {
                NumRel::Lt => l < r,
                NumRel::Leq => l <= r,
                NumRel::Geq => l >= r,
                NumRel::Gt => l > r,
            };
            Ok(Value::Bool(v))
        }
        Term::Ite { cond, then, else_ } => {
            if bool_(cond)? {
                eval(then, assignment)
            } else {
                eval(else_, assignment)
            }
        }
    }
}

/// Evaluate a formula to a boolean.
pub fn eval_bool(t: &Term, assignment: &Assignment) -> Result<bool, EvalError> {
    eval(t, assignment).and_then(as_bool)
}

#[cfg(test)]
mod tests {
    use super::{assignment_to_string, eval, eval_bool, Assignment, EvalError, Value};
    use crate::syntax::{NumOp, NumRel, Term};

    fn assign(vals: &[(&str, Value)]) -> Assignment {
        vals.iter().map(|(n, v)| (n.to_string(), *v)).collect()
    }

    #[test]
    fn test_eval_transition() {
        let x = Term::id("x");
        let x_next = Term::id("x'");
        let trans = Term::ite(
            Term::num_rel(NumRel::Lt, &x, Term::int(10)),
            Term::equals(&x_next, Term::num_op(NumOp::Add, &x, Term::int(1))),
            Term::equals(&x_next, &x),
        );
        let a = assign(&[("x", Value::Int(3)), ("x'", Value::Int(4))]);
        assert_eq!(eval_bool(&trans, &a), Ok(true));
        let a = assign(&[("x", Value::Int(10)), ("x'", Value::Int(11))]);
        assert_eq!(eval_bool(&trans, &a), Ok(false));
    }

    #[test]
    fn test_overflow_is_reported() {
        let t = Term::num_op(NumOp::Mul, Term::id("x"), Term::id("x"));
        let a = assign(&[("x", Value::Int(i64::MAX / 2))]);
        assert_eq!(eval(&t, &a), Err(EvalError::Overflow));
        assert_eq!(
            eval(&Term::neg(Term::int(i64::MIN)), &Assignment::new()),
            Err(EvalError::Overflow)
        );
    }

    #[test]
    fn test_short_circuit_and_errors() {
        let a = assign(&[("b", Value::Bool(false))]);
        // the unassigned variable is never reached
        let t = Term::and([Term::id("b"), Term::id("y")]);
        assert_eq!(eval_bool(&t, &a), Ok(false));
        let t = Term::or([Term::id("b"), Term::id("y")]);
        assert_eq!(eval_bool(&t, &a), Err(EvalError::Unassigned("y".to_string())));
        assert!(matches!(
            eval(&Term::app("f", [Term::int(1)]), &a),
            Err(EvalError::Uninterpreted(_))
        ));
    }

    #[test]
    fn test_assignment_display() {
        let a = assign(&[("x'", Value::Int(-1)), ("b", Value::Bool(true)), ("x", Value::Int(0))]);
        assert_eq!(assignment_to_string(&a), "b = true, x = 0, x' = -1");
    }
}
