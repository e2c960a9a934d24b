// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Check sorts.
//!
//! Every binder carries a sort annotation, so there is nothing to infer: the
//! checker computes the sort of a term bottom-up and reports the first
//! mismatch.

use std::collections::HashSet;
use thiserror::Error;

use crate::syntax::*;

/// An error encountered during sort checking
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SortError {
    /// The term referred to a variable that was not declared.
    #[error("unknown variable/constant {0}")]
    UnknownVariable(String),
    /// The term referred to a function that was not declared.
    #[error("unknown function/definition {0}")]
    UnknownFunction(String),
    /// A name was declared multiple times in a context that did not allow shadowing.
    #[error("{0} was declared multiple times")]
    RedeclaredName(String),
    /// Sort checking detected a mismatch between the expected and actual sorts of a term.
    #[error("expected {expected} but found {found}")]
    ExpectedButFoundSorts {
        /// Expected sort coming from sort annotations
        expected: Sort,
        #[allow(missing_docs)]
        found: Sort,
    },
    /// A function or definition was applied to the wrong number of arguments.
    #[allow(missing_docs)]
    #[error("function {function_name} expected {expected} args but found {found} args")]
    ExpectedButFoundArity {
        function_name: String,
        expected: usize,
        found: usize,
    },
    /// An n-ary operator was applied to no arguments.
    #[error("{0} needs at least one argument")]
    NoArguments(String),
}

/// The sorts of the variables in scope.
pub type Context = im::HashMap<String, Sort>;

/// Build a context from a list of binders, rejecting duplicate names.
pub fn context(binders: &[Binder]) -> Result<Context, SortError> {
    let mut seen = HashSet::new();
    for b in binders {
        if !seen.insert(&b.name) {
            return Err(SortError::RedeclaredName(b.name.clone()));
        }
    }
    Ok(binders.iter().map(|b| (b.name.clone(), b.sort)).collect())
}

fn expect(expected: Sort, found: Sort) -> Result<(), SortError> {
    if expected == found {
        Ok(())
    } else {
        Err(SortError::ExpectedButFoundSorts { expected, found })
    }
}

/// Compute the sort of a term in a context.
pub fn sort_of(sig: &Signature, ctx: &Context, t: &Term) -> Result<Sort, SortError> {
    let check = |t: &Term, expected: Sort| -> Result<(), SortError> {
        expect(expected, sort_of(sig, ctx, t)?)
    };
    match t {
        Term::Literal(_) => Ok(Sort::Bool),
        Term::Int(_) => Ok(Sort::Int),
        Term::Id(name) => ctx
            .get(name)
            .copied()
            .ok_or_else(|| SortError::UnknownVariable(name.clone())),
        Term::App(f, args) => {
            let decl = sig
                .fun(f)
                .ok_or_else(|| SortError::UnknownFunction(f.clone()))?;
            if decl.params.len() != args.len() {
                return Err(SortError::ExpectedButFoundArity {
                    function_name: f.clone(),
                    expected: decl.params.len(),
                    found: args.len(),
                });
            }
            for (arg, &sort) in args.iter().zip(&decl.params) {
                check(arg, sort)?;
            }
            Ok(decl.ret)
        }
        Term::UnaryOp(UOp::Not, arg) => check(arg, Sort::Bool).map(|_| Sort::Bool),
        Term::UnaryOp(UOp::Neg, arg) => check(arg, Sort::Int).map(|_| Sort::Int),
        Term::BinOp(BinOp::Equals, lhs, rhs) => {
            let sort = sort_of(sig, ctx, lhs)?;
            check(rhs, sort)?;
            Ok(Sort::Bool)
        }
        Term::BinOp(BinOp::Implies, lhs, rhs) => {
            check(lhs, Sort::Bool)?;
            check(rhs, Sort::Bool)?;
            Ok(Sort::Bool)
        }
        Term::NAryOp(op, args) => {
            if args.is_empty() {
                return Err(SortError::NoArguments(format!("{op:?}").to_lowercase()));
            }
            for arg in args {
                check(arg, Sort::Bool)?;
            }
            Ok(Sort::Bool)
        }
        Term::NumOp(_, lhs, rhs) => {
            check(lhs, Sort::Int)?;
            check(rhs, Sort::Int)?;
            Ok(Sort::Int)
        }
        Term::NumRel(_, lhs, rhs) => {
            check(lhs, Sort::Int)?;
            check(rhs, Sort::Int)?;
            Ok(Sort::Bool)
        }
        Term::Ite { cond, then, else_ } => {
            check(cond, Sort::Bool)?;
            let sort = sort_of(sig, ctx, then)?;
            check(else_, sort)?;
            Ok(sort)
        }
    }
}

/// Check that a term has the given sort.
pub fn check_sort(sig: &Signature, ctx: &Context, t: &Term, expected: Sort) -> Result<(), SortError> {
    expect(expected, sort_of(sig, ctx, t)?)
}

/// Check a function definition: parameter names are distinct and the body has
/// the declared sort using only the parameters as free variables.
pub fn check_fun_def(sig: &Signature, def: &FunDef) -> Result<(), SortError> {
    if sig.contains(&def.name) {
        return Err(SortError::RedeclaredName(def.name.clone()));
    }
    let ctx = context(&def.params)?;
    check_sort(sig, &ctx, &def.body, def.ret)
}

#[cfg(test)]
mod tests {
    use super::{check_fun_def, context, sort_of, SortError};
    use crate::syntax::{Binder, FunDecl, FunDef, NumOp, Signature, Sort, Term};

    fn int_ctx() -> super::Context {
        context(&[Binder::new("x", Sort::Int), Binder::new("b", Sort::Bool)]).unwrap()
    }

    #[test]
    fn test_sort_of_terms() {
        let sig = Signature::default();
        let ctx = int_ctx();
        let t = Term::ite(Term::id("b"), Term::id("x"), Term::int(0));
        assert_eq!(sort_of(&sig, &ctx, &t), Ok(Sort::Int));
        let t = Term::equals(Term::id("b"), Term::id("x"));
        assert_eq!(
            sort_of(&sig, &ctx, &t),
            Err(SortError::ExpectedButFoundSorts {
                expected: Sort::Bool,
                found: Sort::Int
            })
        );
        let t = Term::num_op(NumOp::Add, Term::id("x"), Term::id("y"));
        assert_eq!(
            sort_of(&sig, &ctx, &t),
            Err(SortError::UnknownVariable("y".to_string()))
        );
    }

    #[test]
    fn test_application_arity() {
        let mut sig = Signature::default();
        sig.add(FunDecl {
            name: "pre-f".to_string(),
            params: vec![Sort::Int],
            ret: Sort::Bool,
        });
        let ctx = int_ctx();
        let t = Term::app("pre-f", [Term::id("x"), Term::id("x")]);
        assert_eq!(
            sort_of(&sig, &ctx, &t),
            Err(SortError::ExpectedButFoundArity {
                function_name: "pre-f".to_string(),
                expected: 1,
                found: 2
            })
        );
        let t = Term::app("pre-f", [Term::id("x")]);
        assert_eq!(sort_of(&sig, &ctx, &t), Ok(Sort::Bool));
    }

    #[test]
    fn test_fun_def_checks() {
        let sig = Signature::default();
        let def = FunDef {
            name: "f".to_string(),
            params: vec![Binder::new("x", Sort::Int), Binder::new("x", Sort::Int)],
            ret: Sort::Bool,
            body: Term::true_(),
        };
        assert_eq!(
            check_fun_def(&sig, &def),
            Err(SortError::RedeclaredName("x".to_string()))
        );
        let def = FunDef {
            params: vec![Binder::new("x", Sort::Int)],
            body: Term::id("x"),
            ..def
        };
        assert!(matches!(
            check_fun_def(&sig, &def),
            Err(SortError::ExpectedButFoundSorts { .. })
        ));
    }
}
