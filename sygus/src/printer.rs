// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Render terms and definitions as SMT-LIB s-expressions.

use smtlib::sexp::{app, atom_s, int, sexp_l, Sexp};

use crate::syntax::*;

/// Convert a sort to its SMT-LIB name.
pub fn sort(s: Sort) -> Sexp {
    atom_s(s.to_string())
}

/// Convert a binder to `(name Sort)`.
pub fn binder(b: &Binder) -> Sexp {
    sexp_l([atom_s(&b.name), sort(b.sort)])
}

/// Convert a term to an s-expression.
pub fn term(t: &Term) -> Sexp {
    match t {
        Term::Literal(false) => atom_s("false"),
        Term::Literal(true) => atom_s("true"),
        Term::Int(i) => int(*i),
        Term::Id(name) => atom_s(name),
        Term::App(f, args) => {
            if args.is_empty() {
                atom_s(f)
            } else {
                app(f, args.iter().map(term))
            }
        }
        Term::UnaryOp(op, arg) => {
            let op = match op {
                UOp::Not => "not",
                UOp::Neg => "-",
            };
            app(op, [term(arg)])
        }
        Term::BinOp(op, lhs, rhs) => {
            let op = match op {
                BinOp::Equals => "=",
                BinOp::Implies => "=>",
            };
            app(op, [term(lhs), term(rhs)])
        }
        Term::NAryOp(op, args) => {
            let op = match op {
                NOp::And => "and",
                NOp::Or => "or",
            };
            app(op, args.iter().map(term))
        }
        Term::NumOp(op, lhs, rhs) => {
            let op = match op {
                NumOp::Add => "+",
                NumOp::Sub => "-",
                NumOp::Mul => "*",
            };
            app(op, [term(lhs), term(rhs)])
        }
        Term::NumRel(rel, lhs, rhs) => {
            let rel = match rel {
                NumRel::Lt => "<",
                NumRel::Leq => "<=",
                NumRel::Geq => ">=",
                NumRel::Gt => ">",
            };
            app(rel, [term(lhs), term(rhs)])
        }
        Term::Ite { cond, then, else_ } => app("ite", [term(cond), term(then), term(else_)]),
    }
}

/// Render a function definition as
/// `(define-fun <name> (<typed parameters>) <sort> <body>)`.
pub fn fun_def(def: &FunDef) -> Sexp {
    app(
        "define-fun",
        [
            atom_s(&def.name),
            sexp_l(def.params.iter().map(binder)),
            sort(def.ret),
            term(&def.body),
        ],
    )
}

#[cfg(test)]
mod tests {
    use crate::syntax::{Binder, FunDef, NumOp, NumRel, Sort, Term};

    #[test]
    fn test_print_define_fun() {
        let x = Term::id("x");
        let def = FunDef {
            name: "inv-f".to_string(),
            params: vec![Binder::new("x", Sort::Int)],
            ret: Sort::Bool,
            body: Term::not(Term::num_rel(NumRel::Geq, &x, Term::int(11))),
        };
        insta::assert_snapshot!(def, @"(define-fun inv-f ((x Int)) Bool (not (>= x 11)))");
    }

    #[test]
    fn test_print_primed_and_negative() {
        let t = Term::equals(
            Term::id("x'"),
            Term::num_op(NumOp::Sub, Term::id("x"), Term::int(-2)),
        );
        assert_eq!(t.to_string(), "(= |x'| (- x (- 2)))");
        let t = Term::ite(Term::id("b"), Term::true_(), Term::app("f", [Term::int(0)]));
        assert_eq!(t.to_string(), "(ite b true (f 0))");
    }
}
