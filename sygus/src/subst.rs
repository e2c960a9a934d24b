// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Perform substitutions of Id terms by other terms, and inline function
//! definitions.

use std::collections::HashMap;

use crate::syntax::{Binder, FunDef, Term};

/// A map from identifiers to Terms.
pub type Substitution = HashMap<String, Term>;

/// The name of the next-state copy of a variable.
pub fn prime_name(name: &str) -> String {
    format!("{name}'")
}

/// Perform a substitution. Terms have no binders, so every occurrence of a
/// substituted identifier is replaced.
pub fn substitute(term: &Term, substitution: &Substitution) -> Term {
    map_ids(term, &|name| substitution.get(name).cloned())
}

/// Rename each of the given variables to its primed copy.
pub fn prime(term: &Term, vars: &[Binder]) -> Term {
    let substitution: Substitution = vars
        .iter()
        .map(|b| (b.name.clone(), Term::Id(prime_name(&b.name))))
        .collect();
    substitute(term, &substitution)
}

/// The substitution that instantiates the parameters of `def` with `args`.
pub fn instantiation(def: &FunDef, args: &[Term]) -> Substitution {
    def.params
        .iter()
        .zip(args)
        .map(|(b, arg)| (b.name.clone(), arg.clone()))
        .collect()
}

/// Replace every application of a function in `defs` with its body, with the
/// definition's parameters replaced by the arguments. Bodies are inlined
/// recursively, so definitions may refer to earlier definitions.
///
/// Arities are assumed to have been checked already; missing arguments leave
/// the corresponding parameter in place.
pub fn inline_defs(term: &Term, defs: &HashMap<String, FunDef>) -> Term {
    match term {
        Term::App(f, args) => {
            let args: Vec<Term> = args.iter().map(|t| inline_defs(t, defs)).collect();
            match defs.get(f) {
                Some(def) => inline_defs(&substitute(&def.body, &instantiation(def, &args)), defs),
                None => Term::App(f.clone(), args),
            }
        }
        _ => map_children(term, |t| inline_defs(t, defs)),
    }
}

fn map_ids<F>(term: &Term, f: &F) -> Term
where
    F: Fn(&str) -> Option<Term>,
{
    match term {
        Term::Id(name) => f(name).unwrap_or_else(|| term.clone()),
        _ => map_children(term, |t| map_ids(t, f)),
    }
}

/// Rebuild a term with `f` applied to each immediate subterm, left to right.
pub fn map_children<F>(term: &Term, mut f: F) -> Term
where
    F: FnMut(&Term) -> Term,
{
    match term {
        Term::Literal(_) | Term::Int(_) | Term::Id(_) => term.clone(),
        Term::App(name, args) => Term::App(name.clone(), args.iter().map(f).collect()),
        Term::UnaryOp(op, arg) => Term::UnaryOp(*op, Box::new(f(arg))),
        Term::BinOp(op, lhs, rhs) => Term::BinOp(*op, Box::new(f(lhs)), Box::new(f(rhs))),
        Term::NAryOp(op, args) => Term::NAryOp(*op, args.iter().map(f).collect()),
        Term::NumOp(op, lhs, rhs) => Term::NumOp(*op, Box::new(f(lhs)), Box::new(f(rhs))),
        Term::NumRel(rel, lhs, rhs) => Term::NumRel(*rel, Box::new(f(lhs)), Box::new(f(rhs))),
        Term::Ite { cond, then, else_ } => Term::Ite {
            cond: Box::new(f(cond)),
            then: Box::new(f(then)),
            else_: Box::new(f(else_)),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::{inline_defs, prime, substitute, Substitution};
    use crate::syntax::{Binder, FunDef, NumOp, NumRel, Sort, Term};

    #[test]
    fn test_substitute_is_simultaneous() {
        let (x, y) = (Term::id("x"), Term::id("y"));
        let t = Term::num_rel(NumRel::Lt, &x, &y);
        let s: Substitution = [("x".to_string(), y.clone()), ("y".to_string(), x.clone())]
            .into_iter()
            .collect();
        assert_eq!(substitute(&t, &s), Term::num_rel(NumRel::Lt, &y, &x));
    }

    #[test]
    fn test_prime() {
        let t = Term::num_rel(NumRel::Leq, Term::id("x"), Term::id("n"));
        let primed = prime(&t, &[Binder::new("x", Sort::Int)]);
        assert_eq!(primed.to_string(), "(<= |x'| n)");
    }

    #[test]
    fn test_inline_nested_defs() {
        let inc = FunDef {
            name: "inc".to_string(),
            params: vec![Binder::new("a", Sort::Int)],
            ret: Sort::Int,
            body: Term::num_op(NumOp::Add, Term::id("a"), Term::int(1)),
        };
        let step = FunDef {
            name: "step".to_string(),
            params: vec![Binder::new("x", Sort::Int), Binder::new("y", Sort::Int)],
            ret: Sort::Bool,
            body: Term::equals(Term::id("y"), Term::app("inc", [Term::id("x")])),
        };
        let defs: HashMap<_, _> = [inc, step]
            .into_iter()
            .map(|d| (d.name.clone(), d))
            .collect();
        let t = Term::app("step", [Term::id("v"), Term::id("v'")]);
        assert_eq!(inline_defs(&t, &defs).to_string(), "(= |v'| (+ v 1))");
    }
}
