// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! The transition system of an invariant problem, and the verification
//! conditions a candidate invariant must satisfy.

use std::collections::BTreeSet;

use oracle::basics::{VcKind, VerificationCondition};
use sygus::{
    subst::{instantiation, prime, prime_name, substitute},
    syntax::{Binder, FunDef, Term},
};

/// Precondition, transition relation and postcondition over a fixed list of
/// state variables. The transition relation relates the variables to their
/// primed copies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionSystem {
    vars: Vec<Binder>,
    pre: Term,
    trans: Term,
    post: Term,
}

impl TransitionSystem {
    /// A transition system from formulas that are already expressed over
    /// `vars` (and their primed copies, for `trans`).
    pub fn new(vars: Vec<Binder>, pre: Term, trans: Term, post: Term) -> Self {
        Self {
            vars,
            pre,
            trans,
            post,
        }
    }

    /// A transition system from the definitions named by an invariant
    /// constraint. Each definition's parameters are renamed to the
    /// invariant's parameters `vars`; `trans` takes `vars` followed by their
    /// primed copies. The definitions' bodies must not mention other
    /// definitions.
    pub fn from_defs(vars: &[Binder], pre: &FunDef, trans: &FunDef, post: &FunDef) -> Self {
        let current = vars.iter().map(|b| Term::id(&b.name)).collect::<Vec<_>>();
        let next = vars.iter().map(|b| Term::Id(prime_name(&b.name)));
        let both = current.iter().cloned().chain(next).collect::<Vec<_>>();
        Self {
            vars: vars.to_vec(),
            pre: substitute(&pre.body, &instantiation(pre, &current)),
            trans: substitute(&trans.body, &instantiation(trans, &both)),
            post: substitute(&post.body, &instantiation(post, &current)),
        }
    }

    /// The state variables.
    pub fn vars(&self) -> &[Binder] {
        &self.vars
    }

    /// The next-state copies of the state variables.
    pub fn primed_vars(&self) -> Vec<Binder> {
        self.vars
            .iter()
            .map(|b| Binder {
                name: prime_name(&b.name),
                sort: b.sort,
            })
            .collect()
    }

    #[allow(missing_docs)]
    pub fn pre(&self) -> &Term {
        &self.pre
    }

    #[allow(missing_docs)]
    pub fn trans(&self) -> &Term {
        &self.trans
    }

    #[allow(missing_docs)]
    pub fn post(&self) -> &Term {
        &self.post
    }

    /// The integer literals of the precondition, transition and
    /// postcondition.
    pub fn constants(&self) -> BTreeSet<i64> {
        [&self.pre, &self.trans, &self.post]
            .into_iter()
            .flat_map(|t| t.int_literals())
            .collect()
    }
}

/// The verification condition of one kind for a candidate invariant over the
/// state variables of `ts`.
pub fn build_kind(ts: &TransitionSystem, kind: VcKind, candidate: &Term) -> VerificationCondition {
    match kind {
        VcKind::Init => VerificationCondition {
            kind,
            vars: ts.vars.clone(),
            formula: Term::implies(&ts.pre, candidate),
        },
        VcKind::Step => VerificationCondition {
            kind,
            vars: ts.vars.iter().cloned().chain(ts.primed_vars()).collect(),
            formula: Term::implies(
                Term::and([candidate, &ts.trans]),
                prime(candidate, &ts.vars),
            ),
        },
        VcKind::Safety => VerificationCondition {
            kind,
            vars: ts.vars.clone(),
            formula: Term::implies(candidate, &ts.post),
        },
    }
}

/// The initiation, consecution and safety conditions for a candidate, in
/// that order.
pub fn build(ts: &TransitionSystem, candidate: &Term) -> [VerificationCondition; 3] {
    VcKind::ALL.map(|kind| build_kind(ts, kind, candidate))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use oracle::basics::VcKind;
    use sygus::syntax::{Binder, FunDef, NumOp, NumRel, Sort, Term};

    use super::{build, TransitionSystem};

    fn fun(name: &str, params: &[&str], body: Term) -> FunDef {
        FunDef {
            name: name.to_string(),
            params: params.iter().map(|p| Binder::new(p, Sort::Int)).collect(),
            ret: Sort::Bool,
            body,
        }
    }

    fn counter() -> TransitionSystem {
        let pre = fun("pre-f", &["a"], Term::equals(Term::id("a"), Term::int(0)));
        let trans = fun(
            "trans-f",
            &["a", "b"],
            Term::equals(
                Term::id("b"),
                Term::num_op(NumOp::Add, Term::id("a"), Term::int(1)),
            ),
        );
        let post = fun(
            "post-f",
            &["c"],
            Term::num_rel(NumRel::Geq, Term::id("c"), Term::int(0)),
        );
        TransitionSystem::from_defs(&[Binder::new("x", Sort::Int)], &pre, &trans, &post)
    }

    #[test]
    fn test_from_defs_renames_params() {
        let ts = counter();
        assert_eq!(ts.pre().to_string(), "(= x 0)");
        assert_eq!(ts.trans().to_string(), "(= |x'| (+ x 1))");
        assert_eq!(ts.post().to_string(), "(>= x 0)");
        assert_eq!(ts.constants(), BTreeSet::from([0, 1]));
    }

    #[test]
    fn test_conditions() {
        let ts = counter();
        let inv = Term::num_rel(NumRel::Geq, Term::id("x"), Term::int(0));
        let [init, step, safety] = build(&ts, &inv);
        assert_eq!(init.kind, VcKind::Init);
        assert_eq!(init.formula.to_string(), "(=> (= x 0) (>= x 0))");
        assert_eq!(step.vars.len(), 2);
        assert_eq!(step.vars[1].name, "x'");
        assert_eq!(
            step.formula.to_string(),
            "(=> (and (>= x 0) (= |x'| (+ x 1))) (>= |x'| 0))"
        );
        assert_eq!(safety.formula.to_string(), "(=> (>= x 0) (>= x 0))");
    }
}
