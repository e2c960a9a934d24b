// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Counterexamples returned by the oracle, kept to filter later candidates
//! without another oracle call.

use serde::Serialize;

use oracle::basics::VcKind;
use sygus::{
    semantics::{assignment_to_string, eval_bool, Assignment},
    syntax::Term,
};

use crate::constraints::{build_kind, TransitionSystem};

/// An assignment that falsified the condition of some kind for an earlier
/// candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Counterexample {
    #[allow(missing_docs)]
    pub kind: VcKind,
    /// Values for the variables of the condition (primed ones included for
    /// [`VcKind::Step`])
    pub assignment: Assignment,
}

impl std::fmt::Display for Counterexample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, assignment_to_string(&self.assignment))
    }
}

/// The counterexamples of one synthesis attempt, in the order they were
/// found.
#[derive(Debug, Clone, Default)]
pub struct CounterexampleStore {
    cexs: Vec<Counterexample>,
}

impl CounterexampleStore {
    #[allow(missing_docs)]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a counterexample. No check is made against earlier ones.
    pub fn record(&mut self, cex: Counterexample) {
        self.cexs.push(cex);
    }

    #[allow(missing_docs)]
    pub fn len(&self) -> usize {
        self.cexs.len()
    }

    #[allow(missing_docs)]
    pub fn is_empty(&self) -> bool {
        self.cexs.is_empty()
    }

    #[allow(missing_docs)]
    pub fn iter(&self) -> impl Iterator<Item = &Counterexample> {
        self.cexs.iter()
    }

    /// Check a candidate against every stored counterexample: the condition
    /// of the counterexample's kind, built from the candidate, must hold on
    /// the stored assignment. A condition that cannot be evaluated does not
    /// reject the candidate.
    pub fn admits(&self, ts: &TransitionSystem, candidate: &Term) -> bool {
        self.first_violated(ts, candidate).is_none()
    }

    /// The first stored counterexample that rules out the candidate.
    pub fn first_violated(&self, ts: &TransitionSystem, candidate: &Term) -> Option<&Counterexample> {
        // building a condition is cheap next to evaluating it, but each
        // kind is only built once
        let mut conditions = [None, None, None];
        self.cexs.iter().find(|cex| {
            let slot = &mut conditions[cex.kind as usize];
            let vc = slot.get_or_insert_with(|| build_kind(ts, cex.kind, candidate));
            match eval_bool(&vc.formula, &cex.assignment) {
                Ok(holds) => !holds,
                Err(err) => {
                    log::trace!("could not evaluate {} condition on {cex}: {err}", cex.kind);
                    false
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use oracle::basics::VcKind;
    use sygus::{
        semantics::{Assignment, Value},
        syntax::{Binder, NumOp, NumRel, Sort, Term},
    };

    use super::{Counterexample, CounterexampleStore};
    use crate::constraints::TransitionSystem;

    fn counter() -> TransitionSystem {
        let (x, y) = (Term::id("x"), Term::id("x'"));
        TransitionSystem::new(
            vec![Binder::new("x", Sort::Int)],
            Term::equals(&x, Term::int(0)),
            Term::ite(
                Term::num_rel(NumRel::Lt, &x, Term::int(10)),
                Term::equals(&y, Term::num_op(NumOp::Add, &x, Term::int(1))),
                Term::equals(&y, &x),
            ),
            Term::num_rel(NumRel::Leq, &x, Term::int(10)),
        )
    }

    fn assignment(values: &[(&str, i64)]) -> Assignment {
        values
            .iter()
            .map(|(n, v)| (n.to_string(), Value::Int(*v)))
            .collect()
    }

    fn le(c: i64) -> Term {
        Term::num_rel(NumRel::Leq, Term::id("x"), Term::int(c))
    }

    #[test]
    fn test_admits() {
        let ts = counter();
        let mut store = CounterexampleStore::new();
        assert!(store.admits(&ts, &Term::false_()));

        store.record(Counterexample {
            kind: VcKind::Init,
            assignment: assignment(&[("x", 0)]),
        });
        assert!(!store.admits(&ts, &Term::false_()));
        assert!(store.admits(&ts, &le(0)));

        store.record(Counterexample {
            kind: VcKind::Step,
            assignment: assignment(&[("x", 0), ("x'", 1)]),
        });
        assert!(!store.admits(&ts, &le(0)));
        assert!(store.admits(&ts, &le(1)));

        store.record(Counterexample {
            kind: VcKind::Safety,
            assignment: assignment(&[("x", 11)]),
        });
        assert!(!store.admits(&ts, &Term::true_()));
        assert!(store.admits(&ts, &le(10)));
        assert_eq!(store.len(), 3);
        assert_eq!(
            store.first_violated(&ts, &Term::true_()).map(|c| c.kind),
            Some(VcKind::Safety)
        );
    }

    #[test]
    fn test_overflow_is_admitted() {
        let ts = counter();
        let mut store = CounterexampleStore::new();
        store.record(Counterexample {
            kind: VcKind::Safety,
            assignment: assignment(&[("x", i64::MAX)]),
        });
        // x + 1 <= 0 overflows at x = i64::MAX
        let overflowing = Term::num_rel(
            NumRel::Leq,
            Term::num_op(NumOp::Add, Term::id("x"), Term::int(1)),
            Term::int(0),
        );
        assert!(store.admits(&ts, &overflowing));
    }
}
