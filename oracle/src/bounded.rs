// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! An oracle that decides validity by exhaustive evaluation over a finite
//! window of integers.
//!
//! Every integer variable ranges over `[-window, window]` and every boolean
//! variable over both values. `Valid` therefore means "valid within the
//! window", which is a sound answer only for problems whose reachable and
//! relevant states fit in the window. This makes it suitable for tests and
//! small problems, and it needs no external solver.

use itertools::Itertools;

use sygus::{
    semantics::{eval_bool, Assignment, Value},
    syntax::Sort,
};

use crate::{
    basics::{Decision, Oracle, VerificationCondition},
    timing,
};

/// The largest number of assignments a single query may enumerate.
const MAX_ASSIGNMENTS: u128 = 50_000_000;

/// Exhaustive evaluation over a bounded universe.
#[derive(Debug, Clone, Copy)]
pub struct BoundedOracle {
    window: i64,
}

impl BoundedOracle {
    /// Create an oracle where integers range over `[-window, window]`.
    pub fn new(window: u32) -> Self {
        Self {
            window: i64::from(window),
        }
    }

    /// Values of a sort, ordered by absolute value so that the first
    /// falsifying assignment found is a small one.
    fn values(&self, sort: Sort) -> Vec<Value> {
        match sort {
            Sort::Bool => vec![Value::Bool(false), Value::Bool(true)],
            Sort::Int => std::iter::once(0)
                .chain((1..=self.window).flat_map(|i| [i, -i]))
                .map(Value::Int)
                .collect(),
        }
    }

    fn search(&self, vc: &VerificationCondition) -> Decision {
        let domains = vc.vars.iter().map(|b| self.values(b.sort)).collect_vec();
        let count = domains
            .iter()
            .try_fold(1u128, |acc, d| acc.checked_mul(d.len() as u128));
        if count.map_or(true, |c| c > MAX_ASSIGNMENTS) {
            return Decision::Unknown(format!(
                "{} variables over window {} is too many assignments",
                vc.vars.len(),
                self.window
            ));
        }
        // multi_cartesian_product yields nothing for zero variables, but the
        // empty assignment still needs to be checked
        let tuples: Box<dyn Iterator<Item = Vec<Value>>> = if domains.is_empty() {
            Box::new(std::iter::once(vec![]))
        } else {
            Box::new(domains.into_iter().multi_cartesian_product())
        };
        for tuple in tuples {
            let assignment: Assignment = vc
                .vars
                .iter()
                .zip(tuple)
                .map(|(b, v)| (b.name.clone(), v))
                .collect();
            match eval_bool(&vc.formula, &assignment) {
                Ok(true) => {}
                Ok(false) => return Decision::Invalid(assignment),
                Err(err) => return Decision::Unknown(format!("evaluation failed: {err}")),
            }
        }
        Decision::Valid
    }
}

impl Oracle for BoundedOracle {
    fn decide(&self, vc: &VerificationCondition) -> Decision {
        let start = timing::start();
        let decision = self.search(vc);
        timing::elapsed(timing::TimeType::of(&decision), start);
        log::debug!("bounded oracle: {} condition is {decision}", vc.kind);
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::BoundedOracle;
    use crate::basics::{Decision, Oracle, VcKind, VerificationCondition};
    use sygus::{
        semantics::{eval_bool, Value},
        syntax::{Binder, NumOp, NumRel, Sort, Term},
    };

    fn int_vars(names: &[&str]) -> Vec<Binder> {
        names.iter().map(|n| Binder::new(n, Sort::Int)).collect()
    }

    #[test]
    fn test_valid_within_window() {
        let x = Term::id("x");
        let vc = VerificationCondition {
            kind: VcKind::Safety,
            vars: int_vars(&["x"]),
            formula: Term::implies(
                Term::num_rel(NumRel::Leq, &x, Term::int(3)),
                Term::num_rel(NumRel::Leq, &x, Term::int(10)),
            ),
        };
        assert_eq!(BoundedOracle::new(16).decide(&vc), Decision::Valid);
    }

    #[test]
    fn test_smallest_counterexample_first() {
        let (x, y) = (Term::id("x"), Term::id("x'"));
        // x' = x + 1 => x' <= x is false everywhere
        let vc = VerificationCondition {
            kind: VcKind::Step,
            vars: int_vars(&["x", "x'"]),
            formula: Term::implies(
                Term::equals(&y, Term::num_op(NumOp::Add, &x, Term::int(1))),
                Term::num_rel(NumRel::Leq, &y, &x),
            ),
        };
        let Decision::Invalid(a) = BoundedOracle::new(5).decide(&vc) else {
            panic!("expected a counterexample");
        };
        assert_eq!(a.get("x"), Some(&Value::Int(0)));
        assert_eq!(a.get("x'"), Some(&Value::Int(1)));
        assert_eq!(eval_bool(&vc.formula, &a), Ok(false));
    }

    #[test]
    fn test_booleans_and_closed_formulas() {
        let vc = VerificationCondition {
            kind: VcKind::Init,
            vars: vec![Binder::new("b", Sort::Bool)],
            formula: Term::or([Term::id("b"), Term::not(Term::id("b"))]),
        };
        assert_eq!(BoundedOracle::new(1).decide(&vc), Decision::Valid);
        let vc = VerificationCondition {
            kind: VcKind::Init,
            vars: vec![],
            formula: Term::false_(),
        };
        assert!(matches!(
            BoundedOracle::new(1).decide(&vc),
            Decision::Invalid(a) if a.is_empty()
        ));
    }

    #[test]
    fn test_too_many_assignments_is_unknown() {
        let vc = VerificationCondition {
            kind: VcKind::Init,
            vars: int_vars(&["a", "b", "c", "d"]),
            formula: Term::true_(),
        };
        assert!(matches!(
            BoundedOracle::new(1000).decide(&vc),
            Decision::Unknown(_)
        ));
    }
}
