// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! An oracle backed by an SMT solver (Z3 or CVC5) running as a child process.
//!
//! Each query launches a fresh solver, declares the condition's variables,
//! asserts the negated condition and checks satisfiability. A satisfying
//! model of the negation is a counterexample, which is read back with
//! `get-value`.

use std::{
    path::PathBuf,
    sync::mpsc,
    thread,
    time::{Duration, Instant},
};

use smtlib::{
    conf::{CvcConf, SolverCmd, Z3Conf},
    proc::{SatResp, SmtProc, SolverError},
    sexp::{app, atom_s, Sexp},
};
use sygus::{
    logic::Logic,
    printer,
    semantics::{Assignment, Value},
    syntax::Sort,
};

use crate::{
    basics::{Decision, Oracle, VerificationCondition},
    timing,
};

/// The type of solver being used
#[allow(missing_docs)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SolverType {
    Z3,
    Cvc5,
}

/// Configuration for launching the solver behind an [`SmtOracle`].
#[derive(Debug, Clone)]
pub struct OracleConf {
    solver_type: SolverType,
    bin: String,
    logic: Logic,
    timeout: Option<Duration>,
    seed: usize,
    tee: Option<PathBuf>,
}

impl OracleConf {
    /// Create a configuration for a given type of solver and with a path to
    /// the solver binary.
    pub fn new(solver_type: SolverType, bin: &str, logic: Logic) -> Self {
        Self {
            solver_type,
            bin: bin.to_string(),
            logic,
            timeout: None,
            seed: 0,
            tee: None,
        }
    }

    /// Set the per-query timeout. None disables the timeout.
    pub fn timeout(&mut self, timeout: Option<Duration>) -> &mut Self {
        self.timeout = timeout;
        return self;
    }

    /// Set the solver's random seed.
    pub fn seed(&mut self, seed: usize) -> &mut Self {
        self.seed = seed;
        return self;
    }

    /// Save every query to a file in this directory.
    pub fn tee(&mut self, dir: Option<PathBuf>) -> &mut Self {
        self.tee = dir;
        return self;
    }

    /// Get the solver type.
    pub fn get_solver_type(&self) -> SolverType {
        self.solver_type
    }

    fn timeout_ms(&self) -> Option<usize> {
        self.timeout
            .map(|t| usize::try_from(t.as_millis()).unwrap_or(usize::MAX))
    }

    fn cmd(&self) -> SolverCmd {
        match self.solver_type {
            SolverType::Z3 => {
                let mut conf = Z3Conf::new(&self.bin);
                conf.timeout_ms(self.timeout_ms());
                if self.seed != 0 {
                    conf.seed(self.seed);
                }
                conf.options().logic(self.logic.smt_logic());
                conf.done()
            }
            SolverType::Cvc5 => {
                let mut conf = CvcConf::new_cvc5(&self.bin);
                conf.timeout_ms(self.timeout_ms());
                if self.seed != 0 {
                    conf.seed(self.seed);
                }
                conf.options().logic(self.logic.smt_logic());
                conf.done()
            }
        }
    }
}

/// A validity oracle that asks an SMT solver.
#[derive(Debug, Clone)]
pub struct SmtOracle {
    conf: OracleConf,
}

/// Kills the solver if the query runs past its deadline.
struct Watchdog {
    done: mpsc::Sender<()>,
}

impl Watchdog {
    fn start(solver: &SmtProc, timeout: Duration) -> Self {
        let pid = solver.pid();
        let (done, finished) = mpsc::channel::<()>();
        thread::spawn(move || {
            if let Err(mpsc::RecvTimeoutError::Timeout) = finished.recv_timeout(timeout) {
                log::debug!("oracle query timed out after {}ms", timeout.as_millis());
                pid.kill();
            }
        });
        Self { done }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        // the watchdog thread may have already exited
        _ = self.done.send(());
    }
}

fn timeout_label(timeout: Option<Duration>) -> String {
    match timeout {
        Some(t) => format!("{t:?}"),
        None => "none".to_string(),
    }
}

fn parse_value(sort: Sort, v: &Sexp) -> Option<Value> {
    match sort {
        Sort::Bool => v.bool().map(Value::Bool),
        Sort::Int => v.int().map(Value::Int),
    }
}

impl SmtOracle {
    /// Create an oracle, checking that the solver can be launched.
    pub fn new(conf: OracleConf) -> Result<Self, SolverError> {
        let mut solver = SmtProc::new(conf.cmd(), None)?;
        solver.check_sat()?;
        Ok(Self { conf })
    }

    fn check(&self, vc: &VerificationCondition) -> Result<Decision, SolverError> {
        let mut solver = SmtProc::new(self.conf.cmd(), self.conf.tee.as_deref())?;
        solver.comment_with(|| format!("{} condition", vc.kind));
        for b in &vc.vars {
            solver.send(&app("declare-const", [atom_s(&b.name), printer::sort(b.sort)]));
        }
        solver.send(&app("assert", [app("not", [printer::term(&vc.formula)])]));

        let watchdog = self.conf.timeout.map(|t| Watchdog::start(&solver, t));
        let resp = solver.check_sat();
        drop(watchdog);
        let decision = match resp? {
            SatResp::Unsat => Decision::Valid,
            SatResp::Unknown(reason) => Decision::Unknown(reason),
            SatResp::Sat => {
                let names = vc.vars.iter().map(|b| atom_s(&b.name)).collect::<Vec<_>>();
                let values = solver.get_values(&names)?;
                let mut assignment = Assignment::new();
                for (b, (_, v)) in vc.vars.iter().zip(&values) {
                    let value = parse_value(b.sort, v).ok_or_else(|| {
                        SolverError::BadResponse(format!("value {v} for {}", b.name))
                    })?;
                    assignment.insert(b.name.clone(), value);
                }
                if assignment.len() != vc.vars.len() {
                    return Err(SolverError::BadResponse(
                        "missing values in model".to_string(),
                    ));
                }
                Decision::Invalid(assignment)
            }
        };
        if self.conf.tee.is_some() {
            solver.save_tee();
        }
        Ok(decision)
    }
}

impl Oracle for SmtOracle {
    fn decide(&self, vc: &VerificationCondition) -> Decision {
        let start: Instant = timing::start();
        let decision = match self.check(vc) {
            Ok(decision) => decision,
            Err(SolverError::Killed) => Decision::Unknown("timeout".to_string()),
            Err(err) => Decision::Unknown(format!("solver failed: {err}")),
        };
        timing::elapsed(timing::TimeType::of(&decision), start);
        log::debug!(
            "            {:?}(timeout={}) returned {decision} for {} condition after {:?}",
            self.conf.solver_type,
            timeout_label(self.conf.timeout),
            vc.kind,
            start.elapsed(),
        );
        decision
    }
}

#[cfg(test)]
mod tests {
    use std::{
        env, fs,
        os::unix::fs::PermissionsExt,
        path::PathBuf,
        process,
        time::{Duration, Instant},
    };

    use smtlib::path::solver_path;
    use sygus::{
        logic::Logic,
        semantics::{eval_bool, Value},
        syntax::{Binder, NumOp, NumRel, Sort, Term},
    };

    use super::{timeout_label, OracleConf, SmtOracle, SolverType};
    use crate::basics::{Decision, Oracle, VcKind, VerificationCondition};

    fn z3(logic: Logic) -> Option<SmtOracle> {
        let mut conf = OracleConf::new(SolverType::Z3, &solver_path("z3"), logic);
        conf.timeout(Some(Duration::from_secs(10)));
        match SmtOracle::new(conf) {
            Ok(oracle) => Some(oracle),
            Err(_) => {
                eprintln!("could not find z3, skipping test");
                None
            }
        }
    }

    fn step_vc(post: Term) -> VerificationCondition {
        let (x, y) = (Term::id("x"), Term::id("x'"));
        VerificationCondition {
            kind: VcKind::Step,
            vars: vec![Binder::new("x", Sort::Int), Binder::new("x'", Sort::Int)],
            formula: Term::implies(
                Term::and([
                    Term::num_rel(NumRel::Leq, &x, Term::int(10)),
                    Term::ite(
                        Term::num_rel(NumRel::Lt, &x, Term::int(10)),
                        Term::equals(&y, Term::num_op(NumOp::Add, &x, Term::int(1))),
                        Term::equals(&y, &x),
                    ),
                ]),
                post,
            ),
        }
    }

    #[test]
    fn test_z3_valid() {
        let Some(oracle) = z3(Logic::Lia) else { return };
        let vc = step_vc(Term::num_rel(NumRel::Leq, Term::id("x'"), Term::int(10)));
        assert_eq!(oracle.decide(&vc), Decision::Valid);
    }

    #[test]
    fn test_z3_counterexample() {
        let Some(oracle) = z3(Logic::Lia) else { return };
        let vc = step_vc(Term::num_rel(NumRel::Leq, Term::id("x'"), Term::int(5)));
        let Decision::Invalid(a) = oracle.decide(&vc) else {
            panic!("expected a counterexample")
        };
        assert!(matches!(a.get("x'"), Some(Value::Int(_))));
        // the assignment really falsifies the condition
        assert_eq!(eval_bool(&vc.formula, &a), Ok(false));
    }

    /// A stand-in solver that answers the launch check but never answers a
    /// query with assertions.
    fn silent_solver() -> PathBuf {
        let path = env::temp_dir().join(format!("invsyn-silent-solver-{}", process::id()));
        let script = r#"#!/bin/sh
while read -r line; do
  case "$line" in
    "(assert"*) exec sleep 600 ;;
    "(check-sat)") echo sat ;;
    "(echo"*) echo '<<DONE>>' ;;
  esac
done
"#;
        fs::write(&path, script).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn test_timeout_is_unknown() {
        let bin = silent_solver();
        let mut conf = OracleConf::new(SolverType::Z3, bin.to_str().unwrap(), Logic::Lia);
        conf.timeout(Some(Duration::from_millis(200)));
        let oracle = SmtOracle::new(conf).unwrap();
        let vc = step_vc(Term::num_rel(NumRel::Leq, Term::id("x'"), Term::int(10)));
        let start = Instant::now();
        assert_eq!(oracle.decide(&vc), Decision::Unknown("timeout".to_string()));
        assert!(start.elapsed() < Duration::from_secs(60));
        _ = fs::remove_file(bin);
    }

    #[test]
    fn test_timeout_label() {
        assert_eq!(timeout_label(Some(Duration::from_millis(500))), "500ms");
        assert_eq!(timeout_label(Some(Duration::from_secs(30))), "30s");
        assert_eq!(timeout_label(None), "none");
    }

    #[test]
    fn test_missing_solver_is_an_error() {
        let conf = OracleConf::new(SolverType::Cvc5, "/nonexistent/cvc5", Logic::Lia);
        assert!(SmtOracle::new(conf).is_err());
    }
}
