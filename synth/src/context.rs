// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Declaring an invariant synthesis problem and solving it.
//!
//! A [`SynthContext`] collects definitions, functions to synthesize and one
//! invariant constraint, checking each as it is added. [`SynthContext::check_synth`]
//! then runs a [`Synthesizer`] to completion.

use serde::Serialize;
use std::{collections::HashMap, fmt};

use oracle::basics::Oracle;
use sygus::{
    logic::{Logic, LogicError},
    parser::GrammarDef,
    sorts,
    subst::{inline_defs, prime_name},
    syntax::{Binder, FunDef, Signature, Sort, Term},
};

use crate::{
    constraints::TransitionSystem,
    enumerate::Enumerator,
    error::ConfigError,
    grammar::{Grammar, GrammarBuilder},
    synthesizer::{Failure, SynthConfig, SynthState, SynthStats, Synthesizer},
};

/// Options fixed when a context is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    /// Must be true: problems are SyGuS synthesis problems.
    pub sygus: bool,
    /// Must be false: solving again after adding constraints is not
    /// supported.
    pub incremental: bool,
    /// The background theory for definitions, grammars and the oracle.
    pub logic: Logic,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            sygus: true,
            incremental: false,
            logic: Logic::Lia,
        }
    }
}

/// The outcome of [`SynthContext::check_synth`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SynthStatus {
    /// An invariant was found and verified.
    HasSolution,
    /// The candidate space was exhausted.
    NoSolution,
    /// The oracle could not decide some condition.
    Unknown,
    /// The iteration or time budget ran out.
    Timeout,
}

impl fmt::Display for SynthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SynthStatus::HasSolution => "has solution",
            SynthStatus::NoSolution => "no solution",
            SynthStatus::Unknown => "unknown",
            SynthStatus::Timeout => "timeout",
        };
        write!(f, "{s}")
    }
}

/// The status of a synthesis call with the statistics of the attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SynthResult {
    #[allow(missing_docs)]
    pub status: SynthStatus,
    /// Why the oracle could not decide, for [`SynthStatus::Unknown`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[allow(missing_docs)]
    pub stats: SynthStats,
}

#[derive(Debug, Clone)]
struct SynthFun {
    name: String,
    params: Vec<Binder>,
    grammar: Option<GrammarBuilder>,
}

#[derive(Debug, Clone)]
struct InvConstraint {
    inv: usize,
    pre: FunDef,
    trans: FunDef,
    post: FunDef,
}

/// A synthesis problem under construction.
#[derive(Debug, Clone)]
pub struct SynthContext {
    options: Options,
    sig: Signature,
    defs: HashMap<String, FunDef>,
    synth_funs: Vec<SynthFun>,
    constraint: Option<InvConstraint>,
    solutions: Option<Vec<FunDef>>,
}

impl SynthContext {
    /// Create an empty problem.
    pub fn new(options: Options) -> Result<Self, ConfigError> {
        if !options.sygus {
            return Err(ConfigError::SygusDisabled);
        }
        if options.incremental {
            return Err(ConfigError::Incremental);
        }
        Ok(Self {
            options,
            sig: Signature::default(),
            defs: HashMap::new(),
            synth_funs: vec![],
            constraint: None,
            solutions: None,
        })
    }

    #[allow(missing_docs)]
    pub fn logic(&self) -> Logic {
        self.options.logic
    }

    fn check_fresh(&self, name: &str) -> Result<(), ConfigError> {
        if self.sig.contains(name) || self.synth_funs.iter().any(|f| f.name == name) {
            return Err(ConfigError::Redeclared(name.to_string()));
        }
        Ok(())
    }

    fn check_params(&self, name: &str, params: &[Binder]) -> Result<(), ConfigError> {
        sorts::context(params).map_err(|err| ConfigError::Sort {
            name: name.to_string(),
            err,
        })?;
        if !self.options.logic.has_ints() && params.iter().any(|b| b.sort == Sort::Int) {
            return Err(ConfigError::Logic {
                name: name.to_string(),
                err: LogicError {
                    logic: self.options.logic,
                    op: "integer arithmetic".to_string(),
                },
            });
        }
        Ok(())
    }

    /// Define a function. The body may only mention the parameters and
    /// earlier definitions, which are inlined.
    pub fn define_fun(
        &mut self,
        name: &str,
        params: &[Binder],
        ret: Sort,
        body: Term,
    ) -> Result<(), ConfigError> {
        self.check_fresh(name)?;
        self.check_params(name, params)?;
        let def = FunDef {
            name: name.to_string(),
            params: params.to_vec(),
            ret,
            body,
        };
        sorts::check_fun_def(&self.sig, &def).map_err(|err| ConfigError::Sort {
            name: name.to_string(),
            err,
        })?;
        self.options
            .logic
            .admits(&def.body)
            .map_err(|err| ConfigError::Logic {
                name: name.to_string(),
                err,
            })?;
        let def = FunDef {
            body: inline_defs(&def.body, &self.defs),
            ..def
        };
        log::debug!("defined {def}");
        self.sig.add(def.decl());
        self.defs.insert(def.name.clone(), def);
        Ok(())
    }

    fn declare_synth_fun(
        &mut self,
        name: &str,
        params: &[Binder],
        ret: Sort,
        grammar: Option<GrammarBuilder>,
    ) -> Result<(), ConfigError> {
        self.check_fresh(name)?;
        if ret != Sort::Bool {
            return Err(ConfigError::NotPredicate {
                name: name.to_string(),
                found: ret,
            });
        }
        self.check_params(name, params)?;
        self.synth_funs.push(SynthFun {
            name: name.to_string(),
            params: params.to_vec(),
            grammar,
        });
        Ok(())
    }

    /// Declare a predicate to synthesize, with the default grammar for its
    /// parameters.
    pub fn synth_fun(&mut self, name: &str, params: &[Binder], ret: Sort) -> Result<(), ConfigError> {
        self.declare_synth_fun(name, params, ret, None)
    }

    /// Declare a predicate to synthesize from a user grammar, which is
    /// checked now.
    pub fn synth_fun_with_grammar(
        &mut self,
        name: &str,
        params: &[Binder],
        ret: Sort,
        grammar: &GrammarDef,
    ) -> Result<(), ConfigError> {
        let grammar_err = |err| ConfigError::Grammar {
            name: name.to_string(),
            err,
        };
        let builder =
            GrammarBuilder::from_def(params, self.options.logic, grammar).map_err(grammar_err)?;
        builder.build(&Default::default()).map_err(grammar_err)?;
        self.declare_synth_fun(name, params, ret, Some(builder))
    }

    fn predicate(&self, name: &str, expected: Vec<Sort>) -> Result<FunDef, ConfigError> {
        let Some(def) = self.defs.get(name) else {
            if self.synth_funs.iter().any(|f| f.name == name) {
                return Err(ConfigError::UnknownFunction(format!(
                    "{name} (functions to synthesize cannot be used here)"
                )));
            }
            return Err(ConfigError::UnknownFunction(name.to_string()));
        };
        if def.ret != Sort::Bool {
            return Err(ConfigError::NotPredicate {
                name: name.to_string(),
                found: def.ret,
            });
        }
        if def.param_sorts() != expected {
            return Err(ConfigError::SignatureMismatch {
                name: name.to_string(),
                expected,
                found: def.param_sorts(),
            });
        }
        Ok(def.clone())
    }

    /// Register the constraint that `inv` is an inductive invariant of the
    /// transition system with initial states `pre`, transition relation
    /// `trans` and safe states `post`. Only one constraint is allowed.
    pub fn add_inv_constraint(
        &mut self,
        inv: &str,
        pre: &str,
        trans: &str,
        post: &str,
    ) -> Result<(), ConfigError> {
        if self.constraint.is_some() {
            return Err(ConfigError::DuplicateConstraint);
        }
        let Some(index) = self.synth_funs.iter().position(|f| f.name == inv) else {
            if self.defs.contains_key(inv) {
                return Err(ConfigError::NotSynthFun(inv.to_string()));
            }
            return Err(ConfigError::UnknownFunction(inv.to_string()));
        };
        let params = &self.synth_funs[index].params;
        for b in params {
            let primed = prime_name(&b.name);
            if params.iter().any(|other| other.name == primed) {
                return Err(ConfigError::PrimedClash(primed));
            }
        }
        let sorts = params.iter().map(|b| b.sort).collect::<Vec<_>>();
        let twice = [sorts.clone(), sorts.clone()].concat();
        let constraint = InvConstraint {
            inv: index,
            pre: self.predicate(pre, sorts.clone())?,
            trans: self.predicate(trans, twice)?,
            post: self.predicate(post, sorts)?,
        };
        self.constraint = Some(constraint);
        Ok(())
    }

    fn grammar_for(&self, f: &SynthFun, ts: &TransitionSystem) -> Result<Grammar, ConfigError> {
        let constants = ts.constants();
        match &f.grammar {
            Some(builder) => builder
                .build(&constants)
                .map_err(|err| ConfigError::Grammar {
                    name: f.name.clone(),
                    err,
                }),
            None => Ok(Grammar::default_for(
                &f.params,
                self.options.logic,
                &constants,
            )),
        }
    }

    /// Search for an invariant satisfying the registered constraint.
    ///
    /// On [`SynthStatus::HasSolution`] the solution is available from
    /// [`Self::synth_solutions`]. Functions to synthesize that the constraint
    /// does not mention get the first term of their grammar.
    pub fn check_synth<O: Oracle>(
        &mut self,
        oracle: &O,
        config: &SynthConfig,
    ) -> Result<SynthResult, ConfigError> {
        self.solutions = None;
        let Some(constraint) = &self.constraint else {
            return Err(ConfigError::MissingConstraint);
        };
        let inv = &self.synth_funs[constraint.inv];
        let ts = TransitionSystem::from_defs(
            &inv.params,
            &constraint.pre,
            &constraint.trans,
            &constraint.post,
        );
        let grammar = self.grammar_for(inv, &ts)?;
        log::info!(
            "synthesizing {} over {} with {} constants",
            inv.name,
            self.options.logic,
            ts.constants().len()
        );

        let mut synth = Synthesizer::new(&ts, &grammar, oracle, config.clone());
        let state = synth.run().clone();
        let stats = synth.stats();
        let (status, reason) = match state {
            SynthState::Found(body) => {
                let mut solutions = vec![];
                for (i, f) in self.synth_funs.iter().enumerate() {
                    let body = if i == constraint.inv {
                        body.clone()
                    } else {
                        let g = self.grammar_for(f, &ts)?;
                        let first = Enumerator::new(&g, None).next();
                        first.unwrap_or_else(Term::true_)
                    };
                    solutions.push(FunDef {
                        name: f.name.clone(),
                        params: f.params.clone(),
                        ret: Sort::Bool,
                        body,
                    });
                }
                self.solutions = Some(solutions);
                (SynthStatus::HasSolution, None)
            }
            SynthState::Exhausted => (SynthStatus::NoSolution, None),
            SynthState::Unknown(reason) => (SynthStatus::Unknown, Some(reason)),
            SynthState::Failed(Failure::Timeout) => (SynthStatus::Timeout, None),
            SynthState::Searching => unreachable!("synthesis stopped while still searching"),
        };
        log::info!("{status} ({stats})");
        Ok(SynthResult {
            status,
            reason,
            stats,
        })
    }

    /// The definitions found by the last successful [`Self::check_synth`],
    /// one per function to synthesize, in declaration order.
    pub fn synth_solutions(&self) -> Result<&[FunDef], ConfigError> {
        self.solutions.as_deref().ok_or(ConfigError::NoSolution)
    }
}

#[cfg(test)]
mod tests {
    use sygus::{
        logic::Logic,
        parser::{GrammarDef, GrammarRule, NonterminalDef},
        syntax::{Binder, NumOp, NumRel, Sort, Term},
    };

    use super::{Options, SynthContext};
    use crate::{error::ConfigError, grammar::GrammarError};

    fn x() -> Vec<Binder> {
        vec![Binder::new("x", Sort::Int)]
    }

    fn xy() -> Vec<Binder> {
        vec![Binder::new("x", Sort::Int), Binder::new("x!1", Sort::Int)]
    }

    fn declare_counter(ctx: &mut SynthContext) {
        let v = Term::id("x");
        ctx.synth_fun("inv-f", &x(), Sort::Bool).unwrap();
        ctx.define_fun("pre-f", &x(), Sort::Bool, Term::equals(&v, Term::int(0)))
            .unwrap();
        ctx.define_fun(
            "trans-f",
            &xy(),
            Sort::Bool,
            Term::equals(
                Term::id("x!1"),
                Term::num_op(NumOp::Add, &v, Term::int(1)),
            ),
        )
        .unwrap();
        ctx.define_fun(
            "post-f",
            &x(),
            Sort::Bool,
            Term::num_rel(NumRel::Geq, &v, Term::int(0)),
        )
        .unwrap();
    }

    #[test]
    fn test_options() {
        let opts = Options {
            sygus: false,
            ..Default::default()
        };
        assert_eq!(SynthContext::new(opts).err(), Some(ConfigError::SygusDisabled));
        let opts = Options {
            incremental: true,
            ..Default::default()
        };
        assert_eq!(SynthContext::new(opts).err(), Some(ConfigError::Incremental));
    }

    #[test]
    fn test_second_constraint() {
        let mut ctx = SynthContext::new(Options::default()).unwrap();
        declare_counter(&mut ctx);
        ctx.add_inv_constraint("inv-f", "pre-f", "trans-f", "post-f")
            .unwrap();
        assert_eq!(
            ctx.add_inv_constraint("inv-f", "pre-f", "trans-f", "post-f"),
            Err(ConfigError::DuplicateConstraint)
        );
    }

    #[test]
    fn test_constraint_signatures() {
        let mut ctx = SynthContext::new(Options::default()).unwrap();
        declare_counter(&mut ctx);
        assert_eq!(
            ctx.add_inv_constraint("inv-f", "pre-f", "pre-f", "post-f"),
            Err(ConfigError::SignatureMismatch {
                name: "pre-f".to_string(),
                expected: vec![Sort::Int, Sort::Int],
                found: vec![Sort::Int],
            })
        );
        assert_eq!(
            ctx.add_inv_constraint("pre-f", "pre-f", "trans-f", "post-f"),
            Err(ConfigError::NotSynthFun("pre-f".to_string()))
        );
        assert_eq!(
            ctx.add_inv_constraint("inv-f", "pre-f", "trans-f", "nope"),
            Err(ConfigError::UnknownFunction("nope".to_string()))
        );
        // nothing was registered by the failed calls
        assert!(ctx
            .add_inv_constraint("inv-f", "pre-f", "trans-f", "post-f")
            .is_ok());
    }

    #[test]
    fn test_definition_errors() {
        let mut ctx = SynthContext::new(Options::default()).unwrap();
        declare_counter(&mut ctx);
        assert_eq!(
            ctx.define_fun("pre-f", &x(), Sort::Bool, Term::true_()),
            Err(ConfigError::Redeclared("pre-f".to_string()))
        );
        assert!(matches!(
            ctx.define_fun("bad", &x(), Sort::Bool, Term::id("x")),
            Err(ConfigError::Sort { .. })
        ));
        let square = Term::num_rel(
            NumRel::Geq,
            Term::num_op(NumOp::Mul, Term::id("x"), Term::id("x")),
            Term::int(0),
        );
        assert!(matches!(
            ctx.define_fun("square", &x(), Sort::Bool, square),
            Err(ConfigError::Logic { .. })
        ));
        assert!(matches!(
            ctx.synth_fun("inv-g", &x(), Sort::Int),
            Err(ConfigError::NotPredicate { .. })
        ));
    }

    #[test]
    fn test_core_rejects_integers() {
        let opts = Options {
            logic: Logic::Core,
            ..Default::default()
        };
        let mut ctx = SynthContext::new(opts).unwrap();
        assert!(matches!(
            ctx.synth_fun("inv-f", &x(), Sort::Bool),
            Err(ConfigError::Logic { .. })
        ));
    }

    #[test]
    fn test_primed_clash() {
        let mut ctx = SynthContext::new(Options::default()).unwrap();
        let params = vec![Binder::new("x", Sort::Int), Binder::new("x'", Sort::Int)];
        ctx.synth_fun("inv-f", &params, Sort::Bool).unwrap();
        let both = [params.clone(), params.clone()].concat();
        // parameter names of a definition must be distinct
        assert!(ctx
            .define_fun("trans-f", &both, Sort::Bool, Term::true_())
            .is_err());
        ctx.define_fun("p", &params, Sort::Bool, Term::true_()).unwrap();
        let renamed = (0..4)
            .map(|i| Binder::new(&format!("v{i}"), Sort::Int))
            .collect::<Vec<_>>();
        ctx.define_fun("t", &renamed, Sort::Bool, Term::true_())
            .unwrap();
        assert_eq!(
            ctx.add_inv_constraint("inv-f", "p", "t", "p"),
            Err(ConfigError::PrimedClash("x'".to_string()))
        );
    }

    #[test]
    fn test_bad_grammar() {
        let mut ctx = SynthContext::new(Options::default()).unwrap();
        let grammar = GrammarDef {
            nonterminals: vec![NonterminalDef {
                name: "I".to_string(),
                sort: Sort::Int,
                rules: vec![GrammarRule::Variable(Sort::Int)],
            }],
        };
        assert_eq!(
            ctx.synth_fun_with_grammar("inv-f", &x(), Sort::Bool, &grammar),
            Err(ConfigError::Grammar {
                name: "inv-f".to_string(),
                err: GrammarError::StartNotBool {
                    name: "I".to_string(),
                    sort: Sort::Int
                }
            })
        );
    }

    #[test]
    fn test_missing_constraint() {
        let mut ctx = SynthContext::new(Options::default()).unwrap();
        declare_counter(&mut ctx);
        let oracle = oracle::bounded::BoundedOracle::new(4);
        assert_eq!(
            ctx.check_synth(&oracle, &Default::default()),
            Err(ConfigError::MissingConstraint)
        );
        assert_eq!(ctx.synth_solutions(), Err(ConfigError::NoSolution));
    }
}
