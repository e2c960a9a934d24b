// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! The counterexample-guided synthesis loop.
//!
//! Each step draws one candidate from the enumerator. A candidate that some
//! stored counterexample already rules out is dropped without asking the
//! oracle. Otherwise the three verification conditions are checked; every
//! counterexample returned is stored, and a candidate for which all three
//! are valid is the answer.

use std::{
    fmt,
    time::{Duration, Instant},
};

use serde::Serialize;

use oracle::basics::{Decision, Oracle, VcKind, VerificationCondition};
use sygus::syntax::Term;

use crate::{
    cex::{Counterexample, CounterexampleStore},
    constraints::{build, TransitionSystem},
    enumerate::Enumerator,
    grammar::Grammar,
};

/// Limits and options for one synthesis attempt.
#[derive(Debug, Clone, Default)]
pub struct SynthConfig {
    /// Give up after drawing this many candidates.
    pub max_iterations: Option<usize>,
    /// Give up after this much wall-clock time.
    pub timeout: Option<Duration>,
    /// Only enumerate candidates up to this size.
    pub max_candidate_size: Option<usize>,
    /// Check the three conditions of a candidate concurrently.
    pub parallel_vcs: bool,
}

/// Why an attempt gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// The iteration or time budget ran out.
    Timeout,
}

/// The state of a synthesis attempt. Every state but `Searching` is final.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynthState {
    /// Still drawing candidates.
    Searching,
    /// An inductive invariant, with all three conditions confirmed valid.
    Found(Term),
    /// Every candidate in the grammar was ruled out.
    Exhausted,
    /// The oracle could not decide a condition.
    Unknown(String),
    #[allow(missing_docs)]
    Failed(Failure),
}

/// Counters for one synthesis attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SynthStats {
    /// Candidates drawn from the enumerator
    pub candidates: usize,
    /// Candidates ruled out by a stored counterexample
    pub rejected_by_store: usize,
    /// Conditions sent to the oracle
    pub oracle_queries: usize,
    /// Counterexamples recorded
    pub counterexamples: usize,
}

impl fmt::Display for SynthStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} candidates, {} rejected by counterexamples, {} oracle queries, {} counterexamples",
            self.candidates, self.rejected_by_store, self.oracle_queries, self.counterexamples
        )
    }
}

/// One synthesis attempt over a fixed transition system, grammar and oracle.
pub struct Synthesizer<'a, O: Oracle> {
    ts: &'a TransitionSystem,
    oracle: &'a O,
    config: SynthConfig,
    enumerator: Enumerator<'a>,
    store: CounterexampleStore,
    state: SynthState,
    stats: SynthStats,
    start: Instant,
    last_size: usize,
}

impl<'a, O: Oracle> Synthesizer<'a, O> {
    /// Start an attempt. The wall-clock budget starts counting now.
    pub fn new(
        ts: &'a TransitionSystem,
        grammar: &'a Grammar,
        oracle: &'a O,
        config: SynthConfig,
    ) -> Self {
        let enumerator = Enumerator::new(grammar, config.max_candidate_size);
        Self {
            ts,
            oracle,
            config,
            enumerator,
            store: CounterexampleStore::new(),
            state: SynthState::Searching,
            stats: SynthStats::default(),
            start: Instant::now(),
            last_size: 0,
        }
    }

    #[allow(missing_docs)]
    pub fn state(&self) -> &SynthState {
        &self.state
    }

    #[allow(missing_docs)]
    pub fn stats(&self) -> SynthStats {
        self.stats
    }

    /// The counterexamples found so far.
    pub fn store(&self) -> &CounterexampleStore {
        &self.store
    }

    fn out_of_budget(&self) -> bool {
        self.config
            .max_iterations
            .map_or(false, |max| self.stats.candidates >= max)
            || self
                .config
                .timeout
                .map_or(false, |t| self.start.elapsed() >= t)
    }

    fn check(&self, vcs: &[VerificationCondition; 3]) -> Vec<(VcKind, Decision)> {
        let oracle = self.oracle;
        if self.config.parallel_vcs {
            let [init, step, safety] = vcs;
            let (init, (step, safety)) = rayon::join(
                || oracle.decide(init),
                || rayon::join(|| oracle.decide(step), || oracle.decide(safety)),
            );
            return vec![
                (VcKind::Init, init),
                (VcKind::Step, step),
                (VcKind::Safety, safety),
            ];
        }
        let mut decisions = vec![];
        for vc in vcs {
            let decision = oracle.decide(vc);
            let valid = decision == Decision::Valid;
            decisions.push((vc.kind, decision));
            if !valid {
                break;
            }
        }
        decisions
    }

    /// Draw and process one candidate. Does nothing in a final state.
    pub fn step(&mut self) -> &SynthState {
        if self.state != SynthState::Searching {
            return &self.state;
        }
        if self.out_of_budget() {
            log::info!("out of budget after {}", self.stats);
            self.state = SynthState::Failed(Failure::Timeout);
            return &self.state;
        }
        let Some(candidate) = self.enumerator.next() else {
            log::info!("candidates exhausted after {}", self.stats);
            self.state = SynthState::Exhausted;
            return &self.state;
        };
        self.stats.candidates += 1;
        if self.enumerator.size() > self.last_size {
            self.last_size = self.enumerator.size();
            log::info!(
                "searching candidates of size {} ({})",
                self.last_size,
                self.stats
            );
        }

        if let Some(cex) = self.store.first_violated(self.ts, &candidate) {
            log::trace!("{candidate} ruled out by {cex}");
            self.stats.rejected_by_store += 1;
            return &self.state;
        }

        log::debug!("candidate #{}: {candidate}", self.stats.candidates);
        let vcs = build(self.ts, &candidate);
        let decisions = self.check(&vcs);
        self.stats.oracle_queries += decisions.len();

        if let Some((kind, reason)) = decisions.iter().find_map(|(kind, d)| match d {
            Decision::Unknown(reason) => Some((kind, reason)),
            _ => None,
        }) {
            log::info!("oracle returned unknown for {kind} condition of {candidate}: {reason}");
            self.state = SynthState::Unknown(format!("{kind} condition: {reason}"));
            return &self.state;
        }

        let mut all_valid = decisions.len() == VcKind::ALL.len();
        for (kind, decision) in decisions {
            if let Decision::Invalid(assignment) = decision {
                let cex = Counterexample { kind, assignment };
                log::debug!("    counterexample {cex}");
                self.store.record(cex);
                self.stats.counterexamples += 1;
                all_valid = false;
            }
        }
        if all_valid {
            log::info!("found invariant {candidate} after {}", self.stats);
            self.state = SynthState::Found(candidate);
        }
        &self.state
    }

    /// Step until a final state is reached.
    pub fn run(&mut self) -> &SynthState {
        while self.state == SynthState::Searching {
            self.step();
        }
        &self.state
    }
}
