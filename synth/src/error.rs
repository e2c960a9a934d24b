// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Errors in how a synthesis problem is declared.

use thiserror::Error;

use sygus::{logic::LogicError, sorts::SortError, syntax::Sort};

use crate::grammar::GrammarError;

/// A problem declaration that cannot be solved as given. All of these are
/// detected before any candidate is enumerated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Only SyGuS-style synthesis problems are supported.
    #[error("the sygus option must be enabled")]
    SygusDisabled,
    /// Incremental solving is not supported.
    #[error("incremental solving is not supported")]
    Incremental,
    /// A function name was defined or declared twice.
    #[error("{0} is already declared")]
    Redeclared(String),
    /// A constraint mentions a function that was never defined.
    #[error("unknown function {0}")]
    UnknownFunction(String),
    /// The invariant of a constraint is not a function to synthesize.
    #[error("{0} is not a function to synthesize")]
    NotSynthFun(String),
    /// Only one invariant constraint may be registered.
    #[error("an invariant constraint was already added")]
    DuplicateConstraint,
    /// Synthesis was requested without an invariant constraint.
    #[error("no invariant constraint was added")]
    MissingConstraint,
    /// A function used as a predicate returns a non-boolean sort.
    #[error("{name} must return Bool, but returns {found}")]
    NotPredicate {
        #[allow(missing_docs)]
        name: String,
        #[allow(missing_docs)]
        found: Sort,
    },
    /// A function in a constraint has the wrong parameter sorts.
    #[error("{name} should take ({}), but takes ({})", fmt_sorts(.expected), fmt_sorts(.found))]
    SignatureMismatch {
        #[allow(missing_docs)]
        name: String,
        #[allow(missing_docs)]
        expected: Vec<Sort>,
        #[allow(missing_docs)]
        found: Vec<Sort>,
    },
    /// A definition is not well sorted.
    #[error("in {name}: {err}")]
    Sort {
        #[allow(missing_docs)]
        name: String,
        #[allow(missing_docs)]
        err: SortError,
    },
    /// A definition uses an operator the logic does not allow.
    #[error("in {name}: {err}")]
    Logic {
        #[allow(missing_docs)]
        name: String,
        #[allow(missing_docs)]
        err: LogicError,
    },
    /// A user grammar is malformed.
    #[error("grammar for {name}: {err}")]
    Grammar {
        #[allow(missing_docs)]
        name: String,
        #[allow(missing_docs)]
        err: GrammarError,
    },
    /// A state variable's primed copy clashes with another name.
    #[error("the next-state copy {0} of an invariant parameter clashes with another name")]
    PrimedClash(String),
    /// Solutions were requested but synthesis did not find any.
    #[error("no solution is available")]
    NoSolution,
}

fn fmt_sorts(sorts: &[Sort]) -> String {
    sorts
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}
