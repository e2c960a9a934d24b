// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! The interface between the synthesizer and a validity oracle.

use serde::Serialize;
use std::fmt;

use sygus::{
    semantics::{assignment_to_string, Assignment},
    syntax::{Binder, Term},
};

/// Which of the three inductive-invariant conditions a formula encodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum VcKind {
    /// `pre => inv`
    Init,
    /// `inv /\ trans => inv'`
    Step,
    /// `inv => post`
    Safety,
}

impl VcKind {
    /// All kinds, in the order they are checked.
    pub const ALL: [VcKind; 3] = [VcKind::Init, VcKind::Step, VcKind::Safety];
}

impl fmt::Display for VcKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VcKind::Init => "init",
            VcKind::Step => "step",
            VcKind::Safety => "safety",
        };
        write!(f, "{s}")
    }
}

/// A closed formula whose validity is to be decided, with its free variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationCondition {
    #[allow(missing_docs)]
    pub kind: VcKind,
    /// The variables the formula is implicitly universally quantified over
    pub vars: Vec<Binder>,
    #[allow(missing_docs)]
    pub formula: Term,
}

/// The answer of an oracle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The formula holds for every assignment.
    Valid,
    /// The formula is false under this assignment of all of its variables.
    Invalid(Assignment),
    /// The oracle could not decide, for the given reason.
    Unknown(String),
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Valid => write!(f, "valid"),
            Decision::Invalid(a) => write!(f, "invalid ({})", assignment_to_string(a)),
            Decision::Unknown(reason) => write!(f, "unknown ({reason})"),
        }
    }
}

/// A decision procedure for the validity of verification conditions.
///
/// Oracles are assumed sound: `Valid` means the formula holds for all values
/// of its variables, and an `Invalid` assignment really falsifies it.
/// Implementations must be usable from several threads at once, since the
/// conditions for one candidate may be checked concurrently.
pub trait Oracle: Sync + Send {
    /// Decide whether the condition is valid.
    fn decide(&self, vc: &VerificationCondition) -> Decision;
}

impl<O: Oracle + ?Sized> Oracle for &O {
    fn decide(&self, vc: &VerificationCondition) -> Decision {
        (**self).decide(vc)
    }
}

impl<O: Oracle + ?Sized> Oracle for Box<O> {
    fn decide(&self, vc: &VerificationCondition) -> Decision {
        (**self).decide(vc)
    }
}
