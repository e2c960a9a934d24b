// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! The background theory a problem is stated in.

use serde::Serialize;
use std::{fmt, str::FromStr};
use thiserror::Error;

use crate::syntax::{NumOp, Term, UOp};

/// Selects the operators available in definitions, grammars and oracle
/// queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Logic {
    /// Linear integer arithmetic: multiplication needs a literal operand
    Lia,
    /// Non-linear integer arithmetic
    Nia,
    /// Booleans only
    Core,
}

/// A term used an operator outside of its logic.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{op} is not allowed in logic {logic}")]
pub struct LogicError {
    /// The logic that rejected the term
    pub logic: Logic,
    /// The offending operator
    pub op: String,
}

impl Logic {
    /// Whether integers are available at all.
    pub fn has_ints(&self) -> bool {
        !matches!(self, Logic::Core)
    }

    /// Whether `*` may be applied to two non-constant terms.
    pub fn is_nonlinear(&self) -> bool {
        matches!(self, Logic::Nia)
    }

    /// The quantifier-free SMT-LIB logic used for solver queries.
    pub fn smt_logic(&self) -> &'static str {
        match self {
            Logic::Lia => "QF_LIA",
            Logic::Nia => "QF_NIA",
            Logic::Core => "QF_UF",
        }
    }

    /// Check that every operator in the term is admitted by this logic.
    pub fn admits(&self, t: &Term) -> Result<(), LogicError> {
        let reject = |op: &str| {
            Err(LogicError {
                logic: *self,
                op: op.to_string(),
            })
        };
        match t {
            Term::Int(_) | Term::NumOp(..) | Term::NumRel(..) | Term::UnaryOp(UOp::Neg, _)
                if !self.has_ints() =>
            {
                return reject("integer arithmetic");
            }
            Term::NumOp(NumOp::Mul, lhs, rhs)
                if !self.is_nonlinear() && !is_constant(lhs) && !is_constant(rhs) =>
            {
                return reject("non-linear multiplication");
            }
            _ => {}
        }
        for child in t.children() {
            self.admits(child)?;
        }
        Ok(())
    }
}

fn is_constant(t: &Term) -> bool {
    match t {
        Term::Int(_) => true,
        Term::UnaryOp(UOp::Neg, t) => is_constant(t),
        _ => false,
    }
}

impl fmt::Display for Logic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Logic::Lia => "LIA",
            Logic::Nia => "NIA",
            Logic::Core => "CORE",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Logic {
    type Err = String;

    /// Accepts the SyGuS names, with or without the `QF_` prefix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.strip_prefix("QF_").unwrap_or(s) {
            "LIA" => Ok(Logic::Lia),
            "NIA" => Ok(Logic::Nia),
            "CORE" | "UF" => Ok(Logic::Core),
            _ => Err(format!("unsupported logic {s}")),
        }
    }
}
