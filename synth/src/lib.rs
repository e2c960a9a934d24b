// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Counterexample-guided synthesis of inductive loop invariants.
//!
//! Candidates are enumerated from a grammar in order of size, filtered
//! against the counterexamples collected so far, and checked by an
//! [`oracle::basics::Oracle`] against the three conditions of an inductive
//! invariant. [`context::SynthContext`] is the entry point for declaring a
//! problem and solving it.

// configure clippy
#![allow(clippy::needless_return)]
#![allow(clippy::large_enum_variant)]
#![allow(clippy::upper_case_acronyms)]
#![allow(clippy::type_complexity)]
#![deny(clippy::uninlined_format_args)]
// documentation-related lints (only checked when running rustdoc)
#![warn(missing_docs)]
#![allow(rustdoc::private_intra_doc_links)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod cex;
pub mod constraints;
pub mod context;
pub mod enumerate;
pub mod error;
pub mod grammar;
pub mod synthesizer;
