//! # rustsat-hsd - Model-Based Diagnosis via Implicit Hitting Set Duality
//!
//! `rustsat-hsd` computes diagnoses of a system description against a set of
//! observations. A diagnosis is a set of components whose misbehaviour
//! explains every observed inconsistency. The search alternates between two
//! SAT-backed parties:
//!
//! - a hitting set enumerator ([`hitman::Hitman`]) proposing candidate
//!   diagnoses, either set-minimal ([`hitman::Strategy::Minimal`]) or of
//!   minimum weight ([`hitman::Strategy::Minimum`]), and
//! - a counterexample finder ([`coex::CoexFinder`]) that checks a candidate
//!   against every observation and, if it fails, returns a set of components
//!   at least one of which has to be part of every diagnosis.
//!
//! The [`diagnose::Diagnoser`] drives the loop between the two.
//!
//! All SAT reasoning goes through the incremental solver interface of
//! [`rustsat`], so any solver implementing
//! [`SolveIncremental`](rustsat::solvers::SolveIncremental) can be used.
//!
//! ## Crate Features
//!
//! - `fxhash`: use the faster hash maps of `rustsat`. On by default.
//! - `compression`: read `.gz`, `.bz2` and `.xz` compressed input files.
//!
//! ## Minimum Supported Rust Version (MSRV)
//!
//! Currently, the MSRV of this crate is 1.76.0.

#![warn(clippy::pedantic)]
#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]

use std::fmt;

use itertools::Itertools;
use rustsat::solvers::SolverResult;
use thiserror::Error;

pub mod coex;
pub mod diagnose;
pub mod encodings;
pub mod hitman;
pub mod instances;
pub mod types;

use hitman::McsAlgorithm;
use types::Element;

/// Errors specific to diagnosis
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The selected minimal correction set algorithm is not supported
    #[error("MCS algorithm `{0}` is currently unimplemented")]
    UnsupportedAlgorithm(McsAlgorithm),
    /// A selector that is not a positive variable id
    #[error("invalid selector {0}: selectors must be positive variable ids")]
    InvalidSelector(Element),
    /// The SAT oracle was interrupted
    #[error("the SAT oracle was interrupted")]
    Interrupted,
    /// Enumerating only the best diagnoses needs the weighted strategy
    #[error("enumerating the best diagnoses requires sorted mode")]
    BestRequiresSorted,
    /// Could not parse an option value
    #[error("invalid {what} `{value}`")]
    InvalidValue {
        /// The option that was being parsed
        what: &'static str,
        /// The rejected value
        value: String,
    },
}

/// Turns an oracle result into satisfiability, treating an interrupted oracle
/// as an error
pub(crate) fn is_sat(res: SolverResult) -> anyhow::Result<bool> {
    match res {
        SolverResult::Sat => Ok(true),
        SolverResult::Unsat => Ok(false),
        SolverResult::Interrupted => Err(Error::Interrupted.into()),
    }
}

/// Formats a set of elements as a space separated list
pub(crate) struct DisplaySet<'a>(pub &'a [Element]);

impl fmt::Display for DisplaySet<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.iter().format(" "))
    }
}
