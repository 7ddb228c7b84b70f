//! # rustsat-hsd-tools - Command Line Tools for the Diagnoser
//!
//! This crate contains the `hsd` binary and the SAT solver it uses.

/// The SAT oracle used by the tools
pub type Solver = rustsat_minisat::core::Minisat;
