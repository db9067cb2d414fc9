//! `synthpop` library crate.
//!
//! Builds synthetic household populations: per-geography joint tables are
//! estimated from published marginals by iterative proportional fitting, rounded
//! to household counts, then filled by drawing survey microdata records through
//! an escalating match ladder.
//!
//! The binary (`synthpop`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - the pipeline can be driven from other tools with in-memory inputs

pub mod app;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod logging;
pub mod math;
pub mod report;
pub mod sample;
