//! Joint-distribution estimation.
//!
//! Responsibilities:
//!
//! - reconstruct each geography's joint household table from its marginals (IPF)
//! - round fitted cells to household counts and report the aggregate drift

pub mod ipf;
pub mod rounding;

pub use ipf::*;
pub use rounding::*;
