//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - demographic variables and their category label sets (`Variable`, `LabelSet`, `CategoryScheme`)
//! - per-geography marginal inputs (`Geography`, `Marginals`)
//! - microdata records and the fitted / rounded cells routed to matching

pub mod labels;
pub mod types;

pub use labels::*;
pub use types::*;
