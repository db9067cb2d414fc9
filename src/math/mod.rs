//! Numeric building blocks: dense N-dimensional count tables, pairwise
//! distances, and deterministic per-cell seeds.

pub mod distance;
pub mod seed;
pub mod table;

pub use distance::*;
pub use seed::*;
pub use table::*;
