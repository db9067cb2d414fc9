//! Reporting utilities: terminal summaries of fit and synthesis runs.

pub mod format;

pub use format::*;
