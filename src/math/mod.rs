//! Numeric utilities: column statistics and correlation.

pub mod correlation;
pub mod stats;

pub use correlation::*;
pub use stats::*;
