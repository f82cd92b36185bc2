//! Input/output helpers.
//!
//! - CSV ingest with type inference (`ingest`)
//! - CSV exports, including summary statistics (`export`)
//! - JSON exports in records or structured layout (`json`)

pub mod export;
pub mod ingest;
pub mod json;

pub use export::*;
pub use ingest::*;
pub use json::*;
