//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - export enums (`ExportFormat`, `JsonLayout`)
//! - the unit of work (`AnalysisRequest`, `AggregationSpec`, `DateRange`)
//! - result provenance (`RequestMeta`)

pub mod types;

pub use types::*;
