//! `trends-analyzer` library crate.
//!
//! The binary (`trends`) is a thin wrapper around this library so that:
//!
//! - the analysis core is testable without network access or processes
//! - providers, exporters and reports can be swapped independently
//! - code stays easy to navigate as the project grows

pub mod analysis;
pub mod app;
pub mod cli;
pub mod config;
pub mod data;
pub mod domain;
pub mod error;
pub mod frame;
pub mod io;
pub mod math;
pub mod plot;
pub mod report;
