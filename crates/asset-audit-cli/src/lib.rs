//! Batch front end for the asset audit engine
//!
//! - `io`: load portfolios, configs and reports from JSON files
//! - `summary`: per-class dashboard figures computed from an enriched report

pub mod io;
pub mod summary;

pub use summary::{ClassSummary, PortfolioSummary};
