//! Single-value metric retrieval for SLI evaluation
//!
//! Rewrites metric selectors so a metrics query API returns exactly one value
//! per series in a requested unit, and turns the response into named values.

pub mod config;
pub mod context;
pub mod metrics;
pub mod utils;
