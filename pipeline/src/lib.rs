//! Batch runner for the signal pipeline.
//!
//! One [`Pipeline`] owns its configuration, aggregator and market-data cache.
//! A run ingests a batch of text units and returns a [`RunReport`] with one
//! verdict per ticker that has mentions in the current window.

pub mod config;
pub mod error;
pub mod metrics;
pub mod report;
pub mod runner;

pub use config::AppConfig;
pub use error::PipelineError;
pub use metrics::{CounterSnapshot, RunCounters};
pub use report::RunReport;
pub use runner::{IngestSummary, Pipeline};
