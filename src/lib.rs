//! # total-indicator
//!
//! Monthly sea-surface-temperature indicator pipeline for the TOTAL
//! loggerhead turtle closure dashboard.
//!
//! The library keeps a persisted monthly series of regional SST anomalies and
//! their trailing six-month mean (the indicator), reconciles it against a
//! remote gridded dataset, appends a one-month-ahead forecast row, and derives
//! the dashboard summary from the result.
//!
//! ## Key Features
//!
//! - **Idempotent updates**: re-running with no new remote data rewrites nothing
//! - **Staleness detection**: indicator and rendered maps are judged independently
//! - **Atomic persistence**: the series and summary are replaced by rename, never truncated
//! - **Bounded retries**: linear backoff for the remote dataset and the latest-month lookup
//!
//! ## Architecture
//!
//! - **Gateway**: remote grid access behind the [`gateway::MonthlyGrid`] trait
//! - **Series**: typed records, invariant checks and CSV persistence
//! - **Orchestrator**: decides which work a run needs and carries it out

pub mod config;
pub mod error;
pub mod forecast;
pub mod gateway;
pub mod indicator;
pub mod logging;
pub mod month;
pub mod orchestrator;
pub mod region;
pub mod resolver;
pub mod retry;
pub mod series;
pub mod stages;
pub mod store;
pub mod summary;

pub use config::{Config, RunOptions};
pub use error::{IndicatorError, Result};
pub use logging::{
    generate_run_id, init_tracing, log_error, log_operation_end, log_operation_start,
    log_series_stats, log_timed_operation,
};
pub use month::YearMonth;
pub use orchestrator::{IndicatorState, Orchestrator, RunReport, RunSettings};
pub use series::{IndicatorSeries, MonthRecord};
