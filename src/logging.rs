//! Logging utilities for the indicator pipeline.
//!
//! This module provides structured logging functionality to make scheduled
//! runs searchable and easy to audit after the fact.

use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::IndicatorError;
use crate::series::IndicatorSeries;

/// Initialize the tracing subscriber with the given log level
pub fn init_tracing(log_level: &str) {
    let filter = match std::env::var("RUST_LOG") {
        Ok(val) => val,
        Err(_) => log_level.to_string(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .with_file(true)
        .with_line_number(true)
        .init();
}

/// Log a start message for a significant operation
pub fn log_operation_start(operation: &str, details: Option<&str>) {
    if let Some(details) = details {
        info!(
            operation = operation,
            details = details,
            "Starting operation"
        );
    } else {
        info!(operation = operation, "Starting operation");
    }
}

/// Log the completion of a significant operation
pub fn log_operation_end(operation: &str, start_time: Instant, success: bool) {
    let duration_ms = start_time.elapsed().as_secs_f64() * 1000.0;

    if success {
        info!(
            operation = operation,
            duration_ms = duration_ms,
            "Operation completed successfully"
        );
    } else {
        warn!(
            operation = operation,
            duration_ms = duration_ms,
            "Operation completed with warnings"
        );
    }
}

/// Run `f`, logging its duration under a fresh run id
pub fn log_timed_operation<F, R>(operation: &str, f: F) -> R
where
    F: FnOnce() -> R,
{
    let start = Instant::now();
    let run_id = generate_run_id();

    debug!(
        operation = operation,
        run_id = %run_id,
        "Starting operation"
    );

    let result = f();

    info!(
        operation = operation,
        run_id = %run_id,
        duration_ms = start.elapsed().as_secs_f64() * 1000.0,
        "Operation completed"
    );

    result
}

/// Log a short description of the series
pub fn log_series_stats(context: &str, series: &IndicatorSeries) {
    let first = series.first_month().map(|m| m.to_string());
    let last_observed = series.last_observed();
    info!(
        context = context,
        rows = series.len(),
        first_month = first.as_deref().unwrap_or("none"),
        last_observed = %last_observed
            .map(|r| r.month.to_string())
            .unwrap_or_else(|| "none".to_string()),
        last_indicator = last_observed.map(|r| r.indicator),
        forecast = %series
            .forecast()
            .map(|r| r.month.to_string())
            .unwrap_or_else(|| "none".to_string()),
        "Series state"
    );
}

/// Log an error with context
pub fn log_error(error: &IndicatorError, context: &str) {
    error!(
        error = %error,
        context = context,
        transient = error.is_transient(),
        exit_code = error.exit_code(),
        "Error occurred"
    );
}

/// Generate a unique run ID
pub fn generate_run_id() -> String {
    Uuid::new_v4().to_string()
}
