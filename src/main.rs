//! total-indicator - TOTAL loggerhead SST indicator update and forecast
//!
//! This is the main entry point for the scheduled pipeline run.

use chrono::Local;
use tracing::{error, info};

use total_indicator::gateway::{ErddapClient, GridOpener};
use total_indicator::logging::{init_tracing, log_error, log_timed_operation};
use total_indicator::stages::{CommandRunner, Stage, StageOutcome};
use total_indicator::{Config, Orchestrator, Result, RunSettings};

fn main() {
    let code = match run() {
        Ok(code) => code,
        Err(e) => {
            log_error(&e, "run");
            eprintln!("total-indicator: {}", e);
            e.exit_code()
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    // Load configuration
    let (config, options) = Config::load().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        e
    })?;

    init_tracing(&config.log_level);
    info!("Starting total-indicator v{}", env!("CARGO_PKG_VERSION"));

    // Validate configuration
    config.validate().map_err(|e| {
        error!("Invalid configuration: {}", e);
        e
    })?;

    let latest = ErddapClient::new(
        &config.remote.url_base,
        &config.remote.dataset_id,
        config.remote.request_timeout(),
        config.remote.latest_retry(),
        config.remote.retriable_statuses.clone(),
    )?;
    let opener = grid_opener(&config)?;
    let runner = CommandRunner::new()
        .with_command(Stage::Plot, config.stages.plot_command.clone())
        .with_command(Stage::Maps, config.stages.maps_command.clone());

    let orchestrator =
        Orchestrator::new(RunSettings::from(&config), &latest, opener.as_ref(), &runner);
    let today = Local::now().date_naive();
    let report = log_timed_operation("pipeline", || orchestrator.run(&options, today))?;

    info!(
        indicator = %report.assessment.indicator,
        appended = report.update.appended.len(),
        skipped = ?report.update.skipped.as_ref().map(|(m, _)| m.to_string()),
        deferred = report.update.deferred.len(),
        forecast = ?report.forecast_month.map(|m| m.to_string()),
        alert = ?report.summary.alert,
        "Run finished"
    );
    for (stage, outcome) in &report.stages {
        match outcome {
            StageOutcome::Succeeded => info!(stage = %stage, "Stage succeeded"),
            StageOutcome::Skipped(reason) => info!(stage = %stage, reason = %reason, "Stage skipped"),
            StageOutcome::Failed(message) => {
                error!(stage = %stage, error = %message, "Stage failed");
                eprintln!("total-indicator: {} stage failed: {}", stage, message);
            }
        }
    }

    Ok(report.exit_code())
}

#[cfg(feature = "netcdf")]
fn grid_opener(config: &Config) -> Result<Box<dyn GridOpener>> {
    Ok(Box::new(total_indicator::gateway::NetcdfGateway::new(
        config.remote.url_base.clone(),
        config.remote.variables.clone(),
        config.remote.open_retry(),
    )))
}

#[cfg(not(feature = "netcdf"))]
fn grid_opener(_config: &Config) -> Result<Box<dyn GridOpener>> {
    Err(total_indicator::IndicatorError::Unsupported {
        message: "built without the `netcdf` feature; the remote grid cannot be opened"
            .to_string(),
    })
}
