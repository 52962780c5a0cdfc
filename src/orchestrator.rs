//! Staleness orchestrator.
//!
//! Each run compares three months: the newest month the remote dataset
//! offers, the newest observed month in the local series, and the newest
//! rendered map. The indicator and the maps are judged independently, and
//! only the work whose precondition is unmet is carried out, so a scheduler
//! can re-run the binary as often as it likes.

use chrono::NaiveDate;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{Config, RunOptions};
use crate::error::Result;
use crate::forecast::{append_forecast, forecast_is_valid};
use crate::gateway::{GridOpener, LatestMonthSource};
use crate::indicator::{append_observed_months, rebuild_indicators, UpdateOutcome};
use crate::logging::{log_operation_end, log_operation_start, log_series_stats};
use crate::month::YearMonth;
use crate::region::RegionBounds;
use crate::resolver::resolve_through;
use crate::series::IndicatorSeries;
use crate::stages::{Stage, StageOutcome, StageRunner};
use crate::store::SeriesStore;
use crate::summary::{self, DashboardSummary};

/// Freshness of the local indicator series
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorState {
    /// Observed data matches the remote and the forecast row is valid
    Current,
    /// The remote offers observed months the series lacks
    ObservedStale,
    /// Observed data is current but the forecast row is absent or wrong
    ForecastMissing,
}

impl fmt::Display for IndicatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorState::Current => write!(f, "current"),
            IndicatorState::ObservedStale => write!(f, "observed-stale"),
            IndicatorState::ForecastMissing => write!(f, "forecast-missing"),
        }
    }
}

/// The three months a run is judged on, and what they imply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assessment {
    pub remote_latest: YearMonth,
    pub local_observed_latest: Option<YearMonth>,
    pub artifact_latest: Option<YearMonth>,
    pub indicator: IndicatorState,
    pub artifact_stale: bool,
}

/// Indicator work selected for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorAction {
    None,
    /// Fetch missing observed months, then rebuild the forecast
    Update,
    /// Rebuild only the forecast row from stored anomalies
    RebuildForecast,
    /// Fetch missing months, recompute every indicator, rebuild the forecast
    FullRebuild,
}

/// Work selected for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunPlan {
    pub indicator: IndicatorAction,
    /// Month to render maps for, when the maps are stale and enabled
    pub render_maps: Option<YearMonth>,
}

/// Everything a run did
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub assessment: Assessment,
    pub plan: RunPlan,
    pub update: UpdateOutcome,
    pub indicators_rebuilt: usize,
    pub forecast_month: Option<YearMonth>,
    pub series_saved: bool,
    pub summary: DashboardSummary,
    pub stages: Vec<(Stage, StageOutcome)>,
}

impl RunReport {
    pub fn has_stage_failure(&self) -> bool {
        self.stages.iter().any(|(_, outcome)| outcome.is_failure())
    }

    /// 0 when everything succeeded, 2 when a downstream stage failed
    pub fn exit_code(&self) -> i32 {
        if self.has_stage_failure() {
            2
        } else {
            0
        }
    }
}

/// Judge the indicator and map freshness against the remote latest month
pub fn assess(
    remote_latest: YearMonth,
    series: &IndicatorSeries,
    artifact_latest: Option<YearMonth>,
) -> Assessment {
    let local_observed_latest = series.last_observed().map(|r| r.month);

    let indicator = match local_observed_latest {
        Some(local) if local >= remote_latest => {
            if forecast_is_valid(series) {
                IndicatorState::Current
            } else {
                IndicatorState::ForecastMissing
            }
        }
        _ => IndicatorState::ObservedStale,
    };

    let artifact_stale = artifact_latest.map_or(true, |a| a < remote_latest);

    Assessment {
        remote_latest,
        local_observed_latest,
        artifact_latest,
        indicator,
        artifact_stale,
    }
}

/// Turn an assessment and the invocation switches into work
pub fn plan(assessment: &Assessment, options: &RunOptions) -> RunPlan {
    let indicator = if options.forecast_only {
        IndicatorAction::RebuildForecast
    } else if options.force_rebuild {
        IndicatorAction::FullRebuild
    } else {
        match assessment.indicator {
            IndicatorState::Current => IndicatorAction::None,
            IndicatorState::ObservedStale => IndicatorAction::Update,
            IndicatorState::ForecastMissing => IndicatorAction::RebuildForecast,
        }
    };

    let render_maps = (options.run_maps && assessment.artifact_stale)
        .then_some(assessment.remote_latest);

    RunPlan {
        indicator,
        render_maps,
    }
}

/// Newest month among rendered maps in `dir`.
///
/// Map files are named `<stem>YYYYMM...` where `prefix` is the stem followed
/// by the leading digit(s) of the year, e.g. `sst_2` for `sst_202509.png`.
/// A missing directory means no maps have been rendered yet.
pub fn latest_artifact_month(dir: &Path, prefix: &str) -> Result<Option<YearMonth>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(dir = %dir.display(), "Map directory does not exist");
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };

    let stem = prefix.trim_end_matches(|c: char| c.is_ascii_digit());
    let mut latest = None;
    for entry in entries {
        let name = entry?.file_name();
        let Some(name) = name.to_str() else { continue };
        if !name.starts_with(prefix) {
            continue;
        }
        match YearMonth::parse_compact(&name[stem.len()..]) {
            Ok(month) => latest = latest.max(Some(month)),
            Err(_) => debug!(file = name, "Ignoring map file without a YYYYMM date"),
        }
    }
    Ok(latest)
}

/// Paths and settings a run needs from the configuration
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub dataset_id: String,
    pub region: RegionBounds,
    pub series_csv: PathBuf,
    pub summary_json: PathBuf,
    pub map_dir: PathBuf,
    pub map_prefix: String,
    pub maps_flags: Vec<String>,
}

impl From<&Config> for RunSettings {
    fn from(config: &Config) -> Self {
        Self {
            dataset_id: config.remote.dataset_id.clone(),
            region: config.region,
            series_csv: config.paths.series_csv.clone(),
            summary_json: config.paths.summary_json.clone(),
            map_dir: config.paths.map_dir.clone(),
            map_prefix: config.paths.map_prefix.clone(),
            maps_flags: config.stages.maps_flags.clone(),
        }
    }
}

/// Wires the collaborators of a run together
pub struct Orchestrator<'a> {
    settings: RunSettings,
    latest: &'a dyn LatestMonthSource,
    opener: &'a dyn GridOpener,
    stages: &'a dyn StageRunner,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        settings: RunSettings,
        latest: &'a dyn LatestMonthSource,
        opener: &'a dyn GridOpener,
        stages: &'a dyn StageRunner,
    ) -> Self {
        Self {
            settings,
            latest,
            opener,
            stages,
        }
    }

    /// Perform one run as of `today`.
    ///
    /// Errors from the remote dataset, the series file or the summary abort
    /// the run before the series is written. Downstream stage failures are
    /// recorded in the report instead.
    pub fn run(&self, options: &RunOptions, today: NaiveDate) -> Result<RunReport> {
        let start = Instant::now();
        log_operation_start("run", Some(&self.settings.dataset_id));

        let store = SeriesStore::new(&self.settings.series_csv);
        let (original, layout) = store.load_with_layout()?;
        log_series_stats("loaded", &original);

        let remote_latest = match options.end_month {
            Some(month) => {
                info!(end_month = %month, "Using requested end month instead of the remote latest");
                month
            }
            None => self.latest.latest_month()?,
        };
        let artifact_latest =
            latest_artifact_month(&self.settings.map_dir, &self.settings.map_prefix)?;

        let assessment = assess(remote_latest, &original, artifact_latest);
        let plan = plan(&assessment, options);
        info!(
            remote_latest = %assessment.remote_latest,
            local_observed = ?assessment.local_observed_latest.map(|m| m.to_string()),
            artifact = ?assessment.artifact_latest.map(|m| m.to_string()),
            indicator = %assessment.indicator,
            artifact_stale = assessment.artifact_stale,
            action = ?plan.indicator,
            "Staleness assessment"
        );

        let mut series = original.clone();
        let mut update = UpdateOutcome::default();
        let mut indicators_rebuilt = 0;

        match plan.indicator {
            IndicatorAction::None => info!("Indicator series is current"),
            IndicatorAction::Update | IndicatorAction::FullRebuild => {
                update = self.fetch_missing(&mut series, remote_latest)?;
                if plan.indicator == IndicatorAction::FullRebuild {
                    indicators_rebuilt = rebuild_indicators(&mut series);
                }
                self.rebuild_forecast(&mut series)?;
            }
            IndicatorAction::RebuildForecast => self.rebuild_forecast(&mut series)?,
        }

        let series_saved = series != original;
        if series_saved {
            store.save_with_layout(&series, &layout)?;
            log_series_stats("saved", &series);
        } else {
            debug!("Series unchanged, not rewriting");
        }

        let summary = summary::build(&series, today)?;
        summary::write_summary(&self.settings.summary_json, &summary)?;

        let mut stages = Vec::new();
        let plot = if !options.run_plot {
            StageOutcome::Skipped("disabled".to_string())
        } else if !series_saved {
            StageOutcome::Skipped("series unchanged".to_string())
        } else {
            self.run_stage(Stage::Plot, &[])
        };
        stages.push((Stage::Plot, plot));

        let maps = match plan.render_maps {
            Some(month) => {
                let mut args = vec!["-d".to_string(), month.to_string()];
                args.extend(self.settings.maps_flags.iter().cloned());
                self.run_stage(Stage::Maps, &args)
            }
            None if !options.run_maps => StageOutcome::Skipped("disabled".to_string()),
            None => StageOutcome::Skipped("maps are current".to_string()),
        };
        stages.push((Stage::Maps, maps));

        let report = RunReport {
            assessment,
            plan,
            update,
            indicators_rebuilt,
            forecast_month: series.forecast().map(|r| r.month),
            series_saved,
            summary,
            stages,
        };
        log_operation_end("run", start, !report.has_stage_failure());
        Ok(report)
    }

    fn fetch_missing(
        &self,
        series: &mut IndicatorSeries,
        remote_latest: YearMonth,
    ) -> Result<UpdateOutcome> {
        series.remove_forecasts();

        let grid = self.opener.open(&self.settings.dataset_id)?;
        let window = self
            .settings
            .region
            .window(grid.latitudes(), grid.longitudes())?;

        let local = series.observed_months();
        let mut missing = resolve_through(grid.months(), &local, Some(remote_latest));
        // Months older than the stored series would open a gap at its start.
        if let Some(last) = series.last_observed().map(|r| r.month) {
            let before = missing.len();
            missing.retain(|m| *m > last);
            if missing.len() < before {
                debug!(
                    ignored = before - missing.len(),
                    "Ignoring remote months older than the stored series"
                );
            }
        }

        if missing.is_empty() {
            info!("No missing months on the remote time axis");
            return Ok(UpdateOutcome::default());
        }
        info!(
            count = missing.len(),
            first = %missing[0],
            last = %missing[missing.len() - 1],
            "Fetching missing months"
        );

        append_observed_months(series, grid.as_ref(), &window, &missing)
    }

    fn rebuild_forecast(&self, series: &mut IndicatorSeries) -> Result<()> {
        if series.last_observed().is_none() {
            warn!("No observed months, cannot build a forecast row");
            return Ok(());
        }
        append_forecast(series)?;
        Ok(())
    }

    fn run_stage(&self, stage: Stage, args: &[String]) -> StageOutcome {
        if !self.stages.is_configured(stage) {
            info!(stage = %stage, "No command configured, skipping stage");
            return StageOutcome::Skipped("not configured".to_string());
        }
        match self.stages.run(stage, args) {
            Ok(()) => StageOutcome::Succeeded,
            Err(e) => {
                warn!(stage = %stage, error = %e, "Downstream stage failed");
                StageOutcome::Failed(e.to_string())
            }
        }
    }
}
