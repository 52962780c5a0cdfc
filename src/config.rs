//! Configuration management for the indicator pipeline.
//!
//! This module handles the layered configuration system with the following precedence:
//! 1. Command-line arguments (highest priority)
//! 2. Environment variables
//! 3. JSON config file
//! 4. Default values (lowest priority)
//!
//! The resulting [`Config`] is immutable and handed to each component when it
//! is constructed.

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{IndicatorError, Result};
use crate::month::YearMonth;
use crate::region::RegionBounds;
use crate::retry::RetryPolicy;

/// Command-line arguments for total-indicator
#[derive(Parser, Debug, Default)]
#[command(name = "total-indicator")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to JSON configuration file
    #[arg(short, long, env = "TOTAL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Indicator series CSV
    #[arg(long, env = "TOTAL_SERIES_CSV")]
    pub series_csv: Option<PathBuf>,

    /// Dashboard JSON output
    #[arg(long, env = "TOTAL_SUMMARY_JSON")]
    pub summary_json: Option<PathBuf>,

    /// Directory holding rendered monthly maps
    #[arg(long, env = "TOTAL_MAP_DIR")]
    pub map_dir: Option<PathBuf>,

    /// Remote dataset id
    #[arg(long, env = "TOTAL_DATASET")]
    pub dataset_id: Option<String>,

    /// Fetch missing months and recompute every indicator and the forecast
    #[arg(long, conflicts_with = "forecast_only")]
    pub force_rebuild: bool,

    /// Only rebuild the forecast row; no remote anomaly data is read
    #[arg(long)]
    pub forecast_only: bool,

    /// Treat this month as the newest remote month instead of asking the server
    #[arg(long, value_name = "YYYY-MM")]
    pub end_month: Option<String>,

    /// Do not run the map rendering stage
    #[arg(long)]
    pub skip_maps: bool,

    /// Do not run the indicator plot stage
    #[arg(long)]
    pub skip_plot: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "TOTAL_LOG_LEVEL")]
    pub log_level: Option<String>,
}

/// Variable names inside the remote dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridVariables {
    #[serde(default = "default_time_variable")]
    pub time: String,
    #[serde(default = "default_latitude_variable")]
    pub latitude: String,
    #[serde(default = "default_longitude_variable")]
    pub longitude: String,
    #[serde(default = "default_anomaly_variable")]
    pub anomaly: String,
}

/// Remote dataset configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// griddap base URL; empty means `dataset_id` is a local path
    #[serde(default = "default_url_base")]
    pub url_base: String,

    /// Dataset id appended to the base URL
    #[serde(default = "default_dataset_id")]
    pub dataset_id: String,

    #[serde(default)]
    pub variables: GridVariables,

    /// Attempts per remote operation, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Linear backoff base when opening the dataset
    #[serde(default = "default_open_backoff_seconds")]
    pub open_backoff_seconds: u64,

    /// Linear backoff base for the latest-month lookup
    #[serde(default = "default_latest_backoff_seconds")]
    pub latest_backoff_seconds: u64,

    /// Per-request timeout for the latest-month lookup
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,

    /// HTTP statuses treated as transient
    #[serde(default = "default_retriable_statuses")]
    pub retriable_statuses: Vec<u16>,
}

impl RemoteConfig {
    pub fn open_retry(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_secs(self.open_backoff_seconds))
    }

    pub fn latest_retry(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_secs(self.latest_backoff_seconds))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

/// File locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_series_csv")]
    pub series_csv: PathBuf,

    #[serde(default = "default_summary_json")]
    pub summary_json: PathBuf,

    /// Directory scanned for rendered maps
    #[serde(default = "default_map_dir")]
    pub map_dir: PathBuf,

    /// Rendered map file names start with this prefix followed by `YYYYMM`
    #[serde(default = "default_map_prefix")]
    pub map_prefix: String,
}

/// External downstream stage commands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagesConfig {
    /// argv for the indicator plot stage
    #[serde(default)]
    pub plot_command: Option<Vec<String>>,

    /// argv for the map rendering stage; `-d YYYY-MM` and `maps_flags` are appended
    #[serde(default)]
    pub maps_command: Option<Vec<String>>,

    #[serde(default = "default_maps_flags")]
    pub maps_flags: Vec<String>,
}

/// Complete configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub remote: RemoteConfig,

    #[serde(default)]
    pub region: RegionBounds,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub stages: StagesConfig,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Per-invocation switches that are not part of the persistent configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub force_rebuild: bool,
    pub forecast_only: bool,
    pub end_month: Option<YearMonth>,
    pub run_maps: bool,
    pub run_plot: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            force_rebuild: false,
            forecast_only: false,
            end_month: None,
            run_maps: true,
            run_plot: true,
        }
    }
}

impl Config {
    /// Load configuration from all sources with proper precedence
    pub fn load() -> Result<(Self, RunOptions)> {
        Self::from_args(Args::parse())
    }

    /// Build configuration from already-parsed arguments
    pub fn from_args(args: Args) -> Result<(Self, RunOptions)> {
        // Start with defaults
        let mut config = Config::default();

        // Load from JSON file if provided
        if let Some(config_path) = &args.config {
            let json_config = Self::load_from_file(config_path)?;
            config.merge(json_config);
        }

        // Override with command-line arguments
        if let Some(path) = args.series_csv {
            config.paths.series_csv = path;
        }
        if let Some(path) = args.summary_json {
            config.paths.summary_json = path;
        }
        if let Some(path) = args.map_dir {
            config.paths.map_dir = path;
        }
        if let Some(dataset_id) = args.dataset_id {
            config.remote.dataset_id = dataset_id;
        }
        if let Some(level) = args.log_level {
            config.log_level = level;
        }

        if args.force_rebuild && args.forecast_only {
            return Err(IndicatorError::Config {
                message: "--force-rebuild and --forecast-only are mutually exclusive".to_string(),
            });
        }

        let end_month = args
            .end_month
            .as_deref()
            .map(|s| {
                s.parse::<YearMonth>().map_err(|_| IndicatorError::Config {
                    message: format!("Invalid --end-month {:?}, expected YYYY-MM", s),
                })
            })
            .transpose()?;

        let options = RunOptions {
            force_rebuild: args.force_rebuild,
            forecast_only: args.forecast_only,
            end_month,
            run_maps: !args.skip_maps,
            run_plot: !args.skip_plot,
        };

        Ok((config, options))
    }

    /// Load configuration from a JSON file
    fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| IndicatorError::Config {
            message: format!("Cannot read config file {}: {}", path.display(), e),
        })?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Merge another config into this one (other takes precedence)
    fn merge(&mut self, other: Config) {
        self.remote = other.remote;
        self.region = other.region;
        self.paths = other.paths;
        if other.stages.plot_command.is_some() {
            self.stages.plot_command = other.stages.plot_command;
        }
        if other.stages.maps_command.is_some() {
            self.stages.maps_command = other.stages.maps_command;
        }
        self.stages.maps_flags = other.stages.maps_flags;
        self.log_level = other.log_level;
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let fail = |message: String| Err(IndicatorError::Config { message });

        if self.remote.dataset_id.trim().is_empty() {
            return fail("Dataset id cannot be empty".to_string());
        }
        if self.remote.max_attempts == 0 {
            return fail("max_attempts must be at least 1".to_string());
        }
        if self.remote.request_timeout_seconds == 0 {
            return fail("request_timeout_seconds must be positive".to_string());
        }
        if let Some(bad) = self
            .remote
            .retriable_statuses
            .iter()
            .find(|s| !(100..=599).contains(*s))
        {
            return fail(format!("Invalid retriable HTTP status: {}", bad));
        }
        for (name, value) in [
            ("time", &self.remote.variables.time),
            ("latitude", &self.remote.variables.latitude),
            ("longitude", &self.remote.variables.longitude),
            ("anomaly", &self.remote.variables.anomaly),
        ] {
            if value.trim().is_empty() {
                return fail(format!("Variable name for {} cannot be empty", name));
            }
        }

        let [lat_min, lat_max] = self.region.lat_range;
        if !(lat_min.is_finite() && lat_max.is_finite())
            || lat_min > lat_max
            || lat_min < -90.0
            || lat_max > 90.0
        {
            return fail(format!(
                "Invalid latitude range: [{}, {}]",
                lat_min, lat_max
            ));
        }
        let [lon_min, lon_max] = self.region.lon_range;
        if !(lon_min.is_finite() && lon_max.is_finite())
            || lon_min > lon_max
            || lon_min < -180.0
            || lon_max > 360.0
        {
            return fail(format!(
                "Invalid longitude range: [{}, {}]",
                lon_min, lon_max
            ));
        }

        if self.paths.series_csv.as_os_str().is_empty() {
            return fail("Series CSV path cannot be empty".to_string());
        }
        if self.paths.summary_json.as_os_str().is_empty() {
            return fail("Summary JSON path cannot be empty".to_string());
        }
        if self.paths.map_prefix.is_empty() {
            return fail("Map prefix cannot be empty".to_string());
        }

        // Validate log level
        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return fail(format!(
                    "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                    self.log_level
                ));
            }
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            remote: RemoteConfig::default(),
            region: RegionBounds::default(),
            paths: PathsConfig::default(),
            stages: StagesConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl Default for GridVariables {
    fn default() -> Self {
        Self {
            time: default_time_variable(),
            latitude: default_latitude_variable(),
            longitude: default_longitude_variable(),
            anomaly: default_anomaly_variable(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            url_base: default_url_base(),
            dataset_id: default_dataset_id(),
            variables: GridVariables::default(),
            max_attempts: default_max_attempts(),
            open_backoff_seconds: default_open_backoff_seconds(),
            latest_backoff_seconds: default_latest_backoff_seconds(),
            request_timeout_seconds: default_request_timeout_seconds(),
            retriable_statuses: default_retriable_statuses(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            series_csv: default_series_csv(),
            summary_json: default_summary_json(),
            map_dir: default_map_dir(),
            map_prefix: default_map_prefix(),
        }
    }
}

impl Default for StagesConfig {
    fn default() -> Self {
        Self {
            plot_command: None,
            maps_command: None,
            maps_flags: default_maps_flags(),
        }
    }
}

// Default value functions for serde
fn default_url_base() -> String {
    "https://coastwatch.pfeg.noaa.gov/erddap/griddap".to_string()
}

fn default_dataset_id() -> String {
    "jplMURSST41anommday".to_string()
}

fn default_time_variable() -> String {
    "time".to_string()
}

fn default_latitude_variable() -> String {
    "latitude".to_string()
}

fn default_longitude_variable() -> String {
    "longitude".to_string()
}

fn default_anomaly_variable() -> String {
    "sstAnom".to_string()
}

fn default_max_attempts() -> u32 {
    5
}

fn default_open_backoff_seconds() -> u64 {
    20
}

fn default_latest_backoff_seconds() -> u64 {
    10
}

fn default_request_timeout_seconds() -> u64 {
    30
}

fn default_retriable_statuses() -> Vec<u16> {
    vec![429, 500, 502, 503, 504, 403]
}

fn default_series_csv() -> PathBuf {
    PathBuf::from("data/resources/loggerhead_indx.csv")
}

fn default_summary_json() -> PathBuf {
    PathBuf::from("data/json/web_data.json")
}

fn default_map_dir() -> PathBuf {
    PathBuf::from("data/images")
}

fn default_map_prefix() -> String {
    "sst_2".to_string()
}

fn default_maps_flags() -> Vec<String> {
    vec!["-n".to_string(), "-t".to_string(), "-j".to_string()]
}

fn default_log_level() -> String {
    "info".to_string()
}
