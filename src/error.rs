//! Error types for the indicator pipeline.
//!
//! A single enum covers every failure the pipeline can hit, split along the
//! lines the run loop cares about: transient remote failures are retried,
//! data-quality problems are skipped by the caller, and everything else aborts
//! the run before anything is persisted.

use thiserror::Error;

use crate::month::YearMonth;

/// The main error type for indicator operations.
#[derive(Error, Debug)]
pub enum IndicatorError {
    /// NetCDF / OPeNDAP library errors
    #[cfg(feature = "netcdf")]
    #[error("NetCDF error: {0}")]
    NetCdf(#[from] netcdf::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV read/write errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP errors from the latest-month lookup
    #[error("HTTP error: {message}")]
    Http {
        message: String,
        status: Option<u16>,
        transient: bool,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// A month key that is not `YYYY-MM`
    #[error("Invalid month: {value:?}")]
    InvalidMonth { value: String },

    /// Remote dataset could not be reached after exhausting retries
    #[error("Connectivity error after {attempts} attempt(s): {message}")]
    Connectivity { attempts: u32, message: String },

    /// A single month of remote data is unusable
    #[error("Data quality error for {month}: {message}")]
    DataQuality { month: YearMonth, message: String },

    /// Series state that must never be persisted
    #[error("Invariant violation: {message}")]
    InvariantViolation { message: String },

    /// Malformed remote content (bad axes, missing variables)
    #[error("Remote data error: {message}")]
    RemoteData { message: String },

    /// A downstream external stage could not be run
    #[error("Stage {stage} failed: {message}")]
    Stage { stage: String, message: String },

    /// Feature not compiled in
    #[error("Unsupported: {message}")]
    Unsupported { message: String },
}

/// NetCDF status codes for DAP and transport failures (netcdf.h)
#[cfg(feature = "netcdf")]
const NC_EDAP: i32 = -66;
#[cfg(feature = "netcdf")]
const NC_ECURL: i32 = -67;
#[cfg(feature = "netcdf")]
const NC_EIO: i32 = -68;
#[cfg(feature = "netcdf")]
const NC_EDAPSVC: i32 = -70;

/// Whether a NetCDF status code stems from the network or the DAP server
#[cfg(feature = "netcdf")]
fn is_transient_netcdf_status(code: i32) -> bool {
    matches!(code, NC_EDAP | NC_ECURL | NC_EIO | NC_EDAPSVC)
}

impl IndicatorError {
    /// Whether a retry has a chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            #[cfg(feature = "netcdf")]
            IndicatorError::NetCdf(netcdf::Error::Netcdf(code)) => is_transient_netcdf_status(*code),
            IndicatorError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::Interrupted
            ),
            IndicatorError::Http { transient, .. } => *transient,
            _ => false,
        }
    }

    /// Process exit status for a run that ended with this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            IndicatorError::Stage { .. } => 2,
            _ => 1,
        }
    }
}

impl From<tempfile::PersistError> for IndicatorError {
    fn from(e: tempfile::PersistError) -> Self {
        IndicatorError::Io(e.error)
    }
}

/// Convenience type alias for Results with IndicatorError
pub type Result<T> = std::result::Result<T, IndicatorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let timeout = IndicatorError::Io(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "read timed out",
        ));
        assert!(timeout.is_transient());

        let missing = IndicatorError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "no such file",
        ));
        assert!(!missing.is_transient());

        let throttled = IndicatorError::Http {
            message: "HTTP 429".to_string(),
            status: Some(429),
            transient: true,
        };
        assert!(throttled.is_transient());

        let invariant = IndicatorError::InvariantViolation {
            message: "duplicate month".to_string(),
        };
        assert!(!invariant.is_transient());
    }

    #[cfg(feature = "netcdf")]
    #[test]
    fn test_netcdf_status_classification() {
        let status = |code: i32| IndicatorError::NetCdf(netcdf::Error::Netcdf(code));

        // curl failure and DAP server error
        assert!(status(-67).is_transient());
        assert!(status(-70).is_transient());
        // ENOENT and NC_ENOTNC fail straight away
        assert!(!status(2).is_transient());
        assert!(!status(-51).is_transient());
        // malformed DAP url
        assert!(!status(-74).is_transient());
    }

    #[test]
    fn test_exit_codes() {
        let stage = IndicatorError::Stage {
            stage: "maps".to_string(),
            message: "exit status 1".to_string(),
        };
        assert_eq!(stage.exit_code(), 2);

        let config = IndicatorError::Config {
            message: "bad".to_string(),
        };
        assert_eq!(config.exit_code(), 1);
    }
}
