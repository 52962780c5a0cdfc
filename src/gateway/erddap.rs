//! ERDDAP latest-month lookup.
//!
//! Asking griddap for `time[(last)]` as headerless CSV returns a single ISO
//! timestamp, which is far cheaper than opening the dataset just to read the
//! end of its time axis.

use chrono::{DateTime, Utc};
use reqwest::blocking::Client;
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;

use super::LatestMonthSource;
use crate::error::{IndicatorError, Result};
use crate::month::YearMonth;
use crate::retry::RetryPolicy;

/// HTTP client for a single griddap dataset
#[derive(Debug, Clone)]
pub struct ErddapClient {
    client: Client,
    url_base: String,
    dataset_id: String,
    retry: RetryPolicy,
    retriable_statuses: HashSet<u16>,
}

impl ErddapClient {
    pub fn new(
        url_base: impl Into<String>,
        dataset_id: impl Into<String>,
        timeout: Duration,
        retry: RetryPolicy,
        retriable_statuses: impl IntoIterator<Item = u16>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("total-indicator/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| IndicatorError::Config {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            url_base: url_base.into(),
            dataset_id: dataset_id.into(),
            retry,
            retriable_statuses: retriable_statuses.into_iter().collect(),
        })
    }

    /// URL of the `time[(last)]` query
    pub fn latest_time_url(&self) -> String {
        format!(
            "{}/{}.csv0?time[(last)]",
            self.url_base.trim_end_matches('/'),
            self.dataset_id
        )
    }

    fn fetch_once(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| classify_request_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(IndicatorError::Http {
                message: format!("HTTP {} from {}", status, url),
                status: Some(status.as_u16()),
                transient: self.retriable_statuses.contains(&status.as_u16()),
            });
        }

        response.text().map_err(|e| classify_request_error(&e))
    }
}

impl LatestMonthSource for ErddapClient {
    fn latest_month(&self) -> Result<YearMonth> {
        let url = self.latest_time_url();
        let body = self
            .retry
            .run_transient("latest_remote_month", |_| self.fetch_once(&url))?;
        debug!(body = %body.trim(), "Latest time response");
        parse_latest_time(&body)
    }
}

fn classify_request_error(e: &reqwest::Error) -> IndicatorError {
    IndicatorError::Http {
        message: e.to_string(),
        status: e.status().map(|s| s.as_u16()),
        transient: e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
    }
}

/// Month of the first timestamp in a `csv0` body
pub fn parse_latest_time(body: &str) -> Result<YearMonth> {
    let first = body
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .and_then(|line| line.split(',').next())
        .map(|field| field.trim().trim_matches('"'))
        .ok_or_else(|| IndicatorError::RemoteData {
            message: "Empty latest-time response".to_string(),
        })?;

    let dt = DateTime::parse_from_rfc3339(first).map_err(|e| IndicatorError::RemoteData {
        message: format!("Unparseable latest time {:?}: {}", first, e),
    })?;
    Ok(YearMonth::from_datetime(&dt.with_timezone(&Utc)))
}
