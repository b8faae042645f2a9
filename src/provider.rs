//! Raw report providers.
//!
//! [`ReportProvider`] is the seam between the update loop and whatever
//! supplies raw report text. The shipped implementation talks to the
//! Aviation Weather Center data API; tests swap in scripted providers.

use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;
use tracing::debug;

use crate::observation::{RawReport, StationCode};

/// Aviation Weather Center METAR endpoint.
pub const AWC_BASE_URL: &str = "https://aviationweather.gov/api/data/metar";

/// Default per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors from fetching a raw report.
#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("no report available for station {0}")]
    NoData(StationCode),
}

/// Source of raw report text for a station.
#[async_trait]
pub trait ReportProvider: Send + Sync {
    /// Fetch the most recent raw report for `station`.
    async fn fetch_raw_report(&self, station: &StationCode) -> Result<RawReport, FetchError>;
}

/// Provider backed by the Aviation Weather Center data API.
///
/// The API returns one raw report per line in `format=raw` mode; only
/// the first non-empty line is used since the session loop always
/// wants the latest report.
pub struct AwcProvider {
    client: reqwest::Client,
    base_url: String,
}

impl AwcProvider {
    pub fn new() -> Self {
        AwcProvider::with_base_url(AWC_BASE_URL)
    }

    /// Point the provider at a different endpoint, e.g. a local mirror.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        AwcProvider {
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .user_agent(concat!("metar-watch/", env!("CARGO_PKG_VERSION")))
                .build()
                .unwrap_or_default(),
            base_url: base_url.into(),
        }
    }
}

impl Default for AwcProvider {
    fn default() -> Self {
        AwcProvider::new()
    }
}

#[async_trait]
impl ReportProvider for AwcProvider {
    async fn fetch_raw_report(&self, station: &StationCode) -> Result<RawReport, FetchError> {
        let url = format!("{}?ids={}&format=raw", self.base_url, station);
        debug!(%station, %url, "fetching raw report");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        let text = body
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .ok_or_else(|| FetchError::NoData(station.clone()))?;

        Ok(RawReport {
            station: station.clone(),
            fetched_at: Utc::now(),
            text: text.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_display() {
        let station: StationCode = "KJFK".parse().unwrap();
        assert_eq!(
            FetchError::NoData(station).to_string(),
            "no report available for station KJFK"
        );
        assert_eq!(
            FetchError::Status(503).to_string(),
            "unexpected HTTP status 503"
        );
    }

    #[test]
    fn test_request_url_shape() {
        let station: StationCode = "EGLL".parse().unwrap();
        let url = format!("{}?ids={}&format=raw", AWC_BASE_URL, station);
        assert_eq!(
            url,
            "https://aviationweather.gov/api/data/metar?ids=EGLL&format=raw"
        );
    }
}
