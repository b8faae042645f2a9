//! # metar-watch
//!
//! A library and service for decoding METAR aviation weather reports
//! and tracking how conditions change over time.
//!
//! The pipeline has four stages:
//!
//! 1. **Fetch** raw report text from a [`provider::ReportProvider`]
//!    (the Aviation Weather Center API by default).
//! 2. **Decode** the text into a structured
//!    [`observation::Observation`] with [`parser::decode`]. Unknown
//!    tokens are skipped; only a missing station or observation time
//!    fails the report.
//! 3. **Store** observations per station in a
//!    [`history::HistoryStore`] with retention-based eviction.
//! 4. **Analyze** trends against recent history with
//!    [`trend::analyze`].
//!
//! [`session::StationSession`] wires the stages into a per-station
//! update loop with scheduled refreshes, failure backoff, and a watch
//! channel publishing [`session::StationSnapshot`]s.
//!
//! ## Example
//!
//! ```
//! use chrono::Utc;
//! use metar_watch::observation::RawReport;
//! use metar_watch::parser;
//!
//! let raw = RawReport {
//!     station: "KJFK".parse().unwrap(),
//!     fetched_at: Utc::now(),
//!     text: "KJFK 261651Z 18015G25KT 10SM FEW035 22/18 A3000".to_string(),
//! };
//! let obs = parser::decode(&raw).unwrap();
//!
//! assert_eq!(obs.temperature, Some(22.0));
//! assert_eq!(obs.dew_point, Some(18.0));
//! // Relative humidity is derived, not reported.
//! let rh = obs.relative_humidity().unwrap();
//! assert!((rh - 78.0).abs() < 1.0);
//! ```

pub mod config;
pub mod history;
pub mod observation;
pub mod parser;
pub mod provider;
pub mod session;
pub mod trend;
pub mod units;

pub use config::Config;
pub use history::HistoryStore;
pub use observation::{Observation, RawReport, StationCode};
pub use parser::{ParseError, decode};
pub use provider::{AwcProvider, FetchError, ReportProvider};
pub use session::{SessionConfig, SessionHandle, StationSession, StationSnapshot};
pub use trend::{DirectionTrend, Trend, TrendConfig, TrendReport};
pub use units::UnitPreferences;
