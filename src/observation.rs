//! Data structures representing decoded METAR observations.
//!
//! This module defines the core types used throughout the crate
//! to represent raw reports and their parsed, canonical-unit form.
//! All quantities are stored in one SI-like unit set: °C, m/s, meters,
//! hPa. Display-unit conversion happens at the boundary (see `units`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when a station identifier is not a valid ICAO code.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid station code {0:?}: expected 4 uppercase alphanumeric characters")]
pub struct InvalidStationCode(pub String);

/// A validated 4-character ICAO station identifier (e.g. "KJFK", "EGLL").
///
/// Lowercase input is accepted and normalized to uppercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StationCode(String);

impl StationCode {
    /// The identifier as an uppercase string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for StationCode {
    type Err = InvalidStationCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_ascii_uppercase();
        if code.len() == 4 && code.chars().all(|c| c.is_ascii_alphanumeric()) {
            Ok(StationCode(code))
        } else {
            Err(InvalidStationCode(s.to_string()))
        }
    }
}

impl TryFrom<String> for StationCode {
    type Error = InvalidStationCode;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<StationCode> for String {
    fn from(code: StationCode) -> Self {
        code.0
    }
}

impl fmt::Display for StationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A raw METAR report as returned by a fetch provider.
///
/// Immutable once fetched. `fetched_at` anchors the report's
/// day-of-month timestamp group to a calendar month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawReport {
    /// Station the report was requested for.
    pub station: StationCode,

    /// When the report text was retrieved (UTC).
    pub fetched_at: DateTime<Utc>,

    /// The raw report text, e.g.
    /// `KJFK 261651Z 18015G25KT 10SM FEW035 22/18 A3000`.
    pub text: String,
}

/// Reported wind direction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindDirection {
    /// True direction in degrees (0-360).
    Degrees(u16),
    /// Variable direction ("VRB" group).
    Variable,
}

impl WindDirection {
    /// The direction in degrees, or `None` for variable winds.
    pub fn degrees(&self) -> Option<f64> {
        match self {
            WindDirection::Degrees(d) => Some(f64::from(*d)),
            WindDirection::Variable => None,
        }
    }
}

impl fmt::Display for WindDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindDirection::Degrees(d) => write!(f, "{:03}°", d),
            WindDirection::Variable => write!(f, "VRB"),
        }
    }
}

/// Decoded wind group, speeds normalized to m/s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wind {
    pub direction: WindDirection,

    /// Sustained speed in m/s.
    pub speed_mps: f64,

    /// Gust speed in m/s, when reported.
    pub gust_mps: Option<f64>,
}

/// Decoded visibility.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Visibility {
    /// Visibility in meters. Normalized to 10 000 when the report only
    /// states "10 km or more" (9999, CAVOK, or an equivalent distance).
    pub meters: f64,

    /// True when `meters` is a lower bound rather than a measurement.
    pub unbounded: bool,
}

impl Visibility {
    /// An unlimited-visibility value ("10 km or more").
    pub fn unlimited() -> Self {
        Visibility {
            meters: 10_000.0,
            unbounded: true,
        }
    }
}

/// Cloud coverage category from a layer group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloudCoverage {
    /// FEW: 1-2 oktas.
    Few,
    /// SCT: 3-4 oktas.
    Scattered,
    /// BKN: 5-7 oktas.
    Broken,
    /// OVC: 8 oktas.
    Overcast,
}

impl CloudCoverage {
    /// The METAR group code.
    pub fn code(&self) -> &'static str {
        match self {
            CloudCoverage::Few => "FEW",
            CloudCoverage::Scattered => "SCT",
            CloudCoverage::Broken => "BKN",
            CloudCoverage::Overcast => "OVC",
        }
    }

    /// Covered sky fraction as (min, max) oktas.
    pub fn oktas(&self) -> (u8, u8) {
        match self {
            CloudCoverage::Few => (1, 2),
            CloudCoverage::Scattered => (3, 4),
            CloudCoverage::Broken => (5, 7),
            CloudCoverage::Overcast => (8, 8),
        }
    }
}

impl fmt::Display for CloudCoverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One cloud layer: coverage plus base height in meters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudLayer {
    pub coverage: CloudCoverage,

    /// Layer base above ground in meters. `None` when the report
    /// carries an unknown height ("FEW///").
    pub base_m: Option<f64>,
}

/// Intensity or proximity qualifier of a weather group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intensity {
    Light,
    Moderate,
    Heavy,
    /// "VC": in the vicinity of, but not at, the station.
    Vicinity,
}

impl fmt::Display for Intensity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Intensity::Light => "light",
            Intensity::Moderate => "moderate",
            Intensity::Heavy => "heavy",
            Intensity::Vicinity => "in vicinity",
        };
        f.write_str(s)
    }
}

/// Weather descriptor (two-letter qualifier preceding the phenomenon).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Descriptor {
    Shallow,
    Patches,
    Partial,
    LowDrifting,
    Blowing,
    Showers,
    Thunderstorm,
    Freezing,
}

impl Descriptor {
    pub fn code(&self) -> &'static str {
        match self {
            Descriptor::Shallow => "MI",
            Descriptor::Patches => "BC",
            Descriptor::Partial => "PR",
            Descriptor::LowDrifting => "DR",
            Descriptor::Blowing => "BL",
            Descriptor::Showers => "SH",
            Descriptor::Thunderstorm => "TS",
            Descriptor::Freezing => "FZ",
        }
    }
}

/// Precipitation or obscuration phenomenon code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phenomenon {
    Drizzle,
    Rain,
    Snow,
    SnowGrains,
    IceCrystals,
    IcePellets,
    Hail,
    SmallHail,
    UnknownPrecipitation,
    Mist,
    Fog,
    Smoke,
    VolcanicAsh,
    Dust,
    Sand,
    Haze,
    DustWhirls,
    Squalls,
    FunnelCloud,
    Sandstorm,
    Duststorm,
}

impl Phenomenon {
    pub fn code(&self) -> &'static str {
        match self {
            Phenomenon::Drizzle => "DZ",
            Phenomenon::Rain => "RA",
            Phenomenon::Snow => "SN",
            Phenomenon::SnowGrains => "SG",
            Phenomenon::IceCrystals => "IC",
            Phenomenon::IcePellets => "PL",
            Phenomenon::Hail => "GR",
            Phenomenon::SmallHail => "GS",
            Phenomenon::UnknownPrecipitation => "UP",
            Phenomenon::Mist => "BR",
            Phenomenon::Fog => "FG",
            Phenomenon::Smoke => "FU",
            Phenomenon::VolcanicAsh => "VA",
            Phenomenon::Dust => "DU",
            Phenomenon::Sand => "SA",
            Phenomenon::Haze => "HZ",
            Phenomenon::DustWhirls => "PO",
            Phenomenon::Squalls => "SQ",
            Phenomenon::FunnelCloud => "FC",
            Phenomenon::Sandstorm => "SS",
            Phenomenon::Duststorm => "DS",
        }
    }
}

/// One present-weather group: qualifier, optional descriptor, and the
/// phenomena it applies to (a group like "-SHRASN" carries two).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherCondition {
    pub intensity: Intensity,
    pub descriptor: Option<Descriptor>,
    pub phenomena: Vec<Phenomenon>,
}

/// A decoded METAR observation in canonical units.
///
/// Parse output only: never mutated after creation, always traceable to
/// exactly one [`RawReport`] via the retained `raw` text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Station that issued the report.
    pub station: StationCode,

    /// Observation time (UTC, minute precision), resolved from the
    /// DDHHMMZ group against the fetch time.
    pub timestamp: DateTime<Utc>,

    /// Air temperature in °C.
    pub temperature: Option<f64>,

    /// Dew point in °C.
    pub dew_point: Option<f64>,

    /// Wind group, speeds in m/s.
    pub wind: Option<Wind>,

    /// Prevailing visibility in meters.
    pub visibility: Option<Visibility>,

    /// Sea-level pressure (QNH) in hPa.
    pub pressure_hpa: Option<f64>,

    /// Cloud layers, lowest first, base heights in meters.
    pub cloud_layers: Vec<CloudLayer>,

    /// Present weather phenomena.
    pub weather: Vec<WeatherCondition>,

    /// "Ceiling and visibility OK" shorthand.
    pub cavok: bool,

    /// Report came from a fully automated station.
    pub auto: bool,

    /// The raw report text, retained for passthrough.
    pub raw: String,
}

impl Observation {
    /// Relative humidity in percent, derived from temperature and dew
    /// point. `None` when either input is absent.
    pub fn relative_humidity(&self) -> Option<f64> {
        crate::units::relative_humidity(self.temperature?, self.dew_point?)
    }

    /// Wind chill in °C, when the standard formula applies.
    pub fn wind_chill(&self) -> Option<f64> {
        crate::units::wind_chill(self.temperature?, self.wind.as_ref()?.speed_mps)
    }

    /// Beaufort number for the sustained wind speed.
    pub fn beaufort(&self) -> Option<u8> {
        self.wind.as_ref().map(|w| crate::units::beaufort(w.speed_mps))
    }
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.station, self.timestamp.format("%d %H:%MZ"))?;
        if let Some(t) = self.temperature {
            write!(f, " {:.0}°C", t)?;
        }
        if let Some(w) = &self.wind {
            write!(f, " wind {} {:.1} m/s", w.direction, w.speed_mps)?;
            if let Some(g) = w.gust_mps {
                write!(f, " gust {:.1}", g)?;
            }
        }
        if let Some(p) = self.pressure_hpa {
            write!(f, " {:.1} hPa", p)?;
        }
        if self.cavok {
            write!(f, " CAVOK")?;
        }
        Ok(())
    }
}
