//! Configuration file support for metar-watch.
//!
//! Loads settings from `~/.config/metar-watch/config.toml` on Linux
//! (or platform-appropriate location on other OSes).

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

use crate::observation::StationCode;
use crate::trend::TrendConfig;
use crate::units::UnitPreferences;

/// Retention choices offered by the CLI. Other positive values are
/// accepted from the config file.
pub const RETENTION_CHOICES: [u32; 4] = [6, 12, 24, 48];

/// Application configuration loaded from TOML file.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Stations to watch, as ICAO identifiers.
    pub stations: Vec<String>,

    /// Scheduled update interval in seconds.
    pub update_interval: u64,

    /// History retention horizon in hours.
    pub retention_hours: u32,

    /// Spread scheduled updates with a per-station offset.
    pub jitter: bool,

    /// Base URL of the report API.
    pub provider_url: String,

    /// Display units.
    pub units: UnitPreferences,

    /// Trend classification thresholds.
    pub trend: TrendConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stations: Vec::new(),
            update_interval: 3600,
            retention_hours: 24,
            jitter: true,
            provider_url: crate::provider::AWC_BASE_URL.to_string(),
            units: UnitPreferences::default(),
            trend: TrendConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default config file location.
    ///
    /// Returns default config if the file doesn't exist.
    /// Returns an error if the file exists but is malformed.
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) if path.exists() => {
                let content = fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config file: {}", path.display()))?;
                toml::from_str(&content)
                    .with_context(|| format!("Invalid TOML in config file: {}", path.display()))
            }
            _ => Ok(Config::default()),
        }
    }

    /// Returns the path to the config file.
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("metar-watch/config.toml"))
    }

    /// Validate all configuration settings.
    pub fn validate(&self) -> Result<()> {
        for station in &self.stations {
            station
                .parse::<StationCode>()
                .map_err(|e| anyhow::anyhow!("Invalid station {:?}: {}", station, e))?;
        }
        if self.update_interval == 0 {
            anyhow::bail!("update_interval must be positive");
        }
        if self.retention_hours == 0 {
            anyhow::bail!("retention_hours must be positive");
        }
        Ok(())
    }

    /// Stations as parsed codes. Call [`Config::validate`] first.
    pub fn station_codes(&self) -> Result<Vec<StationCode>> {
        self.stations
            .iter()
            .map(|s| {
                s.parse::<StationCode>()
                    .map_err(|e| anyhow::anyhow!("Invalid station {:?}: {}", s, e))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::TemperatureUnit;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.stations.is_empty());
        assert_eq!(config.update_interval, 3600);
        assert_eq!(config.retention_hours, 24);
        assert!(config.jitter);
        assert_eq!(config.provider_url, crate::provider::AWC_BASE_URL);
    }

    #[test]
    fn test_parse_minimal_toml() {
        let toml = r#"
            stations = ["KJFK", "EGLL"]
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.stations, vec!["KJFK", "EGLL"]);
        // Other fields should use defaults
        assert_eq!(config.update_interval, 3600);
        assert_eq!(config.retention_hours, 24);
    }

    #[test]
    fn test_parse_full_toml() {
        let toml = r#"
            stations = ["KJFK"]
            update_interval = 1800
            retention_hours = 48
            jitter = false
            provider_url = "http://localhost:8080/metar"

            [units]
            temperature = "fahrenheit"
            wind_speed = "knots"

            [trend]
            temperature_threshold = 0.5
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.update_interval, 1800);
        assert_eq!(config.retention_hours, 48);
        assert!(!config.jitter);
        assert_eq!(config.provider_url, "http://localhost:8080/metar");
        assert_eq!(config.units.temperature, TemperatureUnit::Fahrenheit);
        assert_eq!(config.trend.temperature_threshold, 0.5);
        // Unset threshold keeps its default
        assert_eq!(config.trend.pressure_threshold, 0.3);
    }

    #[test]
    fn test_validate_rejects_bad_station() {
        let config = Config {
            stations: vec!["TOOLONG".to_string()],
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let config = Config {
            update_interval: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_station_codes_normalize_case() {
        let config = Config {
            stations: vec!["kjfk".to_string()],
            ..Config::default()
        };
        let codes = config.station_codes().unwrap();
        assert_eq!(codes[0].as_str(), "KJFK");
    }
}
