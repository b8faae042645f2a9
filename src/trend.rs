//! Trend analysis over a station's recent observations.
//!
//! Scalar quantities (temperature, pressure, humidity) are compared
//! against the mean of the trailing samples; a noise threshold per
//! quantity keeps sensor jitter from flapping the trend. Wind
//! direction uses the shortest signed angular difference so a swing
//! across north (350 to 010 degrees) reads as a 20 degree veer, not a
//! 340 degree back.

use serde::{Deserialize, Serialize};

use crate::observation::Observation;

/// Thresholds and window size for trend classification.
///
/// All fields have defaults, so a TOML `[trend]` table may set any
/// subset of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrendConfig {
    /// How many trailing observations to average against.
    pub trailing_samples: usize,
    /// Minimum temperature movement, in degrees Celsius.
    pub temperature_threshold: f64,
    /// Minimum pressure movement, in hectopascals.
    pub pressure_threshold: f64,
    /// Minimum relative humidity movement, in percentage points.
    pub humidity_threshold: f64,
    /// Minimum wind direction movement, in degrees.
    pub direction_threshold_deg: f64,
}

impl Default for TrendConfig {
    fn default() -> Self {
        TrendConfig {
            trailing_samples: 3,
            temperature_threshold: 0.2,
            pressure_threshold: 0.3,
            humidity_threshold: 2.0,
            direction_threshold_deg: 10.0,
        }
    }
}

/// Direction of change for a scalar quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Rising,
    Falling,
    Stable,
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Trend::Rising => "rising",
            Trend::Falling => "falling",
            Trend::Stable => "stable",
        };
        write!(f, "{label}")
    }
}

/// Rotation sense for wind direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectionTrend {
    /// Turning clockwise (e.g. south to southwest).
    Veering,
    /// Turning counterclockwise.
    Backing,
    Steady,
}

impl std::fmt::Display for DirectionTrend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DirectionTrend::Veering => "veering",
            DirectionTrend::Backing => "backing",
            DirectionTrend::Steady => "steady",
        };
        write!(f, "{label}")
    }
}

/// Classified trend plus summary statistics for one scalar quantity.
///
/// Statistics cover every sample in the analysis window, current
/// observation included, regardless of the trailing-sample count used
/// for classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendResult {
    pub trend: Trend,
    pub current: f64,
    pub min: f64,
    pub max: f64,
    pub average: f64,
    /// Number of samples the statistics cover.
    pub samples: usize,
}

/// Wind direction trend with the signed angular movement in degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindDirectionTrend {
    pub trend: DirectionTrend,
    /// Positive is clockwise.
    pub delta_deg: f64,
}

/// Trends for every quantity the current observation carries.
///
/// A quantity missing from the current observation (or not derivable,
/// like humidity without a dew point) is `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendReport {
    pub temperature: Option<TrendResult>,
    pub pressure: Option<TrendResult>,
    pub humidity: Option<TrendResult>,
    pub wind_direction: Option<WindDirectionTrend>,
}

/// Shortest signed rotation from `from` to `to`, in degrees.
///
/// The result is in (-180, 180]; positive means clockwise.
pub fn angular_delta(from: f64, to: f64) -> f64 {
    let mut delta = (to - from) % 360.0;
    if delta > 180.0 {
        delta -= 360.0;
    } else if delta <= -180.0 {
        delta += 360.0;
    }
    delta
}

/// Classify trends for `current` against `prior` observations.
///
/// `prior` must be oldest first and must not contain `current`. With
/// no prior samples everything classifies as stable or steady.
pub fn analyze(current: &Observation, prior: &[Observation], config: &TrendConfig) -> TrendReport {
    TrendReport {
        temperature: scalar_trend(
            current.temperature,
            prior,
            |o| o.temperature,
            config,
            config.temperature_threshold,
        ),
        pressure: scalar_trend(
            current.pressure_hpa,
            prior,
            |o| o.pressure_hpa,
            config,
            config.pressure_threshold,
        ),
        humidity: scalar_trend(
            current.relative_humidity(),
            prior,
            |o| o.relative_humidity(),
            config,
            config.humidity_threshold,
        ),
        wind_direction: direction_trend(current, prior, config),
    }
}

fn scalar_trend(
    current: Option<f64>,
    prior: &[Observation],
    extract: impl Fn(&Observation) -> Option<f64>,
    config: &TrendConfig,
    threshold: f64,
) -> Option<TrendResult> {
    let current = current?;
    let history: Vec<f64> = prior.iter().filter_map(&extract).collect();

    let trend = if history.is_empty() {
        Trend::Stable
    } else {
        let tail = &history[history.len().saturating_sub(config.trailing_samples)..];
        let baseline = tail.iter().sum::<f64>() / tail.len() as f64;
        let delta = current - baseline;
        if delta > threshold {
            Trend::Rising
        } else if delta < -threshold {
            Trend::Falling
        } else {
            Trend::Stable
        }
    };

    let mut min = current;
    let mut max = current;
    let mut sum = current;
    for value in &history {
        min = min.min(*value);
        max = max.max(*value);
        sum += value;
    }
    let samples = history.len() + 1;

    Some(TrendResult {
        trend,
        current,
        min,
        max,
        average: sum / samples as f64,
        samples,
    })
}

fn direction_trend(
    current: &Observation,
    prior: &[Observation],
    config: &TrendConfig,
) -> Option<WindDirectionTrend> {
    let current_deg = current.wind.as_ref()?.direction.degrees()?;

    let history: Vec<f64> = prior
        .iter()
        .filter_map(|o| o.wind.as_ref()?.direction.degrees())
        .collect();
    if history.is_empty() {
        return Some(WindDirectionTrend {
            trend: DirectionTrend::Steady,
            delta_deg: 0.0,
        });
    }

    // Headings do not average cleanly across north, so the baseline is
    // the earliest reported direction in the window rather than a mean.
    let delta = angular_delta(history[0], current_deg);

    let trend = if delta > config.direction_threshold_deg {
        DirectionTrend::Veering
    } else if delta < -config.direction_threshold_deg {
        DirectionTrend::Backing
    } else {
        DirectionTrend::Steady
    };

    Some(WindDirectionTrend {
        trend,
        delta_deg: delta,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::{StationCode, Wind, WindDirection};
    use chrono::{Duration, TimeZone, Utc};

    fn base_obs(hours_ago: i64) -> Observation {
        let now = Utc.with_ymd_and_hms(2024, 6, 26, 18, 0, 0).unwrap();
        Observation {
            station: "KJFK".parse::<StationCode>().unwrap(),
            timestamp: now - Duration::hours(hours_ago),
            temperature: None,
            dew_point: None,
            wind: None,
            visibility: None,
            pressure_hpa: None,
            cloud_layers: Vec::new(),
            weather: Vec::new(),
            cavok: false,
            auto: false,
            raw: String::new(),
        }
    }

    fn temp_obs(hours_ago: i64, temp: f64) -> Observation {
        let mut obs = base_obs(hours_ago);
        obs.temperature = Some(temp);
        obs
    }

    fn wind_obs(hours_ago: i64, direction_deg: u16) -> Observation {
        let mut obs = base_obs(hours_ago);
        obs.wind = Some(Wind {
            direction: WindDirection::Degrees(direction_deg),
            speed_mps: 5.0,
            gust_mps: None,
        });
        obs
    }

    fn pressure_obs(hours_ago: i64, hpa: f64) -> Observation {
        let mut obs = base_obs(hours_ago);
        obs.pressure_hpa = Some(hpa);
        obs
    }

    #[test]
    fn test_rising_temperature() {
        let prior = vec![temp_obs(3, 18.0), temp_obs(2, 18.4), temp_obs(1, 18.2)];
        let report = analyze(&temp_obs(0, 20.0), &prior, &TrendConfig::default());

        let temp = report.temperature.unwrap();
        assert_eq!(temp.trend, Trend::Rising);
        assert_eq!(temp.samples, 4);
        assert_eq!(temp.min, 18.0);
        assert_eq!(temp.max, 20.0);
    }

    #[test]
    fn test_falling_pressure() {
        let prior = vec![pressure_obs(2, 1016.0), pressure_obs(1, 1015.5)];
        let report = analyze(&pressure_obs(0, 1013.2), &prior, &TrendConfig::default());
        assert_eq!(report.pressure.unwrap().trend, Trend::Falling);
    }

    #[test]
    fn test_jitter_below_threshold_is_stable() {
        // 0.1 degree wobble is under the 0.2 degree threshold.
        let prior = vec![temp_obs(2, 20.0), temp_obs(1, 20.1)];
        let report = analyze(&temp_obs(0, 20.1), &prior, &TrendConfig::default());
        assert_eq!(report.temperature.unwrap().trend, Trend::Stable);
    }

    #[test]
    fn test_single_observation_is_stable() {
        let report = analyze(&temp_obs(0, 20.0), &[], &TrendConfig::default());
        let temp = report.temperature.unwrap();
        assert_eq!(temp.trend, Trend::Stable);
        assert_eq!(temp.samples, 1);
        assert_eq!(temp.average, 20.0);
    }

    #[test]
    fn test_trailing_window_ignores_old_samples() {
        // Old cold readings must not drag the baseline down once the
        // trailing window has moved past them.
        let prior = vec![
            temp_obs(6, 5.0),
            temp_obs(5, 5.0),
            temp_obs(3, 20.0),
            temp_obs(2, 20.0),
            temp_obs(1, 20.0),
        ];
        let report = analyze(&temp_obs(0, 20.1), &prior, &TrendConfig::default());
        assert_eq!(report.temperature.unwrap().trend, Trend::Stable);
    }

    #[test]
    fn test_missing_quantity_yields_no_trend() {
        let prior = vec![temp_obs(1, 20.0)];
        let report = analyze(&temp_obs(0, 21.0), &prior, &TrendConfig::default());
        assert!(report.pressure.is_none());
        assert!(report.humidity.is_none());
        assert!(report.wind_direction.is_none());
    }

    #[test]
    fn test_humidity_trend_from_temp_and_dew_point() {
        let mut dry = temp_obs(1, 22.0);
        dry.dew_point = Some(5.0);
        let mut humid = temp_obs(0, 22.0);
        humid.dew_point = Some(18.0);

        let report = analyze(&humid, &[dry], &TrendConfig::default());
        assert_eq!(report.humidity.unwrap().trend, Trend::Rising);
    }

    #[test]
    fn test_veering_wind() {
        let prior = vec![wind_obs(2, 180), wind_obs(1, 190)];
        let report = analyze(&wind_obs(0, 230), &prior, &TrendConfig::default());
        let wind = report.wind_direction.unwrap();
        assert_eq!(wind.trend, DirectionTrend::Veering);
        assert!(wind.delta_deg > 0.0);
    }

    #[test]
    fn test_backing_wind() {
        let prior = vec![wind_obs(1, 230)];
        let report = analyze(&wind_obs(0, 180), &prior, &TrendConfig::default());
        assert_eq!(report.wind_direction.unwrap().trend, DirectionTrend::Backing);
    }

    #[test]
    fn test_veer_across_north() {
        // 350 to 010 is a 20 degree clockwise turn, not 340 degrees back.
        let prior = vec![wind_obs(1, 350)];
        let report = analyze(&wind_obs(0, 10), &prior, &TrendConfig::default());
        let wind = report.wind_direction.unwrap();
        assert_eq!(wind.trend, DirectionTrend::Veering);
        assert!((wind.delta_deg - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_back_across_north() {
        let prior = vec![wind_obs(1, 10)];
        let report = analyze(&wind_obs(0, 340), &prior, &TrendConfig::default());
        let wind = report.wind_direction.unwrap();
        assert_eq!(wind.trend, DirectionTrend::Backing);
        assert!((wind.delta_deg + 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_variable_wind_is_not_classified() {
        let mut current = base_obs(0);
        current.wind = Some(Wind {
            direction: WindDirection::Variable,
            speed_mps: 2.0,
            gust_mps: None,
        });
        let prior = vec![wind_obs(1, 180)];
        let report = analyze(&current, &prior, &TrendConfig::default());
        assert!(report.wind_direction.is_none());
    }

    #[test]
    fn test_wind_baseline_is_earliest_in_window() {
        // A wobble through north mid-window must not move the baseline;
        // the delta is measured from where the window started.
        let prior = vec![
            wind_obs(4, 30),
            wind_obs(3, 359),
            wind_obs(2, 358),
            wind_obs(1, 357),
        ];
        let report = analyze(&wind_obs(0, 35), &prior, &TrendConfig::default());
        let wind = report.wind_direction.unwrap();
        assert_eq!(wind.trend, DirectionTrend::Steady);
        assert!((wind.delta_deg - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_direction_jitter_is_steady() {
        let prior = vec![wind_obs(2, 180), wind_obs(1, 185)];
        let report = analyze(&wind_obs(0, 178), &prior, &TrendConfig::default());
        assert_eq!(report.wind_direction.unwrap().trend, DirectionTrend::Steady);
    }

    #[test]
    fn test_angular_delta_range() {
        assert_eq!(angular_delta(0.0, 180.0), 180.0);
        assert_eq!(angular_delta(180.0, 0.0), 180.0);
        assert_eq!(angular_delta(90.0, 90.0), 0.0);
        assert_eq!(angular_delta(350.0, 10.0), 20.0);
        assert_eq!(angular_delta(10.0, 350.0), -20.0);
    }

    #[test]
    fn test_config_partial_toml() {
        let config: TrendConfig = toml::from_str("temperature_threshold = 0.5").unwrap();
        assert_eq!(config.temperature_threshold, 0.5);
        assert_eq!(config.trailing_samples, 3);
    }
}
