//! Derived meteorological values and display-unit conversion.
//!
//! Observations are stored in one canonical unit set (°C, m/s, meters,
//! hPa). Everything here is a pure function of those canonical values:
//! humidity, wind chill and Beaufort numbers are recomputed on demand
//! rather than stored, and unit conversion is applied only at the
//! output boundary, never to the observation itself.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::observation::Visibility;

const KNOT_MPS: f64 = 0.514_444;
const MILE_M: f64 = 1_609.344;
const FOOT_M: f64 = 0.3048;
const INHG_HPA: f64 = 33.8639;

/// Relative humidity in percent from temperature and dew point (°C),
/// using the Magnus saturation-vapor-pressure approximation.
///
/// Returns `None` when the formula degenerates (inputs near -237.7 °C
/// are not physical).
pub fn relative_humidity(temp_c: f64, dew_c: f64) -> Option<f64> {
    if temp_c + 237.7 <= 0.1 || dew_c + 237.7 <= 0.1 {
        return None;
    }
    let e = 6.11 * 10f64.powf(7.5 * dew_c / (237.7 + dew_c));
    let es = 6.11 * 10f64.powf(7.5 * temp_c / (237.7 + temp_c));
    if es <= 0.0 || !es.is_finite() || !e.is_finite() {
        return None;
    }
    Some((e / es * 100.0).clamp(0.0, 100.0))
}

/// Wind chill in °C (Environment Canada / NWS formula).
///
/// Defined only for temperatures at or below 10 °C and winds above
/// 4.8 km/h; outside that envelope returns `None`.
pub fn wind_chill(temp_c: f64, speed_mps: f64) -> Option<f64> {
    let speed_kmh = speed_mps * 3.6;
    if temp_c > 10.0 || speed_kmh <= 4.8 {
        return None;
    }
    let v = speed_kmh.powf(0.16);
    Some(13.12 + 0.6215 * temp_c - 11.37 * v + 0.3965 * temp_c * v)
}

/// Beaufort scale number (0-12) for a wind speed in m/s.
pub fn beaufort(speed_mps: f64) -> u8 {
    const UPPER_BOUNDS: [f64; 12] = [
        0.5, 1.5, 3.3, 5.5, 7.9, 10.7, 13.8, 17.1, 20.7, 24.4, 28.4, 32.6,
    ];
    UPPER_BOUNDS
        .iter()
        .position(|bound| speed_mps <= *bound)
        .unwrap_or(12) as u8
}

/// Coarse visibility quality buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisibilityCategory {
    /// 10 km or more.
    Excellent,
    /// 5 km to 10 km.
    Good,
    /// 1.5 km to 5 km.
    Moderate,
    /// Below 1.5 km.
    Poor,
}

impl fmt::Display for VisibilityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VisibilityCategory::Excellent => "excellent",
            VisibilityCategory::Good => "good",
            VisibilityCategory::Moderate => "moderate",
            VisibilityCategory::Poor => "poor",
        };
        f.write_str(s)
    }
}

/// Categorize a decoded visibility.
pub fn visibility_category(visibility: &Visibility) -> VisibilityCategory {
    if visibility.unbounded || visibility.meters >= 10_000.0 {
        VisibilityCategory::Excellent
    } else if visibility.meters >= 5_000.0 {
        VisibilityCategory::Good
    } else if visibility.meters >= 1_500.0 {
        VisibilityCategory::Moderate
    } else {
        VisibilityCategory::Poor
    }
}

/// Display unit for temperatures (canonical: °C).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemperatureUnit {
    #[default]
    Celsius,
    Fahrenheit,
}

impl TemperatureUnit {
    pub fn from_si(&self, celsius: f64) -> f64 {
        match self {
            TemperatureUnit::Celsius => celsius,
            TemperatureUnit::Fahrenheit => celsius * 9.0 / 5.0 + 32.0,
        }
    }

    pub fn to_si(&self, value: f64) -> f64 {
        match self {
            TemperatureUnit::Celsius => value,
            TemperatureUnit::Fahrenheit => (value - 32.0) * 5.0 / 9.0,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            TemperatureUnit::Celsius => "°C",
            TemperatureUnit::Fahrenheit => "°F",
        }
    }
}

/// Display unit for wind speeds (canonical: m/s).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeedUnit {
    #[default]
    MetersPerSecond,
    Knots,
    KilometersPerHour,
    MilesPerHour,
}

impl SpeedUnit {
    fn factor(&self) -> f64 {
        match self {
            SpeedUnit::MetersPerSecond => 1.0,
            SpeedUnit::Knots => 1.0 / KNOT_MPS,
            SpeedUnit::KilometersPerHour => 3.6,
            SpeedUnit::MilesPerHour => 3_600.0 / MILE_M,
        }
    }

    pub fn from_si(&self, mps: f64) -> f64 {
        mps * self.factor()
    }

    pub fn to_si(&self, value: f64) -> f64 {
        value / self.factor()
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            SpeedUnit::MetersPerSecond => "m/s",
            SpeedUnit::Knots => "kt",
            SpeedUnit::KilometersPerHour => "km/h",
            SpeedUnit::MilesPerHour => "mph",
        }
    }
}

/// Display unit for visibility distances (canonical: meters).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceUnit {
    #[default]
    Meters,
    Kilometers,
    StatuteMiles,
}

impl DistanceUnit {
    fn factor(&self) -> f64 {
        match self {
            DistanceUnit::Meters => 1.0,
            DistanceUnit::Kilometers => 1.0 / 1_000.0,
            DistanceUnit::StatuteMiles => 1.0 / MILE_M,
        }
    }

    pub fn from_si(&self, meters: f64) -> f64 {
        meters * self.factor()
    }

    pub fn to_si(&self, value: f64) -> f64 {
        value / self.factor()
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            DistanceUnit::Meters => "m",
            DistanceUnit::Kilometers => "km",
            DistanceUnit::StatuteMiles => "mi",
        }
    }
}

/// Display unit for pressures (canonical: hPa).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PressureUnit {
    #[default]
    Hectopascals,
    InchesOfMercury,
}

impl PressureUnit {
    pub fn from_si(&self, hpa: f64) -> f64 {
        match self {
            PressureUnit::Hectopascals => hpa,
            PressureUnit::InchesOfMercury => hpa / INHG_HPA,
        }
    }

    pub fn to_si(&self, value: f64) -> f64 {
        match self {
            PressureUnit::Hectopascals => value,
            PressureUnit::InchesOfMercury => value * INHG_HPA,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            PressureUnit::Hectopascals => "hPa",
            PressureUnit::InchesOfMercury => "inHg",
        }
    }
}

/// Display unit for cloud base heights (canonical: meters).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeightUnit {
    #[default]
    Meters,
    Feet,
}

impl HeightUnit {
    pub fn from_si(&self, meters: f64) -> f64 {
        match self {
            HeightUnit::Meters => meters,
            HeightUnit::Feet => meters / FOOT_M,
        }
    }

    pub fn to_si(&self, value: f64) -> f64 {
        match self {
            HeightUnit::Meters => value,
            HeightUnit::Feet => value * FOOT_M,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            HeightUnit::Meters => "m",
            HeightUnit::Feet => "ft",
        }
    }
}

/// Per-quantity display units. Defaults to the canonical SI set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitPreferences {
    pub temperature: TemperatureUnit,
    pub wind_speed: SpeedUnit,
    pub visibility: DistanceUnit,
    pub pressure: PressureUnit,
    pub cloud_base: HeightUnit,
}

impl UnitPreferences {
    /// Everyday metric units (km/h winds, km visibility).
    pub fn metric() -> Self {
        UnitPreferences {
            wind_speed: SpeedUnit::KilometersPerHour,
            visibility: DistanceUnit::Kilometers,
            ..Default::default()
        }
    }

    /// US aviation-style units.
    pub fn imperial() -> Self {
        UnitPreferences {
            temperature: TemperatureUnit::Fahrenheit,
            wind_speed: SpeedUnit::Knots,
            visibility: DistanceUnit::StatuteMiles,
            pressure: PressureUnit::InchesOfMercury,
            cloud_base: HeightUnit::Feet,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_humidity_reference_values() {
        // 22/18 °C is about 78 % (parser test report).
        let rh = relative_humidity(22.0, 18.0).unwrap();
        assert!((rh - 78.0).abs() < 1.0, "got {}", rh);

        // Saturated air.
        let rh = relative_humidity(15.0, 15.0).unwrap();
        assert!((rh - 100.0).abs() < 0.01);

        // Very dry air stays in range.
        let rh = relative_humidity(35.0, -10.0).unwrap();
        assert!(rh > 0.0 && rh < 15.0);
    }

    #[test]
    fn test_relative_humidity_degenerate_inputs() {
        assert!(relative_humidity(-240.0, -250.0).is_none());
    }

    #[test]
    fn test_wind_chill_envelope() {
        // Cold and windy: well below air temperature.
        let chill = wind_chill(-10.0, 10.0).unwrap();
        assert!(chill < -18.0 && chill > -25.0, "got {}", chill);

        // Too warm or too calm: undefined.
        assert!(wind_chill(15.0, 10.0).is_none());
        assert!(wind_chill(-10.0, 1.0).is_none());
    }

    #[test]
    fn test_beaufort_scale() {
        assert_eq!(beaufort(0.2), 0);
        assert_eq!(beaufort(1.0), 1);
        assert_eq!(beaufort(7.7), 4);
        assert_eq!(beaufort(13.0), 6);
        assert_eq!(beaufort(25.0), 10);
        assert_eq!(beaufort(40.0), 12);
    }

    #[test]
    fn test_visibility_categories() {
        let vis = |meters, unbounded| Visibility { meters, unbounded };
        assert_eq!(
            visibility_category(&vis(10_000.0, true)),
            VisibilityCategory::Excellent
        );
        assert_eq!(
            visibility_category(&vis(8_000.0, false)),
            VisibilityCategory::Good
        );
        assert_eq!(
            visibility_category(&vis(3_000.0, false)),
            VisibilityCategory::Moderate
        );
        assert_eq!(
            visibility_category(&vis(400.0, false)),
            VisibilityCategory::Poor
        );
    }

    #[test]
    fn test_temperature_conversion() {
        assert!((TemperatureUnit::Fahrenheit.from_si(22.0) - 71.6).abs() < 0.01);
        assert!((TemperatureUnit::Fahrenheit.to_si(32.0)).abs() < f64::EPSILON);
    }

    #[test]
    fn test_conversion_round_trips() {
        // Display-unit conversion and back must reproduce the canonical
        // value within floating-point tolerance.
        let tol = 1e-9;
        for v in [0.0, 7.717, -12.5, 1013.25, 10_000.0] {
            for unit in [
                SpeedUnit::MetersPerSecond,
                SpeedUnit::Knots,
                SpeedUnit::KilometersPerHour,
                SpeedUnit::MilesPerHour,
            ] {
                assert!((unit.to_si(unit.from_si(v)) - v).abs() < tol);
            }
            for unit in [TemperatureUnit::Celsius, TemperatureUnit::Fahrenheit] {
                assert!((unit.to_si(unit.from_si(v)) - v).abs() < tol);
            }
            for unit in [
                DistanceUnit::Meters,
                DistanceUnit::Kilometers,
                DistanceUnit::StatuteMiles,
            ] {
                assert!((unit.to_si(unit.from_si(v)) - v).abs() < tol);
            }
            for unit in [PressureUnit::Hectopascals, PressureUnit::InchesOfMercury] {
                assert!((unit.to_si(unit.from_si(v)) - v).abs() < tol);
            }
            for unit in [HeightUnit::Meters, HeightUnit::Feet] {
                assert!((unit.to_si(unit.from_si(v)) - v).abs() < tol);
            }
        }
    }

    #[test]
    fn test_unit_preference_presets() {
        let imperial = UnitPreferences::imperial();
        assert_eq!(imperial.pressure, PressureUnit::InchesOfMercury);
        assert_eq!(UnitPreferences::default().pressure, PressureUnit::Hectopascals);
    }

    #[test]
    fn test_unit_preferences_from_toml() {
        let prefs: UnitPreferences = toml::from_str(
            r#"
            temperature = "fahrenheit"
            wind_speed = "knots"
            "#,
        )
        .unwrap();
        assert_eq!(prefs.temperature, TemperatureUnit::Fahrenheit);
        assert_eq!(prefs.wind_speed, SpeedUnit::Knots);
        // Unspecified quantities keep canonical units.
        assert_eq!(prefs.pressure, PressureUnit::Hectopascals);
    }
}
