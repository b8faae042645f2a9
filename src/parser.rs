//! Parser for METAR surface weather reports.
//!
//! This module uses the `nom` parsing library to decode raw METAR text
//! into structured observations. The grammar is walked token by token in
//! its fixed order (station, time, wind, visibility, weather, clouds,
//! temperature/dew point, pressure); each category has a dedicated
//! matcher. Unrecognized tokens are skipped rather than failing the
//! parse, which is deliberate: real-world reports carry regional
//! extensions and non-standard remarks. Only the station identifier and
//! the observation time are mandatory.
//!
//! # Report format
//!
//! ```text
//! KJFK 261651Z 18015G25KT 10SM FEW035 22/18 A3000
//! ```

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while_m_n},
    character::complete::char,
    combinator::{all_consuming, map, map_res, opt, value, verify},
    multi::many0,
    sequence::preceded,
};
use thiserror::Error;
use tracing::trace;

use crate::observation::{
    CloudCoverage, CloudLayer, Descriptor, Intensity, Observation, Phenomenon, RawReport,
    StationCode, Visibility, WeatherCondition, Wind, WindDirection,
};

/// Meters per second per knot, for KT wind speeds.
const KNOT_MPS: f64 = 0.514_444;

/// Meters per statute mile, for SM visibility groups.
const STATUTE_MILE_M: f64 = 1_609.344;

/// Meters per foot, for cloud base heights.
const FOOT_M: f64 = 0.3048;

/// Hectopascals per inch of mercury, for A-group altimeters.
const INHG_HPA: f64 = 33.8639;

/// Visibility at or above this is reported as "10 km or more".
const UNLIMITED_VISIBILITY_M: f64 = 10_000.0;

/// Errors that can fail a report parse outright.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    /// The report does not begin with a valid station identifier, or
    /// carries no observation-time group at all.
    #[error("malformed report: {0}")]
    MalformedReport(String),

    /// The observation-time group has an out-of-range day, hour or
    /// minute, or cannot be anchored to a calendar month.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// The DDHHMMZ observation-time group, not yet anchored to a month.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportTime {
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
}

impl ReportTime {
    /// Anchor this day-of-month time to a concrete UTC timestamp using
    /// a reference instant (normally the fetch time). Walks back up to
    /// two months to handle reports issued just before a month rollover.
    pub fn resolve(&self, reference: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut year = reference.year();
        let mut month = reference.month();
        for _ in 0..3 {
            if let Some(ts) = Utc
                .with_ymd_and_hms(year, month, self.day, self.hour, self.minute, 0)
                .single()
                && ts <= reference + Duration::hours(24)
            {
                return Some(ts);
            }
            if month == 1 {
                month = 12;
                year -= 1;
            } else {
                month -= 1;
            }
        }
        None
    }
}

/// A fully tokenized report, before timestamp resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedReport {
    pub station: StationCode,
    pub time: ReportTime,
    pub temperature: Option<f64>,
    pub dew_point: Option<f64>,
    pub wind: Option<Wind>,
    pub visibility: Option<Visibility>,
    pub pressure_hpa: Option<f64>,
    pub cloud_layers: Vec<CloudLayer>,
    pub weather: Vec<WeatherCondition>,
    pub cavok: bool,
    pub auto: bool,
    pub raw: String,
}

impl ParsedReport {
    /// Resolve the observation time against `reference` and produce the
    /// immutable canonical observation.
    pub fn into_observation(self, reference: DateTime<Utc>) -> ParseResult<Observation> {
        let timestamp = self.time.resolve(reference).ok_or_else(|| {
            ParseError::InvalidTimestamp(format!(
                "day {} cannot be anchored near {}",
                self.time.day, reference
            ))
        })?;
        Ok(Observation {
            station: self.station,
            timestamp,
            temperature: self.temperature,
            dew_point: self.dew_point,
            wind: self.wind,
            visibility: self.visibility,
            pressure_hpa: self.pressure_hpa,
            cloud_layers: self.cloud_layers,
            weather: self.weather,
            cavok: self.cavok,
            auto: self.auto,
            raw: self.raw,
        })
    }
}

/// Decode a fetched raw report into an [`Observation`].
pub fn decode(raw: &RawReport) -> ParseResult<Observation> {
    parse_report(&raw.text)?.into_observation(raw.fetched_at)
}

/// Parse a raw METAR string.
///
/// # Example
///
/// ```
/// use metar_watch::parser::parse_report;
///
/// let report = parse_report("KJFK 261651Z 18015G25KT 10SM FEW035 22/18 A3000").unwrap();
/// assert_eq!(report.station.as_str(), "KJFK");
/// assert_eq!(report.time.day, 26);
/// ```
pub fn parse_report(input: &str) -> ParseResult<ParsedReport> {
    let mut tokens = input.split_ascii_whitespace();

    // Station identifier, optionally preceded by a report-type keyword.
    let mut first = tokens
        .next()
        .ok_or_else(|| ParseError::MalformedReport("empty report".to_string()))?;
    if first == "METAR" || first == "SPECI" {
        first = tokens
            .next()
            .ok_or_else(|| ParseError::MalformedReport("report type without a body".to_string()))?;
    }
    let station: StationCode = first
        .parse()
        .map_err(|_| ParseError::MalformedReport(format!("bad station identifier {:?}", first)))?;

    // Observation time: the next DDHHMMZ-shaped token. Anything before
    // it (AUTO markers misplaced by some feeds, etc.) is skipped.
    let mut time = None;
    for token in tokens.by_ref() {
        if let Some(parsed) = match_time_token(token) {
            time = Some(parsed?);
            break;
        }
        trace!(token, "skipping token before observation time");
    }
    let time =
        time.ok_or_else(|| ParseError::MalformedReport("missing observation time".to_string()))?;

    let mut report = ParsedReport {
        station,
        time,
        temperature: None,
        dew_point: None,
        wind: None,
        visibility: None,
        pressure_hpa: None,
        cloud_layers: Vec::new(),
        weather: Vec::new(),
        cavok: false,
        auto: false,
        raw: input.trim().to_string(),
    };

    for token in tokens {
        match token {
            // Trend groups and remarks end the main body.
            "RMK" | "TEMPO" | "BECMG" => break,
            "AUTO" => report.auto = true,
            "CAVOK" => {
                report.cavok = true;
                report.visibility = Some(Visibility::unlimited());
            }
            // Clear-sky and no-change markers carry no layer data.
            "COR" | "NOSIG" | "NSC" | "NCD" | "SKC" | "CLR" | "NSW" => {}
            _ => match_body_token(token, &mut report),
        }
    }

    Ok(report)
}

/// Match a DDHHMMZ token. Returns `None` when the token is not
/// timestamp-shaped, `Some(Err(..))` when it is but the values are out
/// of range.
fn match_time_token(token: &str) -> Option<ParseResult<ReportTime>> {
    let digits = token.strip_suffix('Z')?;
    if digits.len() != 6 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let day: u32 = digits[0..2].parse().ok()?;
    let hour: u32 = digits[2..4].parse().ok()?;
    let minute: u32 = digits[4..6].parse().ok()?;
    if !(1..=31).contains(&day) || hour > 23 || minute > 59 {
        return Some(Err(ParseError::InvalidTimestamp(format!(
            "out of range time group {:?}",
            token
        ))));
    }
    Some(Ok(ReportTime { day, hour, minute }))
}

/// Try the body-token matchers in grammar order. Each single-valued
/// category is consumed at most once (layers and weather groups
/// accumulate); a token matching nothing is skipped.
fn match_body_token(token: &str, report: &mut ParsedReport) {
    if report.wind.is_none()
        && let Ok((_, wind)) = all_consuming(wind_token).parse(token)
    {
        report.wind = Some(wind);
        return;
    }
    if is_variable_wind_sector(token) {
        trace!(token, "skipping variable wind sector");
        return;
    }
    if report.visibility.is_none()
        && let Ok((_, vis)) = all_consuming(visibility_token).parse(token)
    {
        report.visibility = Some(vis);
        return;
    }
    if is_runway_visual_range(token) {
        trace!(token, "skipping runway visual range");
        return;
    }
    if let Ok((_, condition)) = all_consuming(weather_token).parse(token) {
        report.weather.push(condition);
        return;
    }
    if let Ok((_, layer)) = all_consuming(cloud_token).parse(token) {
        report.cloud_layers.push(layer);
        return;
    }
    if report.temperature.is_none()
        && report.dew_point.is_none()
        && let Ok((_, (temp, dew))) = all_consuming(temp_dew_token).parse(token)
    {
        report.temperature = temp;
        report.dew_point = dew;
        return;
    }
    if report.pressure_hpa.is_none()
        && let Ok((_, hpa)) = all_consuming(pressure_token).parse(token)
    {
        report.pressure_hpa = Some(hpa);
        return;
    }
    trace!(token, "skipping unrecognized token");
}

/// Exactly `n` ASCII digits as a number.
fn fixed_digits(n: usize) -> impl for<'a> Fn(&'a str) -> IResult<&'a str, u32> {
    move |input| {
        map_res(
            take_while_m_n(n, n, |c: char| c.is_ascii_digit()),
            |s: &str| s.parse::<u32>(),
        )
        .parse(input)
    }
}

/// Two or three ASCII digits as a number (wind speeds and gusts).
fn speed_digits(input: &str) -> IResult<&str, u32> {
    map_res(
        take_while_m_n(2, 3, |c: char| c.is_ascii_digit()),
        |s: &str| s.parse::<u32>(),
    )
    .parse(input)
}

/// Wind group: `dddff(Gfff)?(KT|MPS)` or `VRBff(KT|MPS)`.
/// Speeds are normalized to m/s regardless of the unit suffix.
fn wind_token(input: &str) -> IResult<&str, Wind> {
    let (input, direction) = alt((
        value(WindDirection::Variable, tag("VRB")),
        map(verify(fixed_digits(3), |d| *d <= 360), |d| {
            WindDirection::Degrees(d as u16)
        }),
    ))
    .parse(input)?;
    let (input, speed) = speed_digits(input)?;
    let (input, gust) = opt(preceded(char('G'), speed_digits)).parse(input)?;
    let (input, to_mps) = alt((value(KNOT_MPS, tag("KT")), value(1.0, tag("MPS")))).parse(input)?;

    Ok((
        input,
        Wind {
            direction,
            speed_mps: f64::from(speed) * to_mps,
            gust_mps: gust.map(|g| f64::from(g) * to_mps),
        },
    ))
}

/// Visibility group: four-digit meters (9999 = unlimited) or a statute
/// mile distance like `10SM` or `1/2SM`.
fn visibility_token(input: &str) -> IResult<&str, Visibility> {
    let meters = map(fixed_digits(4), f64::from);
    let whole_sm = map_res(
        (
            opt(char('M')),
            take_while_m_n(1, 2, |c: char| c.is_ascii_digit()),
            tag("SM"),
        ),
        |(_, miles, _): (_, &str, _)| miles.parse::<f64>().map(|m| m * STATUTE_MILE_M),
    );
    let fraction_sm = map(
        (
            opt(char('M')),
            fixed_digits(1),
            char('/'),
            verify(fixed_digits(1), |d| *d > 0),
            tag("SM"),
        ),
        |(_, num, _, den, _)| f64::from(num) / f64::from(den) * STATUTE_MILE_M,
    );

    // 9999 is the code for "10 km or more", so it normalizes to the
    // unlimited value rather than a literal 9999 m.
    map(alt((fraction_sm, whole_sm, meters)), |m| {
        if m >= UNLIMITED_VISIBILITY_M - 1.0 {
            Visibility::unlimited()
        } else {
            Visibility {
                meters: m,
                unbounded: false,
            }
        }
    })
    .parse(input)
}

/// Cloud layer group: coverage code plus height in hundreds of feet
/// (converted to meters), with an optional convective-type suffix.
fn cloud_token(input: &str) -> IResult<&str, CloudLayer> {
    let (input, coverage) = alt((
        value(CloudCoverage::Few, tag("FEW")),
        value(CloudCoverage::Scattered, tag("SCT")),
        value(CloudCoverage::Broken, tag("BKN")),
        value(CloudCoverage::Overcast, tag("OVC")),
    ))
    .parse(input)?;
    let (input, base_m) = alt((
        map(fixed_digits(3), |h| Some(f64::from(h) * 100.0 * FOOT_M)),
        value(None, tag("///")),
    ))
    .parse(input)?;
    let (input, _) = opt(alt((tag("TCU"), tag("CB")))).parse(input)?;

    Ok((input, CloudLayer { coverage, base_m }))
}

/// A signed two-digit temperature, with leading `M` meaning negative.
fn signed_temp(input: &str) -> IResult<&str, f64> {
    map((opt(char('M')), fixed_digits(2)), |(minus, v)| {
        let v = f64::from(v);
        if minus.is_some() { -v } else { v }
    })
    .parse(input)
}

/// Temperature/dew point group: `TT/DD`, either side possibly missing
/// (`//` or simply absent after the slash).
fn temp_dew_token(input: &str) -> IResult<&str, (Option<f64>, Option<f64>)> {
    let missing = value(None::<f64>, tag("//"));
    let (input, temp) = alt((map(signed_temp, Some), missing)).parse(input)?;
    let (input, _) = char('/').parse(input)?;
    let (input, dew) = opt(alt((map(signed_temp, Some), value(None, tag("//"))))).parse(input)?;
    Ok((input, (temp, dew.flatten())))
}

/// Altimeter group: `Qdddd` in whole hPa or `Adddd` in hundredths of
/// inHg, normalized to hPa.
fn pressure_token(input: &str) -> IResult<&str, f64> {
    alt((
        map(preceded(char('Q'), fixed_digits(4)), f64::from),
        map(preceded(char('A'), fixed_digits(4)), |v| {
            f64::from(v) / 100.0 * INHG_HPA
        }),
    ))
    .parse(input)
}

fn descriptor_code(input: &str) -> IResult<&str, Descriptor> {
    alt((
        value(Descriptor::Shallow, tag("MI")),
        value(Descriptor::Patches, tag("BC")),
        value(Descriptor::Partial, tag("PR")),
        value(Descriptor::LowDrifting, tag("DR")),
        value(Descriptor::Blowing, tag("BL")),
        value(Descriptor::Showers, tag("SH")),
        value(Descriptor::Thunderstorm, tag("TS")),
        value(Descriptor::Freezing, tag("FZ")),
    ))
    .parse(input)
}

fn phenomenon_code(input: &str) -> IResult<&str, Phenomenon> {
    alt((
        alt((
            value(Phenomenon::Drizzle, tag("DZ")),
            value(Phenomenon::Rain, tag("RA")),
            value(Phenomenon::Snow, tag("SN")),
            value(Phenomenon::SnowGrains, tag("SG")),
            value(Phenomenon::IceCrystals, tag("IC")),
            value(Phenomenon::IcePellets, tag("PL")),
            value(Phenomenon::Hail, tag("GR")),
            value(Phenomenon::SmallHail, tag("GS")),
            value(Phenomenon::UnknownPrecipitation, tag("UP")),
        )),
        alt((
            value(Phenomenon::Mist, tag("BR")),
            value(Phenomenon::Fog, tag("FG")),
            value(Phenomenon::Smoke, tag("FU")),
            value(Phenomenon::VolcanicAsh, tag("VA")),
            value(Phenomenon::Dust, tag("DU")),
            value(Phenomenon::Sand, tag("SA")),
            value(Phenomenon::Haze, tag("HZ")),
            value(Phenomenon::DustWhirls, tag("PO")),
            value(Phenomenon::Squalls, tag("SQ")),
            value(Phenomenon::FunnelCloud, tag("FC")),
            value(Phenomenon::Sandstorm, tag("SS")),
            value(Phenomenon::Duststorm, tag("DS")),
        )),
    ))
    .parse(input)
}

/// Present weather group: intensity qualifier, optional descriptor, and
/// zero or more phenomenon codes. A bare qualifier matches nothing.
fn weather_token(input: &str) -> IResult<&str, WeatherCondition> {
    let (rest, intensity) = map(
        opt(alt((
            value(Intensity::Light, char('-')),
            value(Intensity::Heavy, char('+')),
            value(Intensity::Vicinity, tag("VC")),
        ))),
        |i| i.unwrap_or(Intensity::Moderate),
    )
    .parse(input)?;
    let (rest, descriptor) = opt(descriptor_code).parse(rest)?;
    let (rest, phenomena) = many0(phenomenon_code).parse(rest)?;

    if descriptor.is_none() && phenomena.is_empty() {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Verify,
        )));
    }
    Ok((
        rest,
        WeatherCondition {
            intensity,
            descriptor,
            phenomena,
        },
    ))
}

/// `dddVddd` variable-wind sector, recorded nowhere but recognized so
/// it is not mistaken for another group.
fn is_variable_wind_sector(token: &str) -> bool {
    token.len() == 7
        && token.as_bytes()[3] == b'V'
        && token[0..3].bytes().all(|b| b.is_ascii_digit())
        && token[4..7].bytes().all(|b| b.is_ascii_digit())
}

/// Runway visual range groups (`R04L/1200`, `R22/P2000N`, ...).
fn is_runway_visual_range(token: &str) -> bool {
    let bytes = token.as_bytes();
    bytes.len() >= 6
        && bytes[0] == b'R'
        && bytes[1].is_ascii_digit()
        && bytes[2].is_ascii_digit()
        && token.contains('/')
}
