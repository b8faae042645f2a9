//! metar-watch CLI - Watch METAR stations and report conditions and trends.

use anyhow::Result;
use clap::Parser;
use metar_watch::{
    config::Config,
    observation::{Observation, StationCode},
    provider::{AwcProvider, ReportProvider},
    session::{self, SessionConfig, SessionHandle, StationSession, StationSnapshot},
    units::{UnitPreferences, visibility_category},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// metar-watch - Watch METAR stations and report conditions and trends
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Stations to watch, as ICAO identifiers (e.g. KJFK EGLL)
    stations: Vec<String>,

    /// Update interval in seconds
    #[arg(short, long)]
    interval: Option<u64>,

    /// History retention in hours (typical values: 6, 12, 24, 48)
    #[arg(short, long)]
    retention_hours: Option<u32>,

    /// Base URL of the report API
    #[arg(long, env = "METAR_PROVIDER_URL")]
    provider_url: Option<String>,

    /// Use imperial display units
    #[arg(long)]
    imperial: bool,

    /// Disable the per-station scheduling offset
    #[arg(long)]
    no_jitter: bool,

    /// Fetch and print one report per station, then exit
    #[arg(long)]
    once: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let mut config = Config::load()?;
    if let Some(interval) = args.interval {
        config.update_interval = interval;
    }
    if let Some(hours) = args.retention_hours {
        config.retention_hours = hours;
    }
    if let Some(url) = &args.provider_url {
        config.provider_url = url.clone();
    }
    if !args.stations.is_empty() {
        config.stations = args.stations.clone();
    }
    if args.no_jitter {
        config.jitter = false;
    }
    if args.imperial {
        config.units = UnitPreferences::imperial();
    }
    config.validate()?;

    let stations = config.station_codes()?;
    if stations.is_empty() {
        anyhow::bail!("no stations given; pass ICAO identifiers or set them in the config file");
    }

    let provider = Arc::new(AwcProvider::with_base_url(&config.provider_url));

    if args.once {
        return fetch_once(provider.as_ref(), &stations, &config.units).await;
    }

    info!("metar-watch starting...");
    info!(
        "Watching {} station(s), interval {}s, retention {}h",
        stations.len(),
        config.update_interval,
        config.retention_hours
    );

    // Create shutdown signal
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    // Handle Ctrl+C
    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        info!("Shutdown signal received");
        let _ = shutdown_tx_clone.send(true);
    });

    // Spawn one session per station
    let mut handles: Vec<SessionHandle> = Vec::with_capacity(stations.len());
    for station in stations {
        let session_config = SessionConfig::new(station)
            .with_update_interval(Duration::from_secs(config.update_interval))
            .with_retention_hours(config.retention_hours)
            .with_trend(config.trend.clone())
            .with_jitter(config.jitter);
        handles.push(StationSession::spawn(session_config, provider.clone()));
    }

    // Print every published snapshot
    let units = config.units;
    for handle in &handles {
        let mut rx = handle.subscribe();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let snapshot = rx.borrow().clone();
                println!("{}", render_snapshot(&snapshot, &units));
            }
        });
    }

    shutdown_rx.changed().await?;

    for handle in handles {
        handle.shutdown().await;
    }
    info!("metar-watch stopped");

    Ok(())
}

/// Fetch and print one report per station without starting sessions.
async fn fetch_once(
    provider: &dyn ReportProvider,
    stations: &[StationCode],
    units: &UnitPreferences,
) -> Result<()> {
    let mut failed = false;
    for station in stations {
        match session::validate_station(provider, station).await {
            Ok(obs) => println!("{}", render_observation(&obs, units)),
            Err(e) => {
                failed = true;
                warn!("{}: {}", station, e);
            }
        }
    }
    if failed {
        anyhow::bail!("one or more stations failed");
    }
    Ok(())
}

/// Render a snapshot as a human-readable block.
fn render_snapshot(snapshot: &StationSnapshot, units: &UnitPreferences) -> String {
    let mut out = String::new();

    match &snapshot.observation {
        Some(obs) => {
            out.push_str(&render_observation(obs, units));

            let mut trends = Vec::new();
            if let Some(t) = &snapshot.trends.temperature {
                trends.push(format!("temperature {}", t.trend));
            }
            if let Some(t) = &snapshot.trends.pressure {
                trends.push(format!("pressure {}", t.trend));
            }
            if let Some(t) = &snapshot.trends.humidity {
                trends.push(format!("humidity {}", t.trend));
            }
            if let Some(w) = &snapshot.trends.wind_direction {
                trends.push(format!("wind {}", w.trend));
            }
            if !trends.is_empty() {
                out.push_str(&format!("\n  trends: {}", trends.join(", ")));
            }
        }
        None => out.push_str(&format!("{}: no observation yet", snapshot.station)),
    }

    if let Some(error) = &snapshot.last_error {
        out.push_str(&format!(
            "\n  last update failed ({} in a row): {}",
            snapshot.consecutive_failures, error
        ));
    }

    out
}

/// Render an observation with the configured display units.
fn render_observation(obs: &Observation, units: &UnitPreferences) -> String {
    let mut parts = Vec::new();

    if let Some(temp) = obs.temperature {
        let mut s = format!(
            "{:.1}{}",
            units.temperature.from_si(temp),
            units.temperature.symbol()
        );
        if let Some(rh) = obs.relative_humidity() {
            s.push_str(&format!(" ({rh:.0}% RH)"));
        }
        parts.push(s);
    }

    if let Some(wind) = &obs.wind {
        let speed = units.wind_speed.from_si(wind.speed_mps);
        let mut s = match wind.direction.degrees() {
            Some(deg) => format!(
                "wind {:03.0}° {:.0} {}",
                deg,
                speed,
                units.wind_speed.symbol()
            ),
            None => format!("wind variable {:.0} {}", speed, units.wind_speed.symbol()),
        };
        if let Some(gust) = wind.gust_mps {
            s.push_str(&format!(
                " gusting {:.0}",
                units.wind_speed.from_si(gust)
            ));
        }
        if let Some(chill) = obs.wind_chill() {
            s.push_str(&format!(
                ", feels like {:.1}{}",
                units.temperature.from_si(chill),
                units.temperature.symbol()
            ));
        }
        parts.push(s);
    }

    if let Some(vis) = &obs.visibility {
        let value = units.visibility.from_si(vis.meters);
        let prefix = if vis.unbounded { ">=" } else { "" };
        parts.push(format!(
            "visibility {}{:.1} {} ({:?})",
            prefix,
            value,
            units.visibility.symbol(),
            visibility_category(vis)
        ));
    }

    if let Some(pressure) = obs.pressure_hpa {
        parts.push(format!(
            "{:.1} {}",
            units.pressure.from_si(pressure),
            units.pressure.symbol()
        ));
    }

    for layer in &obs.cloud_layers {
        match layer.base_m {
            Some(base) => parts.push(format!(
                "{} at {:.0} {}",
                layer.coverage.code(),
                units.cloud_base.from_si(base),
                units.cloud_base.symbol()
            )),
            None => parts.push(layer.coverage.code().to_string()),
        }
    }

    if obs.cavok {
        parts.push("CAVOK".to_string());
    }

    format!(
        "{} {}: {}",
        obs.station,
        obs.timestamp.format("%d %H:%MZ"),
        parts.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use metar_watch::observation::RawReport;
    use metar_watch::parser;

    fn decode(text: &str) -> Observation {
        parser::decode(&RawReport {
            station: "KJFK".parse().unwrap(),
            fetched_at: Utc::now(),
            text: text.to_string(),
        })
        .unwrap()
    }

    #[test]
    fn test_render_metric() {
        let obs = decode("KJFK 261651Z 18015G25KT 10SM FEW035 22/18 A3000");
        let rendered = render_observation(&obs, &UnitPreferences::metric());
        assert!(rendered.contains("22.0°C"));
        assert!(rendered.contains("wind 180°"));
        assert!(rendered.contains(">="));
        assert!(rendered.contains("hPa"));
    }

    #[test]
    fn test_render_imperial() {
        let obs = decode("KJFK 261651Z 18015KT 9999 22/18 Q1016");
        let rendered = render_observation(&obs, &UnitPreferences::imperial());
        assert!(rendered.contains("71.6°F"));
        assert!(rendered.contains("kt"));
        assert!(rendered.contains("inHg"));
    }

    #[test]
    fn test_render_snapshot_without_observation() {
        let snapshot = StationSnapshot {
            station: "KJFK".parse().unwrap(),
            observation: None,
            trends: Default::default(),
            last_success: None,
            last_error: Some("unexpected HTTP status 503".to_string()),
            consecutive_failures: 2,
            updated_at: Some(Utc::now()),
        };
        let rendered = render_snapshot(&snapshot, &UnitPreferences::metric());
        assert!(rendered.contains("no observation yet"));
        assert!(rendered.contains("2 in a row"));
    }
}
