//! Per-station update sessions.
//!
//! Each watched station gets its own tokio task that owns that
//! station's history. The task runs the fetch, decode, store, analyze
//! cycle on a schedule and publishes the result through a watch
//! channel. Commands arrive over an mpsc channel, so updates for one
//! station are serialized by construction while stations stay fully
//! independent of each other.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::history::{DEFAULT_RETENTION_HOURS, HistoryStore};
use crate::observation::{Observation, StationCode};
use crate::parser::{self, ParseError};
use crate::provider::{FetchError, ReportProvider};
use crate::trend::{self, TrendConfig, TrendReport};

/// Escalating delays applied after consecutive failed cycles. The last
/// entry repeats until a cycle succeeds.
pub const DEFAULT_RETRY_INTERVALS: [Duration; 4] = [
    Duration::from_secs(3 * 60),
    Duration::from_secs(6 * 60),
    Duration::from_secs(12 * 60),
    Duration::from_secs(60 * 60),
];

/// Default scheduled update interval.
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Configuration for one station session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub station: StationCode,
    /// Delay between successful scheduled updates.
    pub update_interval: Duration,
    /// History retention horizon in hours.
    pub retention_hours: u32,
    pub trend: TrendConfig,
    /// Backoff schedule for failed cycles.
    pub retry_intervals: Vec<Duration>,
    /// Spread scheduled updates so many sessions do not fetch at once.
    pub jitter: bool,
}

impl SessionConfig {
    pub fn new(station: StationCode) -> Self {
        SessionConfig {
            station,
            update_interval: DEFAULT_UPDATE_INTERVAL,
            retention_hours: DEFAULT_RETENTION_HOURS,
            trend: TrendConfig::default(),
            retry_intervals: DEFAULT_RETRY_INTERVALS.to_vec(),
            jitter: true,
        }
    }

    pub fn with_update_interval(mut self, interval: Duration) -> Self {
        self.update_interval = interval;
        self
    }

    pub fn with_retention_hours(mut self, hours: u32) -> Self {
        self.retention_hours = hours;
        self
    }

    pub fn with_trend(mut self, trend: TrendConfig) -> Self {
        self.trend = trend;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }
}

/// Failure of one update cycle.
#[derive(thiserror::Error, Debug)]
pub enum UpdateError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Latest published state of a session.
///
/// On a failed cycle the previous observation and trends are retained,
/// so consumers keep showing the last good data while `last_error`
/// explains what went wrong.
#[derive(Debug, Clone, Serialize)]
pub struct StationSnapshot {
    pub station: StationCode,
    pub observation: Option<Observation>,
    pub trends: TrendReport,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    pub updated_at: Option<DateTime<Utc>>,
}

impl StationSnapshot {
    fn initial(station: StationCode) -> Self {
        StationSnapshot {
            station,
            observation: None,
            trends: TrendReport::default(),
            last_success: None,
            last_error: None,
            consecutive_failures: 0,
            updated_at: None,
        }
    }

    /// Whether the held observation is older than `max_age`, measured
    /// from `now`. Snapshots without an observation are always stale.
    pub fn is_stale(&self, max_age: chrono::Duration, now: DateTime<Utc>) -> bool {
        match &self.observation {
            Some(obs) => now - obs.timestamp > max_age,
            None => true,
        }
    }
}

/// Error from a handle operation after the session ended.
#[derive(thiserror::Error, Debug)]
#[error("station session has shut down")]
pub struct SessionClosed;

enum SessionCommand {
    ForceUpdate {
        reply: oneshot::Sender<StationSnapshot>,
    },
    ClearHistory {
        keep_hours: u32,
        reply: oneshot::Sender<usize>,
    },
    Shutdown,
}

/// Handle to a running station session.
pub struct SessionHandle {
    station: StationCode,
    commands: mpsc::Sender<SessionCommand>,
    snapshot_rx: watch::Receiver<StationSnapshot>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    pub fn station(&self) -> &StationCode {
        &self.station
    }

    /// The most recently published snapshot.
    pub fn snapshot(&self) -> StationSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// A receiver that observes every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<StationSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Run an update cycle now and wait for its result. Concurrent
    /// force requests are coalesced into a single cycle.
    pub async fn force_update(&self) -> Result<StationSnapshot, SessionClosed> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(SessionCommand::ForceUpdate { reply })
            .await
            .map_err(|_| SessionClosed)?;
        response.await.map_err(|_| SessionClosed)
    }

    /// Drop stored history, keeping the most recent `keep_hours` hours.
    /// Returns the number of observations removed.
    pub async fn clear_history(&self, keep_hours: u32) -> Result<usize, SessionClosed> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(SessionCommand::ClearHistory { keep_hours, reply })
            .await
            .map_err(|_| SessionClosed)?;
        response.await.map_err(|_| SessionClosed)
    }

    /// Stop the session and wait for its task to finish.
    pub async fn shutdown(self) {
        let _ = self.commands.send(SessionCommand::Shutdown).await;
        let _ = self.task.await;
    }
}

/// A station session and the task driving it.
pub struct StationSession;

impl StationSession {
    /// Spawn the update task for `config.station`.
    pub fn spawn(config: SessionConfig, provider: Arc<dyn ReportProvider>) -> SessionHandle {
        let station = config.station.clone();
        let (command_tx, command_rx) = mpsc::channel(16);
        let (snapshot_tx, snapshot_rx) = watch::channel(StationSnapshot::initial(station.clone()));

        let task = tokio::spawn(run_session(config, provider, command_rx, snapshot_tx));

        SessionHandle {
            station,
            commands: command_tx,
            snapshot_rx,
            task,
        }
    }
}

/// Fetch and decode one report without committing anything, useful for
/// checking a station before watching it.
pub async fn validate_station(
    provider: &dyn ReportProvider,
    station: &StationCode,
) -> Result<Observation, UpdateError> {
    let raw = provider.fetch_raw_report(station).await?;
    Ok(parser::decode(&raw)?)
}

struct SessionState {
    config: SessionConfig,
    provider: Arc<dyn ReportProvider>,
    history: HistoryStore,
    snapshot: StationSnapshot,
    snapshot_tx: watch::Sender<StationSnapshot>,
}

impl SessionState {
    /// Run one fetch, decode, store, analyze cycle and publish the
    /// resulting snapshot.
    async fn update_cycle(&mut self) -> StationSnapshot {
        let station = self.config.station.clone();
        let now = Utc::now();

        match self.observe(&station).await {
            Ok(observation) => {
                let prior: Vec<Observation> = self
                    .history
                    .window(&station, self.history.retention(), now)
                    .into_iter()
                    .filter(|o| o.timestamp != observation.timestamp)
                    .collect();
                self.history.append(observation.clone());

                let trends = trend::analyze(&observation, &prior, &self.config.trend);
                debug!(%station, timestamp = %observation.timestamp, "update cycle succeeded");

                self.snapshot.observation = Some(observation);
                self.snapshot.trends = trends;
                self.snapshot.last_success = Some(now);
                self.snapshot.last_error = None;
                self.snapshot.consecutive_failures = 0;
            }
            Err(err) => {
                self.snapshot.consecutive_failures += 1;
                warn!(
                    %station,
                    failures = self.snapshot.consecutive_failures,
                    error = %err,
                    "update cycle failed, keeping previous observation"
                );
                self.snapshot.last_error = Some(err.to_string());
            }
        }
        self.snapshot.updated_at = Some(now);

        let snapshot = self.snapshot.clone();
        let _ = self.snapshot_tx.send(snapshot.clone());
        snapshot
    }

    async fn observe(&self, station: &StationCode) -> Result<Observation, UpdateError> {
        let raw = self.provider.fetch_raw_report(station).await?;
        Ok(parser::decode(&raw)?)
    }

    /// Delay until the next scheduled cycle, backing off after
    /// failures. An empty backoff schedule falls back to the regular
    /// interval.
    fn next_delay(&self) -> Duration {
        let failures = self.snapshot.consecutive_failures;
        if failures > 0 {
            let schedule = &self.config.retry_intervals;
            let idx = (failures as usize - 1).min(schedule.len().saturating_sub(1));
            schedule
                .get(idx)
                .copied()
                .unwrap_or(self.config.update_interval)
        } else if self.config.jitter {
            self.config.update_interval + station_jitter(&self.config.station)
        } else {
            self.config.update_interval
        }
    }
}

/// Per-station offset of 10 to 15 minutes, stable across restarts, so
/// a fleet of sessions with the same interval does not hit the upstream
/// API in lockstep.
fn station_jitter(station: &StationCode) -> Duration {
    let mut hasher = DefaultHasher::new();
    station.hash(&mut hasher);
    Duration::from_secs(600 + hasher.finish() % 300)
}

/// Run one update cycle while keeping the command channel live.
///
/// Force requests that arrive while the cycle is in flight are answered
/// by this cycle's result instead of triggering another fetch; clears
/// are deferred until the cycle lands; a shutdown (or all handles
/// dropping) abandons the in-flight fetch with nothing stored or
/// published. Returns `false` when the session should stop.
async fn run_cycle(
    state: &mut SessionState,
    commands: &mut mpsc::Receiver<SessionCommand>,
    mut replies: Vec<oneshot::Sender<StationSnapshot>>,
) -> bool {
    let mut deferred_clears = Vec::new();
    let snapshot = {
        let cycle = state.update_cycle();
        tokio::pin!(cycle);
        loop {
            tokio::select! {
                snapshot = &mut cycle => break snapshot,
                command = commands.recv() => match command {
                    Some(SessionCommand::ForceUpdate { reply }) => replies.push(reply),
                    Some(SessionCommand::ClearHistory { keep_hours, reply }) => {
                        deferred_clears.push((keep_hours, reply));
                    }
                    // Dropping the pinned cycle abandons the fetch.
                    Some(SessionCommand::Shutdown) | None => return false,
                },
            }
        }
    };

    for reply in replies {
        let _ = reply.send(snapshot.clone());
    }
    let station = state.config.station.clone();
    for (keep_hours, reply) in deferred_clears {
        let removed = state.history.clear(&station, keep_hours, Utc::now());
        let _ = reply.send(removed);
    }
    true
}

async fn run_session(
    config: SessionConfig,
    provider: Arc<dyn ReportProvider>,
    mut commands: mpsc::Receiver<SessionCommand>,
    snapshot_tx: watch::Sender<StationSnapshot>,
) {
    let station = config.station.clone();
    let retention_hours = config.retention_hours;
    let mut state = SessionState {
        config,
        provider,
        history: HistoryStore::new(retention_hours),
        snapshot: StationSnapshot::initial(station.clone()),
        snapshot_tx,
    };

    info!(%station, "station session started");
    let mut running = run_cycle(&mut state, &mut commands, Vec::new()).await;

    while running {
        let delay = state.next_delay();
        debug!(%station, delay_secs = delay.as_secs(), "next update scheduled");

        tokio::select! {
            _ = tokio::time::sleep(delay) => {
                running = run_cycle(&mut state, &mut commands, Vec::new()).await;
            }
            command = commands.recv() => {
                match command {
                    Some(SessionCommand::ForceUpdate { reply }) => {
                        running = run_cycle(&mut state, &mut commands, vec![reply]).await;
                    }
                    Some(SessionCommand::ClearHistory { keep_hours, reply }) => {
                        let removed = state.history.clear(&station, keep_hours, Utc::now());
                        info!(%station, keep_hours, removed, "cleared station history");
                        let _ = reply.send(removed);
                    }
                    // All handles dropped counts as shutdown.
                    Some(SessionCommand::Shutdown) | None => running = false,
                }
            }
        }
    }

    if state.snapshot.consecutive_failures > 0 {
        error!(
            %station,
            failures = state.snapshot.consecutive_failures,
            "station session stopping while unhealthy"
        );
    } else {
        info!(%station, "station session stopped");
    }
}
