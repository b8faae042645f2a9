//! Per-station observation history with retention-based eviction.
//!
//! The store is keyed by station and holds a strictly time-ordered
//! buffer per key. Re-ingesting a report that is already stored (same
//! station, same observation time) replaces the existing entry, so a
//! cycle that fetches the same report twice stays idempotent. Entries
//! older than the retention horizon are evicted on every append.

use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use tracing::debug;

use crate::observation::{Observation, StationCode};

/// Default retention horizon in hours.
pub const DEFAULT_RETENTION_HOURS: u32 = 24;

/// Outcome of an append, mostly useful for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// A new entry was inserted.
    Inserted,
    /// An entry with the same timestamp was replaced.
    Replaced,
}

/// Time-ordered buffer for one station.
#[derive(Debug, Default)]
struct StationHistory {
    observations: VecDeque<Observation>,
}

impl StationHistory {
    /// Insert keeping timestamps strictly increasing; an equal
    /// timestamp replaces the stored entry.
    fn insert(&mut self, observation: Observation) -> AppendOutcome {
        // Reports almost always arrive in order, so scan from the back.
        let mut idx = self.observations.len();
        while idx > 0 {
            let existing = &self.observations[idx - 1];
            if existing.timestamp == observation.timestamp {
                self.observations[idx - 1] = observation;
                return AppendOutcome::Replaced;
            }
            if existing.timestamp < observation.timestamp {
                break;
            }
            idx -= 1;
        }
        self.observations.insert(idx, observation);
        AppendOutcome::Inserted
    }

    /// Drop entries observed before `cutoff`. Returns the count removed.
    fn evict_before(&mut self, cutoff: DateTime<Utc>) -> usize {
        let mut removed = 0;
        while let Some(front) = self.observations.front() {
            if front.timestamp >= cutoff {
                break;
            }
            self.observations.pop_front();
            removed += 1;
        }
        removed
    }
}

/// Keyed, retention-bounded store of past observations.
///
/// Operations on a station that was never seen are not errors: they
/// return empty windows and zero-removal counts.
#[derive(Debug)]
pub struct HistoryStore {
    retention: Duration,
    stations: HashMap<StationCode, StationHistory>,
}

impl HistoryStore {
    /// Create a store with the given retention horizon in hours.
    pub fn new(retention_hours: u32) -> Self {
        HistoryStore {
            retention: Duration::hours(i64::from(retention_hours)),
            stations: HashMap::new(),
        }
    }

    /// The configured retention horizon.
    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Append an observation to its station's buffer, then evict
    /// everything older than the retention horizon measured from the
    /// newest stored entry.
    pub fn append(&mut self, observation: Observation) -> AppendOutcome {
        let station = observation.station.clone();
        let history = self.stations.entry(station.clone()).or_default();
        let outcome = history.insert(observation);

        if let Some(newest) = history.observations.back().map(|o| o.timestamp) {
            let evicted = history.evict_before(newest - self.retention);
            if evicted > 0 {
                debug!(%station, evicted, "evicted observations past retention horizon");
            }
        }
        outcome
    }

    /// Observations for `station` within `horizon` of `now`, oldest
    /// first. Unknown stations yield an empty window.
    pub fn window(
        &self,
        station: &StationCode,
        horizon: Duration,
        now: DateTime<Utc>,
    ) -> Vec<Observation> {
        let cutoff = now - horizon;
        self.stations
            .get(station)
            .map(|h| {
                h.observations
                    .iter()
                    .filter(|o| o.timestamp >= cutoff)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The most recent stored observation for `station`.
    pub fn latest(&self, station: &StationCode) -> Option<&Observation> {
        self.stations.get(station)?.observations.back()
    }

    /// Number of stored observations for `station`.
    pub fn len(&self, station: &StationCode) -> usize {
        self.stations.get(station).map_or(0, |h| h.observations.len())
    }

    /// Whether `station` has no stored observations.
    pub fn is_empty(&self, station: &StationCode) -> bool {
        self.len(station) == 0
    }

    /// Remove history for `station`, keeping the most recent
    /// `keep_hours` hours measured from `now`. `keep_hours == 0` drops
    /// everything. Returns the number of entries removed.
    pub fn clear(&mut self, station: &StationCode, keep_hours: u32, now: DateTime<Utc>) -> usize {
        let Some(history) = self.stations.get_mut(station) else {
            return 0;
        };
        let removed = if keep_hours == 0 {
            let removed = history.observations.len();
            history.observations.clear();
            removed
        } else {
            history.evict_before(now - Duration::hours(i64::from(keep_hours)))
        };
        if history.observations.is_empty() {
            self.stations.remove(station);
        }
        removed
    }
}

impl Default for HistoryStore {
    fn default() -> Self {
        HistoryStore::new(DEFAULT_RETENTION_HOURS)
    }
}
