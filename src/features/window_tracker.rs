//! Windowed Stats Tracker
//!
//! Keeps a bounded, time-ordered history of snapshots for one fixture and
//! answers "how much did each statistic change over the last N minutes":
//! - Cumulative counters: latest minus earliest in-window value, clamped at 0
//! - Percentages (possession, territory): mean across in-window snapshots
//! - Counter decreases are recorded once, on arrival, as data-quality
//!   warnings, never errors

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use thiserror::Error;
use tracing::{debug, warn};

use crate::types::{FixtureId, Snapshot, Stat, StatKind, StatLine, Team, TeamPair};

/// Fewer than two snapshots fall inside the requested window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("insufficient data for {window_mins}m window ({samples} snapshot(s))")]
pub struct InsufficientData {
    pub window_mins: u32,
    pub samples: usize,
}

/// A cumulative counter went down between two consecutive snapshots (feed
/// correction or half-time reset). Window deltas spanning it clamp to zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataQualityWarning {
    pub fixture_id: FixtureId,
    pub stat: Stat,
    pub team: Team,
    /// Match minute of the snapshot that went backwards
    pub minute: u32,
    pub earliest: f64,
    pub latest: f64,
}

/// Per-team change of every statistic over one window
#[derive(Debug, Clone, PartialEq)]
pub struct WindowedDelta {
    pub window_mins: u32,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    /// Snapshots inside the window
    pub samples: usize,
    values: StatLine,
}

impl WindowedDelta {
    pub fn value(&self, stat: Stat, team: Team) -> f64 {
        self.values.value(stat, team)
    }

    pub fn get(&self, stat: Stat) -> TeamPair {
        self.values.get(stat)
    }

    pub fn values(&self) -> &StatLine {
        &self.values
    }
}

/// Outcome of offering a snapshot to the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerUpdate {
    Appended,
    /// Same timestamp as the newest snapshot; the newest was replaced
    Replaced,
    /// Older than the newest snapshot; ignored
    OutOfOrder,
    /// Snapshot belongs to another fixture; ignored
    WrongFixture,
}

impl TrackerUpdate {
    pub fn accepted(self) -> bool {
        matches!(self, TrackerUpdate::Appended | TrackerUpdate::Replaced)
    }
}

/// Bounded snapshot history for one fixture
#[derive(Debug, Clone)]
pub struct WindowedStatsTracker {
    fixture_id: FixtureId,
    history_mins: u32,
    history: VecDeque<Snapshot>,
    out_of_order: u64,
    anomalies: Vec<DataQualityWarning>,
}

impl WindowedStatsTracker {
    pub fn new(fixture_id: FixtureId, history_mins: u32) -> Self {
        Self {
            fixture_id,
            history_mins: history_mins.max(1),
            history: VecDeque::new(),
            out_of_order: 0,
            anomalies: Vec::new(),
        }
    }

    pub fn fixture_id(&self) -> FixtureId {
        self.fixture_id
    }

    pub fn history_mins(&self) -> u32 {
        self.history_mins
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn latest(&self) -> Option<&Snapshot> {
        self.history.back()
    }

    pub fn snapshots(&self) -> impl Iterator<Item = &Snapshot> {
        self.history.iter()
    }

    /// Snapshots dropped for arriving older than the newest one
    pub fn ignored_out_of_order(&self) -> u64 {
        self.out_of_order
    }

    /// Counter decreases seen since the tracker was created, oldest first
    pub fn anomalies(&self) -> &[DataQualityWarning] {
        &self.anomalies
    }

    /// Append a snapshot, keeping timestamps strictly increasing, then prune
    /// everything older than the history horizon.
    pub fn update(&mut self, snapshot: Snapshot) -> TrackerUpdate {
        if snapshot.fixture_id != self.fixture_id {
            warn!(
                fixture_id = self.fixture_id,
                got = snapshot.fixture_id,
                "Snapshot for another fixture ignored"
            );
            return TrackerUpdate::WrongFixture;
        }

        let outcome = match self.history.back() {
            Some(newest) if snapshot.timestamp < newest.timestamp => {
                self.out_of_order += 1;
                debug!(
                    fixture_id = self.fixture_id,
                    timestamp = %snapshot.timestamp,
                    newest = %newest.timestamp,
                    "Out-of-order snapshot ignored"
                );
                return TrackerUpdate::OutOfOrder;
            }
            Some(newest) if snapshot.timestamp == newest.timestamp => {
                self.history.pop_back();
                TrackerUpdate::Replaced
            }
            _ => TrackerUpdate::Appended,
        };

        if let Some(previous) = self.history.back() {
            let decreases = Self::counter_decreases(self.fixture_id, previous, &snapshot);
            self.anomalies.extend(decreases);
        }

        let horizon = snapshot.timestamp - Duration::minutes(i64::from(self.history_mins));
        self.history.push_back(snapshot);
        while let Some(front) = self.history.front() {
            if front.timestamp < horizon {
                self.history.pop_front();
            } else {
                break;
            }
        }

        outcome
    }

    fn counter_decreases(
        fixture_id: FixtureId,
        previous: &Snapshot,
        next: &Snapshot,
    ) -> Vec<DataQualityWarning> {
        let mut found = Vec::new();
        for stat in Stat::ALL {
            if stat.kind() != StatKind::Cumulative {
                continue;
            }
            for team in Team::BOTH {
                let earliest = previous.stats.value(stat, team);
                let latest = next.stats.value(stat, team);
                if latest < earliest {
                    warn!(
                        fixture_id,
                        stat = %stat,
                        team = %team,
                        minute = next.minute,
                        earliest,
                        latest,
                        "Cumulative counter decreased"
                    );
                    found.push(DataQualityWarning {
                        fixture_id,
                        stat,
                        team,
                        minute: next.minute,
                        earliest,
                        latest,
                    });
                }
            }
        }
        found
    }

    /// Change of every statistic over `[now - window_mins, now]`, both ends inclusive
    pub fn window_delta(
        &self,
        window_mins: u32,
        now: DateTime<Utc>,
    ) -> Result<WindowedDelta, InsufficientData> {
        let start = now - Duration::minutes(i64::from(window_mins));
        let in_window: Vec<&Snapshot> = self
            .history
            .iter()
            .filter(|s| s.timestamp >= start && s.timestamp <= now)
            .collect();

        let (earliest, latest) = match (in_window.first(), in_window.last()) {
            (Some(first), Some(last)) if in_window.len() >= 2 => (*first, *last),
            _ => {
                return Err(InsufficientData {
                    window_mins,
                    samples: in_window.len(),
                })
            }
        };

        let mut values = StatLine::default();
        let samples = in_window.len() as f64;

        for stat in Stat::ALL {
            let mut pair = TeamPair::default();
            for team in Team::BOTH {
                let value = match stat.kind() {
                    // decreases were reported when they arrived
                    StatKind::Cumulative => {
                        (latest.stats.value(stat, team) - earliest.stats.value(stat, team)).max(0.0)
                    }
                    StatKind::Percentage => {
                        in_window
                            .iter()
                            .map(|s| s.stats.value(stat, team))
                            .sum::<f64>()
                            / samples
                    }
                };
                pair.set(team, value);
            }
            values.set(stat, pair);
        }

        Ok(WindowedDelta {
            window_mins,
            from: earliest.timestamp,
            to: latest.timestamp,
            samples: in_window.len(),
            values,
        })
    }
}
