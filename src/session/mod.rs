//! Fixture sessions
//!
//! One session per live fixture: its tracker, its gate (with the fired
//! identities) and its lifecycle. Sessions are independent; the scheduler
//! only ever holds one session lock at a time.

pub mod scheduler;

pub use scheduler::{CycleReport, Scheduler};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::LifecycleConfig;
use crate::features::{TrackerUpdate, WindowedStatsTracker};
use crate::strategy::{AlertDecision, AlertEngine, AlertGate, MatchProbability};
use crate::types::{FixtureId, FixtureUpdate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// Feed reported the match over, or the clock passed the final minute
    Finished,
    /// No update within the inactivity timeout
    Inactive,
    /// Session outlived the maximum duration
    MaxDuration,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::Finished => write!(f, "finished"),
            CloseReason::Inactive => write!(f, "inactive"),
            CloseReason::MaxDuration => write!(f, "max_duration"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Active,
    Closed(CloseReason),
}

/// Result of feeding one update into a session
#[derive(Debug, Clone, Default)]
pub struct SessionUpdate {
    /// Decisions for both teams; suppressed ones only if the profile emits them
    pub decisions: Vec<AlertDecision>,
    /// Present when both teams were scored
    pub match_probability: Option<MatchProbability>,
    /// The snapshot was ignored (out of order or foreign)
    pub ignored: bool,
}

impl SessionUpdate {
    pub fn fired(&self) -> impl Iterator<Item = &AlertDecision> {
        self.decisions.iter().filter(|d| d.fired)
    }
}

pub struct FixtureSession {
    fixture_id: FixtureId,
    engine: Arc<AlertEngine>,
    lifecycle: LifecycleConfig,
    tracker: WindowedStatsTracker,
    gate: AlertGate,
    state: SessionState,
    created_at: DateTime<Utc>,
    last_update_at: DateTime<Utc>,
    last_minute: Option<u32>,
    updates: u64,
}

impl FixtureSession {
    pub fn new(
        fixture_id: FixtureId,
        engine: Arc<AlertEngine>,
        lifecycle: LifecycleConfig,
        created_at: DateTime<Utc>,
    ) -> Self {
        info!(fixture_id, profile = %engine.profile().name, "Session opened");
        Self {
            fixture_id,
            tracker: engine.new_tracker(fixture_id),
            gate: engine.new_gate(fixture_id),
            engine,
            lifecycle,
            state: SessionState::Active,
            created_at,
            last_update_at: created_at,
            last_minute: None,
            updates: 0,
        }
    }

    pub fn fixture_id(&self) -> FixtureId {
        self.fixture_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, SessionState::Closed(_))
    }

    pub fn tracker(&self) -> &WindowedStatsTracker {
        &self.tracker
    }

    pub fn gate(&self) -> &AlertGate {
        &self.gate
    }

    pub fn profile_name(&self) -> &str {
        &self.engine.profile().name
    }

    pub fn last_minute(&self) -> Option<u32> {
        self.last_minute
    }

    pub fn updates(&self) -> u64 {
        self.updates
    }

    /// Counter decreases seen since the session opened
    pub fn data_quality_warnings(&self) -> usize {
        self.tracker.anomalies().len()
    }

    /// Feed one update received at `received_at`
    pub fn update(&mut self, update: &FixtureUpdate, received_at: DateTime<Utc>) -> SessionUpdate {
        if self.is_closed() {
            debug!(fixture_id = self.fixture_id, "Update for closed session ignored");
            return SessionUpdate {
                ignored: true,
                ..Default::default()
            };
        }

        let minute = update.snapshot.minute;
        let outcome = self.tracker.update(update.snapshot.clone());
        if !outcome.accepted() {
            return SessionUpdate {
                ignored: true,
                ..Default::default()
            };
        }
        if outcome == TrackerUpdate::Replaced {
            debug!(fixture_id = self.fixture_id, minute, "Snapshot replaced newest");
        }

        self.updates += 1;
        self.last_update_at = received_at;
        self.last_minute = Some(minute);

        let now = update.snapshot.timestamp;
        let engine = Arc::clone(&self.engine);
        let tracker = &self.tracker;
        let decisions = self
            .gate
            .evaluate(minute, &update.market, || engine.probabilities(tracker, now));

        let match_probability = match decisions.as_slice() {
            [a, b] => match (&a.probability_result, &b.probability_result) {
                (Some(home), Some(away)) => Some(MatchProbability::combine(home, away)),
                _ => None,
            },
            _ => None,
        };

        let decisions = if self.engine.profile().emit_suppressed {
            decisions
        } else {
            decisions.into_iter().filter(|d| d.fired).collect()
        };

        if update.finished || minute >= self.lifecycle.final_minute {
            self.close(CloseReason::Finished);
        }

        SessionUpdate {
            decisions,
            match_probability,
            ignored: false,
        }
    }

    /// Lifecycle check, closing the session if it has expired.
    ///
    /// Both limits run on receive time: max duration from `created_at` and
    /// inactivity from the `received_at` of the last accepted update. The
    /// tracker and gate run on snapshot time, so a replay fed faster than
    /// real time never expires on its own.
    pub fn check_expiry(&mut self, now: DateTime<Utc>) -> Option<CloseReason> {
        if let SessionState::Closed(reason) = self.state {
            return Some(reason);
        }
        let reason = if now - self.created_at >= self.lifecycle.max_duration() {
            CloseReason::MaxDuration
        } else if now - self.last_update_at >= self.lifecycle.inactivity_timeout() {
            CloseReason::Inactive
        } else {
            return None;
        };
        self.close(reason);
        Some(reason)
    }

    pub fn close(&mut self, reason: CloseReason) {
        if self.is_closed() {
            return;
        }
        self.state = SessionState::Closed(reason);
        let ignored = self.tracker.ignored_out_of_order();
        let warnings = self.data_quality_warnings();
        if ignored > 0 || warnings > 0 {
            warn!(
                fixture_id = self.fixture_id,
                out_of_order = ignored,
                data_quality_warnings = warnings,
                "Session closed with feed anomalies"
            );
        }
        info!(
            fixture_id = self.fixture_id,
            reason = %reason,
            updates = self.updates,
            alerts = self.gate.fired_identities().count(),
            "Session closed"
        );
    }
}
