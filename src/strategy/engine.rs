//! Alert engine: one loaded profile with its scorer, detector and aggregator.
//!
//! Built once per profile load and shared read-only by every session.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};

use super::aggregator::{ProbabilityAggregator, TeamProbabilities};
use super::alert_gate::AlertGate;
use crate::config::ProfileConfig;
use crate::error::Result;
use crate::features::{
    MomentumScorer, PatternDetector, RulePatternDetector, TeamMomentum, WeightedMomentumScorer,
    WindowedStatsTracker,
};
use crate::types::{FixtureId, Team};

pub struct AlertEngine {
    profile: ProfileConfig,
    scorer: Arc<dyn MomentumScorer>,
    detector: Arc<dyn PatternDetector>,
    aggregator: ProbabilityAggregator,
}

impl std::fmt::Debug for AlertEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertEngine")
            .field("profile", &self.profile.name)
            .finish_non_exhaustive()
    }
}

impl AlertEngine {
    /// Validate the profile and build the default scorer and detector
    pub fn new(profile: ProfileConfig) -> Result<Self> {
        profile.validate()?;
        let scorer = Arc::new(WeightedMomentumScorer::new(profile.momentum));
        let detector = Arc::new(RulePatternDetector::new(&profile.patterns));
        Self::with_components(profile, scorer, detector)
    }

    /// Same as [`AlertEngine::new`] with caller-supplied scorer and detector
    pub fn with_components(
        profile: ProfileConfig,
        scorer: Arc<dyn MomentumScorer>,
        detector: Arc<dyn PatternDetector>,
    ) -> Result<Self> {
        profile.validate()?;
        info!(
            profile = %profile.name,
            start_minute = profile.timing.start_minute,
            end_minute = profile.timing.end_minute,
            patterns = profile.patterns.len(),
            "Alert profile loaded"
        );
        Ok(Self {
            aggregator: ProbabilityAggregator::new(profile.aggregator),
            profile,
            scorer,
            detector,
        })
    }

    pub fn profile(&self) -> &ProfileConfig {
        &self.profile
    }

    pub fn new_gate(&self, fixture_id: FixtureId) -> AlertGate {
        AlertGate::new(fixture_id, &self.profile)
    }

    pub fn new_tracker(&self, fixture_id: FixtureId) -> WindowedStatsTracker {
        WindowedStatsTracker::new(fixture_id, self.profile.windows.history_mins)
    }

    /// Score, detect and aggregate both teams as of `now`
    pub fn probabilities(&self, tracker: &WindowedStatsTracker, now: DateTime<Utc>) -> TeamProbabilities {
        let window = self.profile.windows.momentum_window_mins;
        let momentum = match tracker.window_delta(window, now) {
            Ok(delta) => self.scorer.score(&delta, window),
            Err(insufficient) => {
                debug!(fixture_id = tracker.fixture_id(), %insufficient, "Momentum unavailable, scoring zero");
                TeamMomentum::default()
            }
        };

        let result = |team: Team| {
            self.aggregator.aggregate(
                team,
                momentum.get(team),
                self.detector.detect(tracker, team, now),
            )
        };

        TeamProbabilities {
            home: result(Team::Home),
            away: result(Team::Away),
        }
    }
}
