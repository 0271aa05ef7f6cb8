//! Probability Aggregator
//!
//! Folds momentum and matched patterns into one corner probability per team:
//! `min(cap, overall * momentum_weight) + min(cap, sum(weights) * pattern_scale)`,
//! bounded to [0, 100]. Both teams combine into a match-level figure.

use serde::Serialize;

use crate::config::AggregatorConfig;
use crate::features::{MatchedPattern, MomentumIndicators};
use crate::types::Team;

/// Corner probability for one team with its breakdown
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbabilityResult {
    pub team: Team,
    pub total_probability: f64,
    pub momentum_contribution: f64,
    pub pattern_contribution: f64,
    pub matched_patterns: Vec<MatchedPattern>,
    pub momentum_indicators: MomentumIndicators,
}

impl ProbabilityResult {
    /// Heaviest matched pattern, if any
    pub fn strongest_pattern(&self) -> Option<&MatchedPattern> {
        self.matched_patterns
            .iter()
            .max_by(|a, b| a.weight.total_cmp(&b.weight))
    }

    pub fn pattern_names(&self) -> Vec<&str> {
        self.matched_patterns.iter().map(|p| p.name.as_str()).collect()
    }
}

/// Results for both sides of a fixture
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamProbabilities {
    pub home: ProbabilityResult,
    pub away: ProbabilityResult,
}

impl TeamProbabilities {
    pub fn get(&self, team: Team) -> &ProbabilityResult {
        match team {
            Team::Home => &self.home,
            Team::Away => &self.away,
        }
    }

    pub fn into_parts(self) -> (ProbabilityResult, ProbabilityResult) {
        (self.home, self.away)
    }
}

/// Chance that at least one side wins a corner
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MatchProbability {
    pub combined: f64,
    pub best_team: Team,
    pub best_probability: f64,
}

impl MatchProbability {
    /// Sides treated as independent: `100 * (1 - (1 - h) * (1 - a))`.
    /// Ties go to the home side.
    pub fn combine(home: &ProbabilityResult, away: &ProbabilityResult) -> Self {
        let h = (home.total_probability / 100.0).clamp(0.0, 1.0);
        let a = (away.total_probability / 100.0).clamp(0.0, 1.0);
        let (best_team, best_probability) = if away.total_probability > home.total_probability {
            (Team::Away, away.total_probability)
        } else {
            (Team::Home, home.total_probability)
        };
        Self {
            combined: 100.0 * (1.0 - (1.0 - h) * (1.0 - a)),
            best_team,
            best_probability,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProbabilityAggregator {
    config: AggregatorConfig,
}

impl ProbabilityAggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        Self { config }
    }

    pub fn aggregate(
        &self,
        team: Team,
        momentum: MomentumIndicators,
        patterns: Vec<MatchedPattern>,
    ) -> ProbabilityResult {
        let c = &self.config;
        let momentum_contribution = (momentum.overall * c.momentum_weight).clamp(0.0, c.momentum_cap);
        let weight_sum: f64 = patterns.iter().map(|p| p.weight).sum();
        let pattern_contribution = (weight_sum * c.pattern_scale).clamp(0.0, c.pattern_cap);
        let total_probability = (momentum_contribution + pattern_contribution).clamp(0.0, 100.0);

        ProbabilityResult {
            team,
            total_probability,
            momentum_contribution,
            pattern_contribution,
            matched_patterns: patterns,
            momentum_indicators: momentum,
        }
    }
}
