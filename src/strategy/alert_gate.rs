//! Alert Gate
//!
//! Sequential gates per team, cheapest first:
//! 1. Timing: match minute inside the profile window
//! 2. Market: a tradable market is quoted
//! 3. Thresholds: probability, momentum and a strong pattern all hold
//! 4. De-duplication: an identity fires at most once per session
//!
//! Probabilities are only computed once gates 1 and 2 pass.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, info};

use super::aggregator::{ProbabilityResult, TeamProbabilities};
use crate::config::{ProfileConfig, ThresholdConfig, TimingWindow};
use crate::types::{FixtureId, MarketAvailability, Team};

/// Confidence band of a probability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    Low,
    Medium,
    High,
    VeryHigh,
    Extreme,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Low => "LOW",
            Tier::Medium => "MEDIUM",
            Tier::High => "HIGH",
            Tier::VeryHigh => "VERY_HIGH",
            Tier::Extreme => "EXTREME",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierBand {
    /// Inclusive lower bound
    pub floor: f64,
    pub tier: Tier,
}

/// Ordered band table, highest floor first. Below every floor is `LOW`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TierTable {
    bands: Vec<TierBand>,
}

impl Default for TierTable {
    fn default() -> Self {
        Self::new(vec![
            TierBand { floor: 90.0, tier: Tier::Extreme },
            TierBand { floor: 75.0, tier: Tier::VeryHigh },
            TierBand { floor: 60.0, tier: Tier::High },
            TierBand { floor: 40.0, tier: Tier::Medium },
        ])
    }
}

impl TierTable {
    pub fn new(bands: Vec<TierBand>) -> Self {
        Self { bands }
    }

    pub fn classify(&self, probability: f64) -> Tier {
        self.bands
            .iter()
            .find(|band| probability >= band.floor)
            .map(|band| band.tier)
            .unwrap_or(Tier::Low)
    }

    /// Floors must be finite and strictly descending
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.bands.is_empty() {
            return Err("tier table is empty".to_string());
        }
        if let Some(band) = self.bands.iter().find(|b| !b.floor.is_finite()) {
            return Err(format!("tier {} has a non-finite floor", band.tier));
        }
        if let Some(pair) = self.bands.windows(2).find(|w| w[0].floor <= w[1].floor) {
            return Err(format!(
                "tier floors must descend: {} ({}) before {} ({})",
                pair[0].tier, pair[0].floor, pair[1].tier, pair[1].floor
            ));
        }
        Ok(())
    }
}

/// Why a decision was suppressed
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SuppressReason {
    Timing { minute: u32 },
    NoMarket,
    LowProbability { probability: f64, floor: f64 },
    WeakMomentum { overall: f64, floor: f64 },
    NoStrongPattern { strongest: Option<f64>, floor: f64 },
    Duplicate,
}

impl SuppressReason {
    pub fn code(&self) -> &'static str {
        match self {
            SuppressReason::Timing { .. } => "timing",
            SuppressReason::NoMarket => "no market",
            SuppressReason::LowProbability { .. } => "low probability",
            SuppressReason::WeakMomentum { .. } => "weak momentum",
            SuppressReason::NoStrongPattern { .. } => "no strong pattern",
            SuppressReason::Duplicate => "duplicate",
        }
    }
}

impl fmt::Display for SuppressReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuppressReason::LowProbability { probability, floor } => {
                write!(f, "low probability: {:.1} < {:.1}", probability, floor)
            }
            SuppressReason::WeakMomentum { overall, floor } => {
                write!(f, "weak momentum: {:.1} < {:.1}", overall, floor)
            }
            SuppressReason::NoStrongPattern {
                strongest: Some(weight),
                floor,
            } => write!(f, "no strong pattern: {:.1} < {:.1}", weight, floor),
            SuppressReason::NoStrongPattern { strongest: None, .. } => {
                write!(f, "no strong pattern: none matched")
            }
            other => write!(f, "{}", other.code()),
        }
    }
}

/// Per-team gate state, for observability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    #[default]
    Idle,
    Evaluating,
    Fired,
    Suppressed,
}

/// De-duplication key of a fired alert
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct AlertIdentity {
    pub fixture_id: FixtureId,
    pub team: Team,
    pub tier: Tier,
    pub minute_bucket: u32,
}

impl fmt::Display for AlertIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.fixture_id, self.team, self.tier, self.minute_bucket
        )
    }
}

/// Outcome of gating one team at one update
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertDecision {
    pub fixture_id: FixtureId,
    pub team: Team,
    pub minute: u32,
    pub fired: bool,
    pub tier: Option<Tier>,
    pub identity: Option<AlertIdentity>,
    /// Human-readable trail: pass reasons when fired, failures when suppressed
    pub reasons: Vec<String>,
    pub suppressed_by: Vec<SuppressReason>,
    pub probability_result: Option<ProbabilityResult>,
    /// Market lines quoted at decision time
    pub market_lines: Vec<f64>,
}

impl AlertDecision {
    fn suppressed(
        fixture_id: FixtureId,
        team: Team,
        minute: u32,
        reasons: Vec<SuppressReason>,
        result: Option<ProbabilityResult>,
        market: &MarketAvailability,
    ) -> Self {
        Self {
            fixture_id,
            team,
            minute,
            fired: false,
            tier: None,
            identity: None,
            reasons: reasons.iter().map(ToString::to_string).collect(),
            suppressed_by: reasons,
            probability_result: result,
            market_lines: market.lines.clone(),
        }
    }

    pub fn total_probability(&self) -> Option<f64> {
        self.probability_result.as_ref().map(|r| r.total_probability)
    }

    pub fn suppressed_for(&self, code: &str) -> bool {
        self.suppressed_by.iter().any(|r| r.code() == code)
    }
}

/// Gate state machine for one fixture. Owns the fired identities.
#[derive(Debug, Clone)]
pub struct AlertGate {
    fixture_id: FixtureId,
    timing: TimingWindow,
    thresholds: ThresholdConfig,
    tiers: TierTable,
    dedup_bucket_mins: u32,
    fired: HashSet<AlertIdentity>,
    states: [GateState; 2],
}

impl AlertGate {
    pub fn new(fixture_id: FixtureId, profile: &ProfileConfig) -> Self {
        Self {
            fixture_id,
            timing: profile.timing,
            thresholds: profile.thresholds,
            tiers: profile.tiers.clone(),
            dedup_bucket_mins: profile.dedup_bucket_mins.max(1),
            fired: HashSet::new(),
            states: [GateState::Idle; 2],
        }
    }

    pub fn state(&self, team: Team) -> GateState {
        self.states[team_slot(team)]
    }

    pub fn fired_identities(&self) -> impl Iterator<Item = &AlertIdentity> {
        self.fired.iter()
    }

    pub fn minute_bucket(&self, minute: u32) -> u32 {
        minute.saturating_sub(self.timing.start_minute) / self.dedup_bucket_mins
    }

    /// Gate both teams. `compute` runs at most once, and only when the
    /// timing and market gates pass.
    pub fn evaluate<F>(&mut self, minute: u32, market: &MarketAvailability, compute: F) -> Vec<AlertDecision>
    where
        F: FnOnce() -> TeamProbabilities,
    {
        self.states = [GateState::Evaluating; 2];

        let early = if !self.timing.contains(minute) {
            Some(SuppressReason::Timing { minute })
        } else if !market.available {
            Some(SuppressReason::NoMarket)
        } else {
            None
        };

        if let Some(reason) = early {
            self.states = [GateState::Suppressed; 2];
            debug!(
                fixture_id = self.fixture_id,
                minute,
                reason = reason.code(),
                "Gate closed before scoring"
            );
            return Team::BOTH
                .iter()
                .map(|&team| {
                    AlertDecision::suppressed(self.fixture_id, team, minute, vec![reason.clone()], None, market)
                })
                .collect();
        }

        let (home, away) = compute().into_parts();
        vec![
            self.evaluate_team(minute, market, home),
            self.evaluate_team(minute, market, away),
        ]
    }

    fn evaluate_team(&mut self, minute: u32, market: &MarketAvailability, result: ProbabilityResult) -> AlertDecision {
        let team = result.team;
        let t = self.thresholds;
        let overall = result.momentum_indicators.overall;
        let strongest = result.strongest_pattern().map(|p| (p.name.clone(), p.weight));

        let mut failures = Vec::new();
        if result.total_probability < t.probability_floor {
            failures.push(SuppressReason::LowProbability {
                probability: result.total_probability,
                floor: t.probability_floor,
            });
        }
        if overall < t.momentum_floor {
            failures.push(SuppressReason::WeakMomentum {
                overall,
                floor: t.momentum_floor,
            });
        }
        let strong = strongest
            .as_ref()
            .filter(|(_, weight)| *weight >= t.strong_pattern_floor);
        if strong.is_none() {
            failures.push(SuppressReason::NoStrongPattern {
                strongest: strongest.as_ref().map(|(_, weight)| *weight),
                floor: t.strong_pattern_floor,
            });
        }

        if !failures.is_empty() {
            self.states[team_slot(team)] = GateState::Suppressed;
            debug!(
                fixture_id = self.fixture_id,
                team = %team,
                minute,
                probability = result.total_probability,
                reasons = ?failures.iter().map(SuppressReason::code).collect::<Vec<_>>(),
                "Alert suppressed by thresholds"
            );
            return AlertDecision::suppressed(self.fixture_id, team, minute, failures, Some(result), market);
        }

        let tier = self.tiers.classify(result.total_probability);
        let identity = AlertIdentity {
            fixture_id: self.fixture_id,
            team,
            tier,
            minute_bucket: self.minute_bucket(minute),
        };

        if self.fired.contains(&identity) {
            self.states[team_slot(team)] = GateState::Suppressed;
            debug!(fixture_id = self.fixture_id, identity = %identity, "Duplicate alert suppressed");
            let mut decision = AlertDecision::suppressed(
                self.fixture_id,
                team,
                minute,
                vec![SuppressReason::Duplicate],
                Some(result),
                market,
            );
            decision.tier = Some(tier);
            decision.identity = Some(identity);
            return decision;
        }

        let mut reasons = vec![
            format!(
                "minute {} in {}-{}",
                minute, self.timing.start_minute, self.timing.end_minute
            ),
            "market open".to_string(),
            format!(
                "probability {:.1} >= {:.1}",
                result.total_probability, t.probability_floor
            ),
            format!("momentum {:.1} >= {:.1}", overall, t.momentum_floor),
        ];
        if let Some((name, weight)) = strong {
            reasons.push(format!(
                "pattern {} weight {:.1} >= {:.1}",
                name, weight, t.strong_pattern_floor
            ));
        }
        reasons.push(format!("tier {}", tier));

        self.fired.insert(identity.clone());
        self.states[team_slot(team)] = GateState::Fired;
        info!(
            fixture_id = self.fixture_id,
            team = %team,
            minute,
            tier = %tier,
            probability = result.total_probability,
            patterns = ?result.pattern_names(),
            "Alert fired"
        );

        AlertDecision {
            fixture_id: self.fixture_id,
            team,
            minute,
            fired: true,
            tier: Some(tier),
            identity: Some(identity),
            reasons,
            suppressed_by: Vec::new(),
            probability_result: Some(result),
            market_lines: market.lines.clone(),
        }
    }
}

fn team_slot(team: Team) -> usize {
    match team {
        Team::Home => 0,
        Team::Away => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{MatchedPattern, MomentumIndicators};
    use std::cell::Cell;

    fn make_result(team: Team, total: f64, overall: f64, weights: &[f64]) -> ProbabilityResult {
        ProbabilityResult {
            team,
            total_probability: total,
            momentum_contribution: overall * 0.5,
            pattern_contribution: total - overall * 0.5,
            matched_patterns: weights
                .iter()
                .enumerate()
                .map(|(i, &weight)| MatchedPattern {
                    name: format!("P{}", i),
                    weight,
                    team,
                })
                .collect(),
            momentum_indicators: MomentumIndicators {
                overall,
                ..Default::default()
            },
        }
    }

    fn strong_home() -> TeamProbabilities {
        TeamProbabilities {
            home: make_result(Team::Home, 63.4, 26.8, &[2.5, 1.5, 2.0]),
            away: make_result(Team::Away, 5.0, 10.0, &[]),
        }
    }

    fn gate() -> AlertGate {
        AlertGate::new(11, &ProfileConfig::late_game())
    }

    #[test]
    fn tiers_classify_by_floor() {
        let table = TierTable::default();
        assert_eq!(table.classify(95.0), Tier::Extreme);
        assert_eq!(table.classify(90.0), Tier::Extreme);
        assert_eq!(table.classify(75.0), Tier::VeryHigh);
        assert_eq!(table.classify(63.4), Tier::High);
        assert_eq!(table.classify(40.0), Tier::Medium);
        assert_eq!(table.classify(39.9), Tier::Low);
        assert!(table.validate().is_ok());
    }

    #[test]
    fn unsorted_tier_table_is_invalid() {
        let table = TierTable::new(vec![
            TierBand { floor: 60.0, tier: Tier::High },
            TierBand { floor: 90.0, tier: Tier::Extreme },
        ]);
        assert!(table.validate().is_err());
        assert!(TierTable::new(vec![]).validate().is_err());
    }

    #[test]
    fn fires_when_all_gates_pass() {
        let mut gate = gate();
        let decisions = gate.evaluate(86, &MarketAvailability::open(vec![10.5]), strong_home);

        let home = &decisions[0];
        assert!(home.fired);
        assert_eq!(home.tier, Some(Tier::High));
        assert_eq!(home.identity.as_ref().map(|i| i.to_string()), Some("11:home:HIGH:0".to_string()));
        assert_eq!(home.market_lines, vec![10.5]);
        assert!(home.reasons.iter().any(|r| r == "tier HIGH"));
        assert_eq!(gate.state(Team::Home), GateState::Fired);

        let away = &decisions[1];
        assert!(!away.fired);
        assert!(away.suppressed_for("low probability"));
        assert!(away.suppressed_for("weak momentum"));
        assert!(away.suppressed_for("no strong pattern"));
        assert_eq!(gate.state(Team::Away), GateState::Suppressed);
    }

    #[test]
    fn timing_gate_skips_computation() {
        let mut gate = gate();
        let calls = Cell::new(0);
        let decisions = gate.evaluate(80, &MarketAvailability::open(vec![]), || {
            calls.set(calls.get() + 1);
            strong_home()
        });

        assert_eq!(calls.get(), 0);
        assert_eq!(decisions.len(), 2);
        for decision in &decisions {
            assert!(!decision.fired);
            assert_eq!(decision.reasons, vec!["timing".to_string()]);
            assert!(decision.probability_result.is_none());
        }
    }

    #[test]
    fn closed_market_skips_computation() {
        let mut gate = gate();
        let calls = Cell::new(0);
        let decisions = gate.evaluate(86, &MarketAvailability::closed(), || {
            calls.set(calls.get() + 1);
            strong_home()
        });

        assert_eq!(calls.get(), 0);
        assert!(decisions.iter().all(|d| d.reasons == vec!["no market".to_string()]));
    }

    #[test]
    fn same_identity_fires_once() {
        let mut gate = gate();
        let market = MarketAvailability::open(vec![]);

        let first = gate.evaluate(86, &market, strong_home);
        let second = gate.evaluate(87, &market, strong_home);

        assert!(first[0].fired);
        assert!(!second[0].fired);
        assert!(second[0].suppressed_for("duplicate"));
        assert_eq!(gate.fired_identities().count(), 1);
    }

    #[test]
    fn higher_tier_in_same_bucket_fires_again() {
        let mut gate = gate();
        let market = MarketAvailability::open(vec![]);
        gate.evaluate(86, &market, strong_home);

        let stronger = gate.evaluate(87, &market, || TeamProbabilities {
            home: make_result(Team::Home, 92.0, 90.0, &[3.0, 2.5]),
            away: make_result(Team::Away, 0.0, 0.0, &[]),
        });
        assert!(stronger[0].fired);
        assert_eq!(stronger[0].tier, Some(Tier::Extreme));
        assert_eq!(gate.fired_identities().count(), 2);
    }

    #[test]
    fn no_strong_pattern_blocks_even_high_probability() {
        let mut gate = gate();
        let decisions = gate.evaluate(86, &MarketAvailability::open(vec![]), || TeamProbabilities {
            home: make_result(Team::Home, 70.0, 80.0, &[1.5, 1.5]),
            away: make_result(Team::Away, 0.0, 0.0, &[]),
        });
        assert!(!decisions[0].fired);
        assert_eq!(decisions[0].suppressed_by.len(), 1);
        assert!(decisions[0].suppressed_for("no strong pattern"));
    }

    #[test]
    fn minute_bucket_counts_from_window_start() {
        let mut profile = ProfileConfig::first_half();
        profile.dedup_bucket_mins = 2;
        let gate = AlertGate::new(1, &profile);
        assert_eq!(gate.minute_bucket(30), 0);
        assert_eq!(gate.minute_bucket(31), 0);
        assert_eq!(gate.minute_bucket(32), 1);
        assert_eq!(gate.minute_bucket(35), 2);
    }
}
