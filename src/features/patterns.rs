//! Pattern Detector
//!
//! Patterns are data: a name, a weight and a conjunction of
//! `stat over window >= min` / `<= max` conditions. Rule sets are loaded from
//! YAML and can be swapped per alert profile.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::{debug, warn};

use super::window_tracker::{WindowedDelta, WindowedStatsTracker};
use crate::error::{EngineError, Result};
use crate::types::{Stat, StatId, Team};

/// One bound on one windowed statistic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub stat: StatId,
    pub window_mins: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl Condition {
    /// `stat over window_mins >= min`
    pub fn at_least(stat: Stat, window_mins: u32, min: f64) -> Self {
        Self {
            stat: stat.into(),
            window_mins,
            min: Some(min),
            max: None,
        }
    }

    /// `stat over window_mins <= max`
    pub fn at_most(stat: Stat, window_mins: u32, max: f64) -> Self {
        Self {
            stat: stat.into(),
            window_mins,
            min: None,
            max: Some(max),
        }
    }

    pub fn holds(&self, value: f64) -> bool {
        self.min.map_or(true, |min| value >= min) && self.max.map_or(true, |max| value <= max)
    }
}

/// A named, weighted conjunction of conditions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub conditions: Vec<Condition>,
    pub weight: f64,
}

impl Pattern {
    pub fn new(name: &str, weight: f64, conditions: Vec<Condition>) -> Self {
        Self {
            name: name.to_string(),
            description: String::new(),
            conditions,
            weight,
        }
    }

    pub fn describe(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    /// Stat names in this pattern the engine does not know
    pub fn unknown_stats(&self) -> Vec<&str> {
        self.conditions
            .iter()
            .filter_map(|c| match &c.stat {
                StatId::Unknown(name) => Some(name.as_str()),
                StatId::Known(_) => None,
            })
            .collect()
    }
}

/// Ordered rule set of one profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatternSet {
    patterns: Vec<Pattern>,
}

impl Default for PatternSet {
    fn default() -> Self {
        Self::new(default_corner_patterns())
    }
}

impl PatternSet {
    pub fn new(patterns: Vec<Pattern>) -> Self {
        Self { patterns }
    }

    /// Parse a YAML list of patterns. Structure is checked by `validate`.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(Self::new(serde_yaml::from_str(yaml)?))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pattern> {
        self.patterns.iter()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Reject patterns that cannot be evaluated. Windows must fit in the
    /// tracker history.
    pub fn validate(&self, history_mins: u32) -> Result<()> {
        let mut names = HashSet::new();
        for pattern in &self.patterns {
            if pattern.name.trim().is_empty() {
                return Err(EngineError::invalid_config("pattern with empty name"));
            }
            if !names.insert(pattern.name.as_str()) {
                return Err(EngineError::invalid_config(format!(
                    "duplicate pattern name '{}'",
                    pattern.name
                )));
            }
            if pattern.conditions.is_empty() {
                return Err(EngineError::invalid_config(format!(
                    "pattern '{}' has no conditions",
                    pattern.name
                )));
            }
            if !pattern.weight.is_finite() || pattern.weight < 0.0 {
                return Err(EngineError::invalid_config(format!(
                    "pattern '{}' weight must be a non-negative number",
                    pattern.name
                )));
            }
            for cond in &pattern.conditions {
                if cond.window_mins == 0 || cond.window_mins > history_mins {
                    return Err(EngineError::invalid_config(format!(
                        "pattern '{}': {} window {}m outside 1..={}",
                        pattern.name, cond.stat, cond.window_mins, history_mins
                    )));
                }
                match (cond.min, cond.max) {
                    (None, None) => {
                        return Err(EngineError::invalid_config(format!(
                            "pattern '{}': {} condition has no bound",
                            pattern.name, cond.stat
                        )))
                    }
                    (Some(min), Some(max)) if min > max => {
                        return Err(EngineError::invalid_config(format!(
                            "pattern '{}': {} min {} > max {}",
                            pattern.name, cond.stat, min, max
                        )))
                    }
                    _ => {}
                }
                if cond.min.map_or(false, |v| !v.is_finite())
                    || cond.max.map_or(false, |v| !v.is_finite())
                {
                    return Err(EngineError::invalid_config(format!(
                        "pattern '{}': {} bounds must be finite",
                        pattern.name, cond.stat
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Built-in corner rule set
pub fn default_corner_patterns() -> Vec<Pattern> {
    use Condition as C;
    use Stat::*;

    vec![
        Pattern::new(
            "Sustained Pressure",
            2.5,
            vec![C::at_least(DangerousAttacks, 5, 8.0), C::at_least(ShotsOnTarget, 5, 2.0)],
        )
        .describe("Constant dangerous attacks with shots on target"),
        Pattern::new("Shot Volume", 1.5, vec![C::at_least(ShotsOnTarget, 5, 3.0)])
            .describe("Repeated efforts on goal"),
        Pattern::new(
            "Quick Attack",
            2.0,
            vec![C::at_least(DangerousAttacks, 3, 5.0), C::at_least(ShotsOnTarget, 3, 2.0)],
        )
        .describe("Burst of attacks in a short window"),
        Pattern::new(
            "High Pressure",
            3.0,
            vec![
                C::at_least(ShotsBlocked, 5, 2.0),
                C::at_least(DangerousAttacks, 5, 3.0),
                C::at_least(Possession, 5, 60.0),
            ],
        )
        .describe("Blocked shots under heavy possession"),
        Pattern::new(
            "Wing Attack",
            2.5,
            vec![C::at_least(Crosses, 5, 3.0), C::at_least(SuccessfulDribbles, 5, 2.0)],
        )
        .describe("Play through the flanks"),
        Pattern::new(
            "Shot Blocking",
            2.0,
            vec![
                C::at_least(ShotsBlocked, 5, 2.0),
                C::at_least(ShotsTotal, 5, 3.0),
                C::at_least(Possession, 5, 55.0),
            ],
        )
        .describe("Shots deflected behind"),
        Pattern::new(
            "Territory Dominance",
            2.0,
            vec![
                C::at_least(Possession, 5, 65.0),
                C::at_least(Territory, 5, 70.0),
                C::at_least(DangerousAttacks, 5, 2.0),
            ],
        )
        .describe("Camped in the opponent half"),
        Pattern::new(
            "Corner Cluster",
            2.7,
            vec![C::at_least(Corners, 15, 3.0), C::at_least(DangerousAttacks, 5, 6.0)],
        )
        .describe("Corners already coming with attacks still flowing"),
    ]
}

/// A pattern that matched for one team
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchedPattern {
    pub name: String,
    pub weight: f64,
    pub team: Team,
}

/// Evaluates a rule set against a tracker. Implementations must be pure.
pub trait PatternDetector: Send + Sync {
    fn detect(&self, tracker: &WindowedStatsTracker, team: Team, now: DateTime<Utc>)
        -> Vec<MatchedPattern>;
}

#[derive(Debug, Clone)]
struct CompiledPattern {
    pattern: Pattern,
    /// False when any condition names an unknown stat; the pattern never matches
    evaluable: bool,
}

/// Detector over a loaded [`PatternSet`]
#[derive(Debug, Clone)]
pub struct RulePatternDetector {
    rules: Vec<CompiledPattern>,
    windows: BTreeSet<u32>,
}

impl RulePatternDetector {
    /// Compile a rule set. Unknown stat names are reported once here.
    pub fn new(set: &PatternSet) -> Self {
        let rules: Vec<CompiledPattern> = set
            .iter()
            .map(|pattern| {
                let unknown = pattern.unknown_stats();
                if !unknown.is_empty() {
                    warn!(
                        pattern = %pattern.name,
                        stats = ?unknown,
                        "Pattern references unknown statistics and will never match"
                    );
                }
                CompiledPattern {
                    evaluable: unknown.is_empty(),
                    pattern: pattern.clone(),
                }
            })
            .collect();

        let windows = rules
            .iter()
            .filter(|r| r.evaluable)
            .flat_map(|r| r.pattern.conditions.iter().map(|c| c.window_mins))
            .collect();

        Self { rules, windows }
    }

    /// Distinct windows evaluated per call; each is computed once
    pub fn windows(&self) -> impl Iterator<Item = u32> + '_ {
        self.windows.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl PatternDetector for RulePatternDetector {
    fn detect(
        &self,
        tracker: &WindowedStatsTracker,
        team: Team,
        now: DateTime<Utc>,
    ) -> Vec<MatchedPattern> {
        let deltas: BTreeMap<u32, Option<WindowedDelta>> = self
            .windows
            .iter()
            .map(|&window| (window, tracker.window_delta(window, now).ok()))
            .collect();

        let mut matched = Vec::new();
        for rule in self.rules.iter().filter(|r| r.evaluable) {
            let holds = rule.pattern.conditions.iter().all(|cond| {
                let (Some(stat), Some(Some(delta))) = (cond.stat.known(), deltas.get(&cond.window_mins))
                else {
                    return false;
                };
                cond.holds(delta.value(stat, team))
            });
            if holds {
                debug!(
                    fixture_id = tracker.fixture_id(),
                    team = %team,
                    pattern = %rule.pattern.name,
                    weight = rule.pattern.weight,
                    "Pattern matched"
                );
                matched.push(MatchedPattern {
                    name: rule.pattern.name.clone(),
                    weight: rule.pattern.weight,
                    team,
                });
            }
        }
        matched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Snapshot;
    use chrono::{Duration, TimeZone};

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 19, 0, 0).unwrap() + Duration::minutes(i64::from(minute))
    }

    /// Home side ramps dangerous attacks and shots on target each minute
    fn pressing_tracker() -> WindowedStatsTracker {
        let mut tracker = WindowedStatsTracker::new(3, 20);
        let da = [1.0, 1.0, 2.0, 4.0, 6.0, 9.0, 12.0];
        let sot = [0.0, 0.0, 0.0, 1.0, 2.0, 3.0, 4.0];
        for (i, minute) in (80..=86).enumerate() {
            tracker.update(
                Snapshot::new(3, at(minute), minute)
                    .with_stat(Stat::DangerousAttacks, da[i], 1.0)
                    .with_stat(Stat::ShotsOnTarget, sot[i], 0.0)
                    .with_stat(Stat::Possession, 58.0, 42.0),
            );
        }
        tracker
    }

    fn names(matched: &[MatchedPattern]) -> Vec<&str> {
        matched.iter().map(|m| m.name.as_str()).collect()
    }

    #[test]
    fn default_patterns_match_pressing_side() {
        let detector = RulePatternDetector::new(&PatternSet::default());
        let tracker = pressing_tracker();

        let home = detector.detect(&tracker, Team::Home, at(86));
        assert_eq!(
            names(&home),
            vec!["Sustained Pressure", "Shot Volume", "Quick Attack"]
        );
        assert!(home.iter().all(|m| m.team == Team::Home));

        assert!(detector.detect(&tracker, Team::Away, at(86)).is_empty());
    }

    #[test]
    fn insufficient_window_never_matches() {
        let set = PatternSet::new(vec![Pattern::new(
            "Any Corner",
            1.0,
            vec![Condition::at_least(Stat::Corners, 5, 0.0)],
        )]);
        let detector = RulePatternDetector::new(&set);
        let mut tracker = WindowedStatsTracker::new(3, 20);
        tracker.update(Snapshot::new(3, at(80), 80));

        assert!(detector.detect(&tracker, Team::Home, at(80)).is_empty());
    }

    #[test]
    fn unknown_stat_pattern_never_matches() {
        let yaml = r#"
- name: Big Chances
  weight: 4.0
  conditions:
    - { stat: big_chances, window_mins: 5, min: 0 }
- name: Any Attack
  weight: 1.0
  conditions:
    - { stat: dangerous_attacks, window_mins: 5, min: 1 }
"#;
        let set = PatternSet::from_yaml_str(yaml).unwrap();
        assert!(set.validate(20).is_ok());
        let detector = RulePatternDetector::new(&set);

        let matched = detector.detect(&pressing_tracker(), Team::Home, at(86));
        assert_eq!(names(&matched), vec!["Any Attack"]);
    }

    #[test]
    fn max_bound_is_respected() {
        let set = PatternSet::new(vec![Pattern::new(
            "Quiet Away",
            1.0,
            vec![Condition::at_most(Stat::DangerousAttacks, 5, 0.0)],
        )]);
        let detector = RulePatternDetector::new(&set);
        let tracker = pressing_tracker();

        assert_eq!(detector.detect(&tracker, Team::Away, at(86)).len(), 1);
        assert!(detector.detect(&tracker, Team::Home, at(86)).is_empty());
    }

    #[test]
    fn distinct_windows_are_shared_across_patterns() {
        let detector = RulePatternDetector::new(&PatternSet::default());
        assert_eq!(detector.windows().collect::<Vec<_>>(), vec![3, 5, 15]);
    }

    #[test]
    fn structurally_invalid_sets_are_rejected() {
        let empty = PatternSet::new(vec![Pattern::new("Nothing", 1.0, vec![])]);
        assert!(empty.validate(20).is_err());

        let too_long = PatternSet::new(vec![Pattern::new(
            "Whole Half",
            1.0,
            vec![Condition::at_least(Stat::Corners, 45, 1.0)],
        )]);
        assert!(too_long.validate(20).is_err());

        let mut inverted = Condition::at_least(Stat::Corners, 5, 3.0);
        inverted.max = Some(1.0);
        let inverted = PatternSet::new(vec![Pattern::new("Inverted", 1.0, vec![inverted])]);
        assert!(inverted.validate(20).is_err());

        let bad_weight = PatternSet::new(vec![Pattern::new(
            "NaN",
            f64::NAN,
            vec![Condition::at_least(Stat::Corners, 5, 1.0)],
        )]);
        assert!(bad_weight.validate(20).is_err());
    }

    #[test]
    fn default_set_validates() {
        assert!(PatternSet::default().validate(20).is_ok());
        assert_eq!(PatternSet::default().len(), 8);
    }
}
