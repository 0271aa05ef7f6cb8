//! Alert profile configuration
//!
//! A profile is one alert product (e.g. late game, first half). Every
//! threshold, weight, band and pattern lives here so products differ by data
//! only.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::features::patterns::PatternSet;
use crate::strategy::alert_gate::TierTable;

/// Inclusive match-minute window in which alerts may fire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingWindow {
    pub start_minute: u32,
    pub end_minute: u32,
}

impl Default for TimingWindow {
    fn default() -> Self {
        Self::late_game()
    }
}

impl TimingWindow {
    pub fn new(start_minute: u32, end_minute: u32) -> Self {
        Self {
            start_minute,
            end_minute,
        }
    }

    pub fn late_game() -> Self {
        Self::new(85, 89)
    }

    pub fn first_half() -> Self {
        Self::new(30, 35)
    }

    pub fn contains(&self, minute: u32) -> bool {
        (self.start_minute..=self.end_minute).contains(&minute)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Window fed to the momentum scorer
    pub momentum_window_mins: u32,
    /// Snapshot history kept per fixture; also the largest usable window
    pub history_mins: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            momentum_window_mins: 5,
            history_mins: 20,
        }
    }
}

/// Blend of the three sub-indicators into `overall`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlendWeights {
    pub attack: f64,
    pub territory: f64,
    pub pressure: f64,
}

impl Default for BlendWeights {
    fn default() -> Self {
        Self {
            attack: 0.4,
            territory: 0.3,
            pressure: 0.3,
        }
    }
}

/// Fixed linear weights of the momentum scorer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MomentumWeights {
    // Attack
    pub dangerous_attacks: f64,
    pub shots_on_target: f64,
    pub key_passes: f64,
    // Territory
    pub possession: f64,
    pub successful_dribbles: f64,
    pub territory: f64,
    // Pressure
    pub shots_blocked: f64,
    pub crosses: f64,
    /// Attack sum is divided by the window length and multiplied by this
    pub attack_scale: f64,
    /// Pressure sum is divided by the window length and multiplied by this
    pub pressure_scale: f64,
    /// Territory sum is divided by this
    pub territory_divisor: f64,
    pub blend: BlendWeights,
}

impl Default for MomentumWeights {
    fn default() -> Self {
        Self {
            dangerous_attacks: 2.5,
            shots_on_target: 1.5,
            key_passes: 1.2,
            possession: 1.0,
            successful_dribbles: 1.0,
            territory: 1.5,
            shots_blocked: 2.0,
            crosses: 2.0,
            attack_scale: 10.0,
            pressure_scale: 20.0,
            territory_divisor: 3.0,
            blend: BlendWeights::default(),
        }
    }
}

impl MomentumWeights {
    fn values(&self) -> [(&'static str, f64); 14] {
        [
            ("dangerous_attacks", self.dangerous_attacks),
            ("shots_on_target", self.shots_on_target),
            ("key_passes", self.key_passes),
            ("possession", self.possession),
            ("successful_dribbles", self.successful_dribbles),
            ("territory", self.territory),
            ("shots_blocked", self.shots_blocked),
            ("crosses", self.crosses),
            ("attack_scale", self.attack_scale),
            ("pressure_scale", self.pressure_scale),
            ("territory_divisor", self.territory_divisor),
            ("blend.attack", self.blend.attack),
            ("blend.territory", self.blend.territory),
            ("blend.pressure", self.blend.pressure),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    pub momentum_weight: f64,
    pub momentum_cap: f64,
    pub pattern_scale: f64,
    pub pattern_cap: f64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            momentum_weight: 0.5,
            momentum_cap: 50.0,
            pattern_scale: 10.0,
            pattern_cap: 50.0,
        }
    }
}

/// Gate 3 floors; all must hold at once
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub probability_floor: f64,
    pub momentum_floor: f64,
    pub strong_pattern_floor: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            probability_floor: 60.0,
            momentum_floor: 25.0,
            strong_pattern_floor: 2.0,
        }
    }
}

fn default_dedup_bucket_mins() -> u32 {
    10
}

fn default_true() -> bool {
    true
}

/// One alert product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub timing: TimingWindow,
    #[serde(default)]
    pub windows: WindowConfig,
    #[serde(default)]
    pub momentum: MomentumWeights,
    #[serde(default)]
    pub aggregator: AggregatorConfig,
    #[serde(default)]
    pub thresholds: ThresholdConfig,
    #[serde(default)]
    pub tiers: TierTable,
    /// Width of the de-duplication minute bucket, counted from `timing.start_minute`
    #[serde(default = "default_dedup_bucket_mins")]
    pub dedup_bucket_mins: u32,
    /// Return suppressed decisions too (observability)
    #[serde(default = "default_true")]
    pub emit_suppressed: bool,
    #[serde(default)]
    pub patterns: PatternSet,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self::late_game()
    }
}

impl ProfileConfig {
    pub fn late_game() -> Self {
        Self {
            name: "late_game".to_string(),
            timing: TimingWindow::late_game(),
            windows: WindowConfig::default(),
            momentum: MomentumWeights::default(),
            aggregator: AggregatorConfig::default(),
            thresholds: ThresholdConfig::default(),
            tiers: TierTable::default(),
            dedup_bucket_mins: default_dedup_bucket_mins(),
            emit_suppressed: true,
            patterns: PatternSet::default(),
        }
    }

    pub fn first_half() -> Self {
        Self {
            name: "first_half".to_string(),
            timing: TimingWindow::first_half(),
            ..Self::late_game()
        }
    }

    /// Parse a single profile from YAML and validate it
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let profile: ProfileConfig = serde_yaml::from_str(yaml)?;
        profile.validate()?;
        Ok(profile)
    }

    /// Structural validation. Only what would make the engine meaningless is
    /// rejected; unknown stat names are left to the detector.
    pub fn validate(&self) -> Result<()> {
        let name = if self.name.is_empty() { "<unnamed>" } else { &self.name };

        if self.timing.start_minute > self.timing.end_minute {
            return Err(EngineError::invalid_config(format!(
                "profile {}: timing window {}-{} is reversed",
                name, self.timing.start_minute, self.timing.end_minute
            )));
        }
        if self.windows.history_mins == 0 {
            return Err(EngineError::invalid_config(format!(
                "profile {}: history_mins must be positive",
                name
            )));
        }
        if self.windows.momentum_window_mins == 0
            || self.windows.momentum_window_mins > self.windows.history_mins
        {
            return Err(EngineError::invalid_config(format!(
                "profile {}: momentum window {}m must be within 1..={}",
                name, self.windows.momentum_window_mins, self.windows.history_mins
            )));
        }
        for (field, value) in self.momentum.values() {
            if !value.is_finite() || value < 0.0 {
                return Err(EngineError::invalid_config(format!(
                    "profile {}: momentum.{} must be a non-negative number",
                    name, field
                )));
            }
        }
        if self.momentum.territory_divisor == 0.0 {
            return Err(EngineError::invalid_config(format!(
                "profile {}: momentum.territory_divisor must not be zero",
                name
            )));
        }
        let agg = &self.aggregator;
        for (field, value) in [
            ("momentum_weight", agg.momentum_weight),
            ("momentum_cap", agg.momentum_cap),
            ("pattern_scale", agg.pattern_scale),
            ("pattern_cap", agg.pattern_cap),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(EngineError::invalid_config(format!(
                    "profile {}: aggregator.{} must be a non-negative number",
                    name, field
                )));
            }
        }
        let t = &self.thresholds;
        if ![t.probability_floor, t.momentum_floor, t.strong_pattern_floor]
            .iter()
            .all(|v| v.is_finite())
        {
            return Err(EngineError::invalid_config(format!(
                "profile {}: thresholds must be finite",
                name
            )));
        }
        if self.dedup_bucket_mins == 0 {
            return Err(EngineError::invalid_config(format!(
                "profile {}: dedup_bucket_mins must be positive",
                name
            )));
        }
        self.tiers
            .validate()
            .map_err(|e| EngineError::invalid_config(format!("profile {}: {}", name, e)))?;
        self.patterns
            .validate(self.windows.history_mins)
            .map_err(|e| EngineError::invalid_config(format!("profile {}: {}", name, e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_profiles_validate() {
        assert!(ProfileConfig::late_game().validate().is_ok());
        assert!(ProfileConfig::first_half().validate().is_ok());
    }

    #[test]
    fn products_differ_only_by_timing() {
        let late = ProfileConfig::late_game();
        let first = ProfileConfig::first_half();
        assert_eq!(late.timing, TimingWindow::new(85, 89));
        assert_eq!(first.timing, TimingWindow::new(30, 35));
        assert_eq!(late.thresholds, first.thresholds);
        assert_eq!(late.patterns, first.patterns);
    }

    #[test]
    fn timing_window_is_inclusive() {
        let window = TimingWindow::late_game();
        assert!(!window.contains(84));
        assert!(window.contains(85));
        assert!(window.contains(89));
        assert!(!window.contains(90));
    }

    #[test]
    fn reversed_timing_window_is_rejected() {
        let mut profile = ProfileConfig::late_game();
        profile.timing = TimingWindow::new(89, 85);
        assert!(matches!(
            profile.validate(),
            Err(EngineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn momentum_window_longer_than_history_is_rejected() {
        let mut profile = ProfileConfig::late_game();
        profile.windows.momentum_window_mins = 25;
        assert!(profile.validate().is_err());
    }

    #[test]
    fn partial_yaml_profile_fills_defaults() {
        let yaml = r#"
name: first_half
timing: { start_minute: 30, end_minute: 35 }
thresholds:
  probability_floor: 70
"#;
        let profile = ProfileConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(profile.timing, TimingWindow::first_half());
        assert_eq!(profile.thresholds.probability_floor, 70.0);
        assert_eq!(profile.thresholds.momentum_floor, 25.0);
        assert_eq!(profile.dedup_bucket_mins, 10);
        assert!(!profile.patterns.is_empty());
    }

    #[test]
    fn unparseable_yaml_is_an_error() {
        assert!(matches!(
            ProfileConfig::from_yaml_str("timing: [not, a, window"),
            Err(EngineError::Yaml(_))
        ));
    }
}
