//! Core types used throughout CornerBot
//!
//! Defines fixtures, teams, statistic identifiers and the snapshot records
//! produced by the match statistics feed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// Stable identifier of a live fixture (one match)
pub type FixtureId = u64;

/// Side of the fixture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Team {
    Home,
    Away,
}

impl Default for Team {
    fn default() -> Self {
        Team::Home
    }
}

impl Team {
    pub const BOTH: [Team; 2] = [Team::Home, Team::Away];

    pub fn as_str(&self) -> &'static str {
        match self {
            Team::Home => "home",
            Team::Away => "away",
        }
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a statistic evolves during a half
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatKind {
    /// Non-decreasing counter; windowed value is `latest - earliest`
    Cumulative,
    /// Instantaneous percentage; windowed value is the in-window mean
    Percentage,
}

/// Statistics the engine understands.
///
/// The discriminant doubles as the slot index inside [`StatLine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stat {
    Attacks,
    DangerousAttacks,
    ShotsTotal,
    ShotsOnTarget,
    ShotsOffTarget,
    ShotsBlocked,
    KeyPasses,
    SuccessfulDribbles,
    Crosses,
    Corners,
    FreeKicks,
    Possession,
    Territory,
}

impl Stat {
    pub const COUNT: usize = 13;

    pub const ALL: [Stat; Stat::COUNT] = [
        Stat::Attacks,
        Stat::DangerousAttacks,
        Stat::ShotsTotal,
        Stat::ShotsOnTarget,
        Stat::ShotsOffTarget,
        Stat::ShotsBlocked,
        Stat::KeyPasses,
        Stat::SuccessfulDribbles,
        Stat::Crosses,
        Stat::Corners,
        Stat::FreeKicks,
        Stat::Possession,
        Stat::Territory,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn kind(self) -> StatKind {
        match self {
            Stat::Possession | Stat::Territory => StatKind::Percentage,
            _ => StatKind::Cumulative,
        }
    }

    /// Feed / configuration name
    pub fn name(self) -> &'static str {
        match self {
            Stat::Attacks => "attacks",
            Stat::DangerousAttacks => "dangerous_attacks",
            Stat::ShotsTotal => "shots_total",
            Stat::ShotsOnTarget => "shots_on_target",
            Stat::ShotsOffTarget => "shots_off_target",
            Stat::ShotsBlocked => "shots_blocked",
            Stat::KeyPasses => "key_passes",
            Stat::SuccessfulDribbles => "successful_dribbles",
            Stat::Crosses => "crosses",
            Stat::Corners => "corners",
            Stat::FreeKicks => "free_kicks",
            Stat::Possession => "possession",
            Stat::Territory => "territory",
        }
    }

    /// Parse from a feed or configuration name
    pub fn from_name(s: &str) -> Option<Self> {
        let wanted = s.trim().to_lowercase();
        Stat::ALL.iter().copied().find(|stat| stat.name() == wanted)
    }
}

impl fmt::Display for Stat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A statistic reference as written in configuration.
///
/// Names that do not map to a [`Stat`] are kept verbatim so a pattern that
/// mentions them can be reported and then never match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StatId {
    Known(Stat),
    Unknown(String),
}

impl StatId {
    pub fn known(&self) -> Option<Stat> {
        match self {
            StatId::Known(stat) => Some(*stat),
            StatId::Unknown(_) => None,
        }
    }
}

impl From<&str> for StatId {
    fn from(s: &str) -> Self {
        match Stat::from_name(s) {
            Some(stat) => StatId::Known(stat),
            None => StatId::Unknown(s.to_string()),
        }
    }
}

impl From<String> for StatId {
    fn from(s: String) -> Self {
        StatId::from(s.as_str())
    }
}

impl From<Stat> for StatId {
    fn from(stat: Stat) -> Self {
        StatId::Known(stat)
    }
}

impl From<StatId> for String {
    fn from(id: StatId) -> Self {
        id.to_string()
    }
}

impl fmt::Display for StatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatId::Known(stat) => write!(f, "{}", stat),
            StatId::Unknown(name) => write!(f, "{}", name),
        }
    }
}

/// Home/away pair of one statistic
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamPair {
    #[serde(default)]
    pub home: f64,
    #[serde(default)]
    pub away: f64,
}

impl TeamPair {
    pub fn new(home: f64, away: f64) -> Self {
        Self { home, away }
    }

    pub fn get(&self, team: Team) -> f64 {
        match team {
            Team::Home => self.home,
            Team::Away => self.away,
        }
    }

    pub fn set(&mut self, team: Team, value: f64) {
        match team {
            Team::Home => self.home = value,
            Team::Away => self.away = value,
        }
    }
}

/// Fixed-size table of every known statistic for both teams.
///
/// Stats absent from the feed read as zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "HashMap<String, TeamPair>", into = "HashMap<String, TeamPair>")]
pub struct StatLine {
    values: [TeamPair; Stat::COUNT],
}

impl Default for StatLine {
    fn default() -> Self {
        Self {
            values: [TeamPair::default(); Stat::COUNT],
        }
    }
}

impl StatLine {
    pub fn get(&self, stat: Stat) -> TeamPair {
        self.values[stat.index()]
    }

    pub fn value(&self, stat: Stat, team: Team) -> f64 {
        self.values[stat.index()].get(team)
    }

    pub fn set(&mut self, stat: Stat, pair: TeamPair) {
        self.values[stat.index()] = pair;
    }

    /// Build from a raw `name -> {home, away}` feed map.
    pub fn from_counters(counters: &HashMap<String, TeamPair>) -> Self {
        let mut line = StatLine::default();
        for (name, pair) in counters {
            match Stat::from_name(name) {
                Some(stat) => line.set(stat, *pair),
                None => debug!(stat = %name, "Ignoring unrecognised feed statistic"),
            }
        }
        line
    }

    pub fn iter(&self) -> impl Iterator<Item = (Stat, TeamPair)> + '_ {
        Stat::ALL.iter().map(move |stat| (*stat, self.get(*stat)))
    }
}

impl From<HashMap<String, TeamPair>> for StatLine {
    fn from(counters: HashMap<String, TeamPair>) -> Self {
        StatLine::from_counters(&counters)
    }
}

impl From<StatLine> for HashMap<String, TeamPair> {
    fn from(line: StatLine) -> Self {
        line.iter()
            .map(|(stat, pair)| (stat.name().to_string(), pair))
            .collect()
    }
}

/// One timestamped reading of a fixture's statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub fixture_id: FixtureId,
    pub timestamp: DateTime<Utc>,
    /// Match clock minute
    pub minute: u32,
    #[serde(default)]
    pub stats: StatLine,
}

impl Snapshot {
    pub fn new(fixture_id: FixtureId, timestamp: DateTime<Utc>, minute: u32) -> Self {
        Self {
            fixture_id,
            timestamp,
            minute,
            stats: StatLine::default(),
        }
    }

    /// Builder-style setter
    pub fn with_stat(mut self, stat: Stat, home: f64, away: f64) -> Self {
        self.stats.set(stat, TeamPair::new(home, away));
        self
    }
}

/// Whether a tradable market is currently quoted for a fixture
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketAvailability {
    pub available: bool,
    /// Currently quoted line values (e.g. 10.5 corners), if known
    #[serde(default)]
    pub lines: Vec<f64>,
}

impl MarketAvailability {
    pub fn open(lines: Vec<f64>) -> Self {
        Self {
            available: true,
            lines,
        }
    }

    pub fn closed() -> Self {
        Self::default()
    }
}

/// Everything the feed supplies for one fixture in one cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureUpdate {
    pub snapshot: Snapshot,
    #[serde(default)]
    pub market: MarketAvailability,
    /// External "match finished" signal
    #[serde(default)]
    pub finished: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stat_names_round_trip_through_lookup() {
        for stat in Stat::ALL {
            assert_eq!(Stat::from_name(stat.name()), Some(stat));
        }
        assert_eq!(Stat::from_name(" Dangerous_Attacks "), Some(Stat::DangerousAttacks));
        assert_eq!(Stat::from_name("big_chances"), None);
    }

    #[test]
    fn stat_index_matches_position_in_all() {
        for (i, stat) in Stat::ALL.iter().enumerate() {
            assert_eq!(stat.index(), i);
        }
    }

    #[test]
    fn unknown_stat_id_keeps_its_name() {
        let id = StatId::from("big_chances");
        assert_eq!(id, StatId::Unknown("big_chances".to_string()));
        assert!(id.known().is_none());
        assert_eq!(id.to_string(), "big_chances");
    }

    #[test]
    fn missing_counters_read_as_zero() {
        let mut raw = HashMap::new();
        raw.insert("corners".to_string(), TeamPair::new(5.0, 2.0));
        raw.insert("not_a_stat".to_string(), TeamPair::new(9.0, 9.0));

        let line = StatLine::from_counters(&raw);
        assert_eq!(line.value(Stat::Corners, Team::Home), 5.0);
        assert_eq!(line.value(Stat::Corners, Team::Away), 2.0);
        assert_eq!(line.value(Stat::DangerousAttacks, Team::Home), 0.0);
    }

    #[test]
    fn snapshot_deserializes_from_feed_json() {
        let json = r#"{
            "fixture_id": 42,
            "timestamp": "2026-10-16T20:40:00Z",
            "minute": 85,
            "stats": { "shots_on_target": { "home": 4, "away": 1 }, "possession": { "home": 61.5 } }
        }"#;
        let snapshot: Snapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.fixture_id, 42);
        assert_eq!(snapshot.stats.value(Stat::ShotsOnTarget, Team::Home), 4.0);
        assert_eq!(snapshot.stats.value(Stat::Possession, Team::Home), 61.5);
        assert_eq!(snapshot.stats.value(Stat::Possession, Team::Away), 0.0);
    }
}
