//! CSV Persistence Module
//!
//! Append-only daily alert log for auditing fired and suppressed decisions

use anyhow::{Context, Result};
use chrono::Utc;
use csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock as AsyncRwLock;
use tracing::info;

use crate::strategy::AlertDecision;

/// Alert decision record for CSV storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub timestamp: i64,
    pub identity: String,
    pub fixture_id: u64,
    pub team: String,
    pub minute: u32,
    pub fired: bool,
    pub tier: String,
    pub total_probability: Option<f64>,
    pub momentum_contribution: Option<f64>,
    pub pattern_contribution: Option<f64>,
    pub momentum_overall: Option<f64>,
    /// Matched pattern names joined with `|`
    pub patterns: String,
    /// Reasons joined with `; `
    pub reasons: String,
    /// Quoted market lines joined with `|`
    pub market_lines: String,
}

impl From<&AlertDecision> for AlertRecord {
    fn from(decision: &AlertDecision) -> Self {
        let result = decision.probability_result.as_ref();
        Self {
            timestamp: Utc::now().timestamp_millis(),
            identity: decision
                .identity
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default(),
            fixture_id: decision.fixture_id,
            team: decision.team.to_string(),
            minute: decision.minute,
            fired: decision.fired,
            tier: decision.tier.map(|t| t.to_string()).unwrap_or_default(),
            total_probability: result.map(|r| r.total_probability),
            momentum_contribution: result.map(|r| r.momentum_contribution),
            pattern_contribution: result.map(|r| r.pattern_contribution),
            momentum_overall: result.map(|r| r.momentum_indicators.overall),
            patterns: result.map(|r| r.pattern_names().join("|")).unwrap_or_default(),
            reasons: decision.reasons.join("; "),
            market_lines: decision
                .market_lines
                .iter()
                .map(|line| line.to_string())
                .collect::<Vec<_>>()
                .join("|"),
        }
    }
}

pub struct AlertLog {
    data_dir: PathBuf,
    path: PathBuf,
    writer: Arc<AsyncRwLock<csv::Writer<std::fs::File>>>,
}

impl AlertLog {
    /// Open today's alert log under `<data_dir>/alerts`
    pub fn new(data_dir: &str) -> Result<Self> {
        let data_dir = PathBuf::from(data_dir);
        let alerts_dir = data_dir.join("alerts");
        fs::create_dir_all(&alerts_dir).context("Failed to create alerts directory")?;

        let today = Utc::now().format("%Y-%m-%d");
        let filename = format!("alerts_{}.csv", today);
        let writer = Self::create_writer(&alerts_dir, &filename)?;
        let path = alerts_dir.join(filename);
        info!(path = %path.display(), "Alert log opened");

        Ok(Self {
            data_dir,
            path,
            writer: Arc::new(AsyncRwLock::new(writer)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn create_writer(dir: &Path, filename: &str) -> Result<csv::Writer<std::fs::File>> {
        let path = dir.join(filename);
        let file_has_data =
            path.exists() && fs::metadata(&path).map(|m| m.len() > 0).unwrap_or(false);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .context("Failed to open CSV file")?;

        let writer = WriterBuilder::new()
            .has_headers(!file_has_data)
            .from_writer(file);

        Ok(writer)
    }

    /// Save one decision
    pub async fn save_decision(&self, decision: &AlertDecision) -> Result<()> {
        let record = AlertRecord::from(decision);
        let mut writer = self.writer.write().await;
        writer
            .serialize(&record)
            .context("Failed to write alert record")?;
        writer.flush().context("Failed to flush alert writer")?;
        Ok(())
    }

    /// Load the last `days` days of records, oldest first
    pub fn load_alert_history(&self, days: u32) -> Result<Vec<AlertRecord>> {
        let mut records = Vec::new();

        for i in 0..days {
            let date = Utc::now() - chrono::Duration::days(i as i64);
            let filename = format!("alerts_{}.csv", date.format("%Y-%m-%d"));
            let path = self.data_dir.join("alerts").join(&filename);

            if path.exists() {
                let file = std::fs::File::open(&path).context("Failed to open alert file")?;
                let mut reader = ReaderBuilder::new().has_headers(true).from_reader(file);

                for result in reader.deserialize() {
                    let record: AlertRecord =
                        result.context("Failed to deserialize alert record")?;
                    records.push(record);
                }
            }
        }

        records.sort_by_key(|r| r.timestamp);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProfileConfig;
    use crate::features::{MatchedPattern, MomentumIndicators};
    use crate::strategy::{AlertGate, ProbabilityResult, TeamProbabilities};
    use crate::types::{MarketAvailability, Team};

    fn temp_data_dir(test_name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "cornerbot_persistence_{}_{}",
            test_name,
            uuid::Uuid::new_v4()
        ))
    }

    fn result(team: Team, total: f64, overall: f64, weights: &[f64]) -> ProbabilityResult {
        ProbabilityResult {
            team,
            total_probability: total,
            momentum_contribution: overall * 0.5,
            pattern_contribution: total - overall * 0.5,
            matched_patterns: weights
                .iter()
                .map(|&weight| MatchedPattern {
                    name: format!("W{}", weight),
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

    fn decisions() -> Vec<AlertDecision> {
        let mut gate = AlertGate::new(21, &ProfileConfig::late_game());
        gate.evaluate(87, &MarketAvailability::open(vec![9.5, 10.5]), || TeamProbabilities {
            home: result(Team::Home, 80.0, 60.0, &[3.0, 2.0]),
            away: result(Team::Away, 10.0, 20.0, &[]),
        })
    }

    #[tokio::test]
    async fn decisions_round_trip_through_daily_file() {
        let data_dir = temp_data_dir("round_trip");
        let log = AlertLog::new(data_dir.to_str().unwrap()).unwrap();
        for decision in decisions() {
            log.save_decision(&decision).await.unwrap();
        }

        let records = log.load_alert_history(1).unwrap();
        assert_eq!(records.len(), 2);

        let fired = records.iter().find(|r| r.fired).unwrap();
        assert_eq!(fired.identity, "21:home:VERY_HIGH:0");
        assert_eq!(fired.tier, "VERY_HIGH");
        assert_eq!(fired.patterns, "W3|W2");
        assert_eq!(fired.market_lines, "9.5|10.5");

        let suppressed = records.iter().find(|r| !r.fired).unwrap();
        assert_eq!(suppressed.team, "away");
        assert!(suppressed.identity.is_empty());
        assert!(suppressed.reasons.contains("low probability"));

        let _ = fs::remove_dir_all(&data_dir);
    }

    #[tokio::test]
    async fn reopening_appends_without_second_header() {
        let data_dir = temp_data_dir("reopen");
        let dir = data_dir.to_str().unwrap().to_string();
        let decisions = decisions();

        let first = AlertLog::new(&dir).unwrap();
        first.save_decision(&decisions[0]).await.unwrap();
        drop(first);

        let second = AlertLog::new(&dir).unwrap();
        second.save_decision(&decisions[1]).await.unwrap();

        let text = fs::read_to_string(second.path()).unwrap();
        assert_eq!(text.matches("identity").count(), 1);
        assert_eq!(second.load_alert_history(1).unwrap().len(), 2);

        let _ = fs::remove_dir_all(&data_dir);
    }
}
