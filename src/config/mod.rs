//! Configuration management for CornerBot
//!
//! Loads from YAML files + environment variables via .env

mod types;

pub use types::*;

use anyhow::{Context, Result};
use chrono::Duration;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::EngineError;
use crate::strategy::AlertDecision;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub scheduler: SchedulerConfig,
    pub lifecycle: LifecycleConfig,
    pub persistence: PersistenceConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub feed: FeedConfig,
}

fn default_profiles() -> HashMap<String, ProfileConfig> {
    let mut profiles = HashMap::new();
    profiles.insert("late_game".to_string(), ProfileConfig::late_game());
    profiles.insert("first_half".to_string(), ProfileConfig::first_half());
    profiles
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Name of the active alert profile
    pub profile: String,
    /// Available alert profiles keyed by name
    #[serde(default = "default_profiles")]
    pub profiles: HashMap<String, ProfileConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between polling cycles
    pub poll_interval_secs: u64,
    /// Maximum fixtures processed concurrently
    pub max_concurrency: usize,
    /// Seconds between expiry sweeps
    pub reap_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
            max_concurrency: 8,
            reap_interval_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct LifecycleConfig {
    /// Close a session after this many minutes without an update
    pub inactivity_timeout_mins: i64,
    /// Close a session this many minutes after it was created
    pub max_duration_mins: i64,
    /// Match minute at or beyond which the match counts as finished
    pub final_minute: u32,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout_mins: 20,
            max_duration_mins: 130,
            final_minute: 100,
        }
    }
}

impl LifecycleConfig {
    pub fn inactivity_timeout(&self) -> Duration {
        Duration::minutes(self.inactivity_timeout_mins)
    }

    pub fn max_duration(&self) -> Duration {
        Duration::minutes(self.max_duration_mins)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
    /// Data directory
    pub data_dir: String,
    /// Enable CSV alert log
    pub csv_enabled: bool,
    /// Also log suppressed decisions, not only fired ones
    #[serde(default)]
    pub log_suppressed: bool,
}

impl PersistenceConfig {
    pub fn records(&self, decision: &AlertDecision) -> bool {
        decision.fired || self.log_suppressed
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON log lines instead of the human format
    pub json: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedConfig {
    /// JSON-lines file of fixture updates to replay
    #[serde(default)]
    pub replay_path: Option<PathBuf>,
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let config = Config::builder()
            // Engine defaults
            .set_default("engine.profile", "late_game")?
            // Scheduler defaults
            .set_default("scheduler.poll_interval_secs", 60)?
            .set_default("scheduler.max_concurrency", 8)?
            .set_default("scheduler.reap_interval_secs", 30)?
            // Lifecycle defaults
            .set_default("lifecycle.inactivity_timeout_mins", 20)?
            .set_default("lifecycle.max_duration_mins", 130)?
            .set_default("lifecycle.final_minute", 100)?
            // Persistence defaults
            .set_default("persistence.data_dir", "./data")?
            .set_default("persistence.csv_enabled", true)?
            .set_default("persistence.log_suppressed", false)?
            // Logging defaults
            .set_default("logging.json", false)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (CORNERBOT_*)
            .add_source(Environment::with_prefix("CORNERBOT").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        app_config.validate()?;
        Ok(app_config)
    }

    /// Reject values the scheduler cannot run with, and the active profile if invalid
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.max_concurrency == 0 {
            return Err(EngineError::invalid_config("scheduler.max_concurrency must be positive").into());
        }
        if self.scheduler.poll_interval_secs == 0 || self.scheduler.reap_interval_secs == 0 {
            return Err(EngineError::invalid_config("scheduler intervals must be positive").into());
        }
        if self.lifecycle.inactivity_timeout_mins <= 0 || self.lifecycle.max_duration_mins <= 0 {
            return Err(EngineError::invalid_config("lifecycle durations must be positive").into());
        }
        self.active_profile()?;
        Ok(())
    }

    /// Resolve a profile by name. The map key wins over any `name` inside it.
    pub fn profile(&self, name: &str) -> std::result::Result<ProfileConfig, EngineError> {
        let mut profile = self
            .engine
            .profiles
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::UnknownProfile(name.to_string()))?;
        profile.name = name.to_string();
        profile.validate()?;
        Ok(profile)
    }

    /// The profile selected by `engine.profile`, validated
    pub fn active_profile(&self) -> std::result::Result<ProfileConfig, EngineError> {
        self.profile(&self.engine.profile)
    }

    /// Generate a digest of the config for logging
    pub fn digest(&self) -> String {
        let mut profiles: Vec<&str> = self.engine.profiles.keys().map(String::as_str).collect();
        profiles.sort_unstable();
        format!(
            "profile={} profiles={:?} poll={}s concurrency={} csv={} replay={}",
            self.engine.profile,
            profiles,
            self.scheduler.poll_interval_secs,
            self.scheduler.max_concurrency,
            self.persistence.csv_enabled,
            self.feed
                .replay_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "-".to_string())
        )
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}
