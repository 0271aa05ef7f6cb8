use thiserror::Error;

use crate::types::FixtureId;

/// Errors surfaced by the engine.
///
/// Data-quality problems (missing stats, counter decreases, out-of-order
/// snapshots) are never errors; they are clamped or ignored and logged.
#[derive(Error, Debug)]
pub enum EngineError {
    // Configuration errors (fatal at startup)
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown alert profile: {0}")]
    UnknownProfile(String),

    // Feed errors (transient, scoped to one fixture)
    #[error("Feed failure for fixture {fixture_id}: {reason}")]
    Feed { fixture_id: FixtureId, reason: String },

    // Serialization errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        EngineError::InvalidConfig(msg.into())
    }

    pub fn feed(fixture_id: FixtureId, reason: impl Into<String>) -> Self {
        EngineError::Feed {
            fixture_id,
            reason: reason.into(),
        }
    }

    /// Transient errors skip one fixture for one cycle
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::Feed { .. } | EngineError::Io(_))
    }
}

/// Result type alias for EngineError
pub type Result<T> = std::result::Result<T, EngineError>;
