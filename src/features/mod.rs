//! Feature Engine - windowed match statistics and derived signals
//!
//! - Windowed stats tracker: bounded snapshot history and window deltas
//! - Momentum scorer: attack / territory / pressure indicators
//! - Pattern detector: weighted, data-driven tactical rules

pub mod momentum;
pub mod patterns;
pub mod window_tracker;

pub use momentum::{MomentumIndicators, MomentumScorer, TeamMomentum, WeightedMomentumScorer};
pub use patterns::{
    default_corner_patterns, Condition, MatchedPattern, Pattern, PatternDetector, PatternSet,
    RulePatternDetector,
};
pub use window_tracker::{
    DataQualityWarning, InsufficientData, TrackerUpdate, WindowedDelta, WindowedStatsTracker,
};
