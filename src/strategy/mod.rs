//! Strategy - from scored features to alert decisions
//!
//! - Aggregator: momentum + patterns into a bounded corner probability
//! - Alert gate: timing, market, thresholds, de-duplication
//! - Engine: a loaded profile wiring the two together

pub mod aggregator;
pub mod alert_gate;
pub mod engine;

pub use aggregator::{MatchProbability, ProbabilityAggregator, ProbabilityResult, TeamProbabilities};
pub use alert_gate::{
    AlertDecision, AlertGate, AlertIdentity, GateState, SuppressReason, Tier, TierBand, TierTable,
};
pub use engine::AlertEngine;
