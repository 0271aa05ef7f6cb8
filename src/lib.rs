//! CornerBot Library
//!
//! In-play corner opportunity engine: windowed match statistics, momentum
//! and pattern scoring, and gated, de-duplicated alerts.

pub mod config;
pub mod error;
pub mod features;
pub mod feed;
pub mod persistence;
pub mod session;
pub mod strategy;
pub mod types;

pub use error::{EngineError, Result};
