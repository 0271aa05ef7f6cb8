//! Snapshot sources (live statistics provider, recorded replays)

mod replay;

pub use replay::ReplaySource;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{FixtureId, FixtureUpdate};

/// Trait for match statistics providers
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Get the source name
    fn name(&self) -> &'static str;

    /// Fixtures currently in play
    async fn live_fixtures(&self) -> Result<Vec<FixtureId>>;

    /// Latest statistics and market state of one fixture
    async fn fetch(&self, fixture_id: FixtureId) -> Result<FixtureUpdate>;
}
