//! Replay source
//!
//! Serves recorded fixture updates from a JSON-lines file. Each `fetch`
//! hands out the next update of that fixture in file order, so one polling
//! cycle advances every live fixture by one record.

use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

use super::SnapshotSource;
use crate::error::{EngineError, Result};
use crate::types::{FixtureId, FixtureUpdate};

pub struct ReplaySource {
    queues: Mutex<BTreeMap<FixtureId, VecDeque<FixtureUpdate>>>,
}

impl ReplaySource {
    pub fn new(updates: impl IntoIterator<Item = FixtureUpdate>) -> Self {
        let mut queues: BTreeMap<FixtureId, VecDeque<FixtureUpdate>> = BTreeMap::new();
        for update in updates {
            queues
                .entry(update.snapshot.fixture_id)
                .or_default()
                .push_back(update);
        }
        Self {
            queues: Mutex::new(queues),
        }
    }

    /// Parse JSON lines. Blank lines and `#` comments are skipped.
    pub fn from_jsonl(text: &str) -> Result<Self> {
        let mut updates = Vec::new();
        for (line_no, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let update: FixtureUpdate = serde_json::from_str(line).map_err(|e| {
                EngineError::invalid_config(format!("replay line {}: {}", line_no + 1, e))
            })?;
            updates.push(update);
        }
        Ok(Self::new(updates))
    }

    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path).await?;
        let source = Self::from_jsonl(&text)?;
        info!(
            path = %path.display(),
            fixtures = source.remaining_fixtures(),
            "Replay loaded"
        );
        Ok(source)
    }

    /// Fixtures with updates left
    pub fn remaining_fixtures(&self) -> usize {
        self.queues
            .lock()
            .map(|q| q.values().filter(|u| !u.is_empty()).count())
            .unwrap_or(0)
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining_fixtures() == 0
    }
}

#[async_trait]
impl SnapshotSource for ReplaySource {
    fn name(&self) -> &'static str {
        "replay"
    }

    async fn live_fixtures(&self) -> Result<Vec<FixtureId>> {
        let queues = self
            .queues
            .lock()
            .map_err(|_| EngineError::invalid_config("replay queue poisoned"))?;
        Ok(queues
            .iter()
            .filter(|(_, updates)| !updates.is_empty())
            .map(|(id, _)| *id)
            .collect())
    }

    async fn fetch(&self, fixture_id: FixtureId) -> Result<FixtureUpdate> {
        let mut queues = self
            .queues
            .lock()
            .map_err(|_| EngineError::feed(fixture_id, "replay queue poisoned"))?;
        let update = queues
            .get_mut(&fixture_id)
            .and_then(VecDeque::pop_front)
            .ok_or_else(|| EngineError::feed(fixture_id, "replay exhausted"))?;
        debug!(fixture_id, minute = update.snapshot.minute, "Replayed update");
        Ok(update)
    }
}
