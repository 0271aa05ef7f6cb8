//! Session scheduler
//!
//! Polls the snapshot source on a fixed interval and fans each live fixture
//! out to a bounded pool of tasks. A failing fixture is skipped for the cycle
//! and never affects the others. A separate sweep closes expired sessions.

use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc::Sender, watch, Mutex, RwLock, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::{CloseReason, FixtureSession};
use crate::config::{LifecycleConfig, ProfileConfig, SchedulerConfig};
use crate::error::Result;
use crate::feed::SnapshotSource;
use crate::strategy::{AlertDecision, AlertEngine};
use crate::types::FixtureId;

type SessionMap = HashMap<FixtureId, Arc<Mutex<FixtureSession>>>;

/// Summary of one polling cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub fixtures: usize,
    pub updated: usize,
    pub skipped: usize,
    pub fired: usize,
    pub closed: usize,
}

enum TaskOutcome {
    Updated { fired: usize, closed: bool },
    Skipped,
}

pub struct Scheduler {
    source: Arc<dyn SnapshotSource>,
    engine: RwLock<Arc<AlertEngine>>,
    config: SchedulerConfig,
    lifecycle: LifecycleConfig,
    sessions: Arc<RwLock<SessionMap>>,
    permits: Arc<Semaphore>,
    sink: Sender<AlertDecision>,
}

impl Scheduler {
    pub fn new(
        source: Arc<dyn SnapshotSource>,
        engine: AlertEngine,
        config: SchedulerConfig,
        lifecycle: LifecycleConfig,
        sink: Sender<AlertDecision>,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
        Self {
            source,
            engine: RwLock::new(Arc::new(engine)),
            config,
            lifecycle,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            permits,
            sink,
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn active_fixtures(&self) -> Vec<FixtureId> {
        let mut ids: Vec<FixtureId> = self.sessions.read().await.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Name of the profile new sessions are created with
    pub async fn profile_name(&self) -> String {
        self.engine.read().await.profile().name.clone()
    }

    /// Swap the profile for sessions created from now on. Running sessions
    /// keep the profile they started with.
    pub async fn reload(&self, profile: ProfileConfig) -> Result<()> {
        let engine = AlertEngine::new(profile)?;
        let name = engine.profile().name.clone();
        *self.engine.write().await = Arc::new(engine);
        info!(profile = %name, "Profile reloaded for new sessions");
        Ok(())
    }

    /// One polling cycle: every live fixture processed at most once
    pub async fn run_cycle(&self) -> CycleReport {
        let mut report = CycleReport::default();

        let fixtures: BTreeSet<FixtureId> = match self.source.live_fixtures().await {
            Ok(ids) => ids.into_iter().collect(),
            Err(e) => {
                warn!(source = self.source.name(), error = %e, "Failed to list live fixtures");
                return report;
            }
        };
        report.fixtures = fixtures.len();

        let engine = Arc::clone(&*self.engine.read().await);
        let mut tasks = JoinSet::new();
        for fixture_id in fixtures {
            let source = Arc::clone(&self.source);
            let sessions = Arc::clone(&self.sessions);
            let permits = Arc::clone(&self.permits);
            let engine = Arc::clone(&engine);
            let sink = self.sink.clone();
            let lifecycle = self.lifecycle;

            tasks.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return TaskOutcome::Skipped;
                };
                process_fixture(fixture_id, source, sessions, engine, lifecycle, sink).await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(TaskOutcome::Updated { fired, closed }) => {
                    report.updated += 1;
                    report.fired += fired;
                    report.closed += usize::from(closed);
                }
                Ok(TaskOutcome::Skipped) => report.skipped += 1,
                Err(e) => {
                    warn!(error = %e, "Fixture task failed");
                    report.skipped += 1;
                }
            }
        }

        debug!(?report, "Cycle complete");
        report
    }

    /// Close and drop sessions past their inactivity or duration limit.
    /// Sessions busy with an update are left for the next sweep.
    pub async fn reap(&self, now: DateTime<Utc>) -> Vec<(FixtureId, CloseReason)> {
        let candidates: Vec<(FixtureId, Arc<Mutex<FixtureSession>>)> = self
            .sessions
            .read()
            .await
            .iter()
            .map(|(id, session)| (*id, Arc::clone(session)))
            .collect();

        let mut closed = Vec::new();
        for (fixture_id, session) in candidates {
            let reason = match session.try_lock() {
                Ok(mut guard) => guard.check_expiry(now),
                Err(_) => continue,
            };
            if let Some(reason) = reason {
                closed.push((fixture_id, reason, session));
            }
        }

        let mut expired = Vec::with_capacity(closed.len());
        if !closed.is_empty() {
            let mut sessions = self.sessions.write().await;
            for (fixture_id, reason, session) in closed {
                remove_if_current(&mut sessions, fixture_id, &session);
                expired.push((fixture_id, reason));
            }
            info!(expired = expired.len(), remaining = sessions.len(), "Reaped sessions");
        }
        expired
    }

    /// Poll and reap until `shutdown` flips to true
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut poll = tokio::time::interval(Duration::from_secs(self.config.poll_interval_secs.max(1)));
        let mut sweep = tokio::time::interval(Duration::from_secs(self.config.reap_interval_secs.max(1)));
        info!(
            source = self.source.name(),
            poll_secs = self.config.poll_interval_secs,
            max_concurrency = self.config.max_concurrency,
            "Scheduler started"
        );

        loop {
            tokio::select! {
                _ = poll.tick() => {
                    let report = self.run_cycle().await;
                    if report.fixtures > 0 {
                        info!(
                            fixtures = report.fixtures,
                            updated = report.updated,
                            skipped = report.skipped,
                            fired = report.fired,
                            closed = report.closed,
                            "Poll cycle"
                        );
                    }
                }
                _ = sweep.tick() => {
                    self.reap(Utc::now()).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        let sessions = self.session_count().await;
        info!(sessions, "Scheduler stopped");
    }
}

/// Drop `session` from the registry unless the id already maps to a newer one
fn remove_if_current(
    sessions: &mut SessionMap,
    fixture_id: FixtureId,
    session: &Arc<Mutex<FixtureSession>>,
) -> bool {
    let current = sessions
        .get(&fixture_id)
        .map_or(false, |registered| Arc::ptr_eq(registered, session));
    if current {
        sessions.remove(&fixture_id);
    }
    current
}

fn open_session(
    fixture_id: FixtureId,
    engine: &Arc<AlertEngine>,
    lifecycle: LifecycleConfig,
) -> Arc<Mutex<FixtureSession>> {
    Arc::new(Mutex::new(FixtureSession::new(
        fixture_id,
        Arc::clone(engine),
        lifecycle,
        Utc::now(),
    )))
}

/// Registered session for `fixture_id`, opening a fresh one when none is
/// registered or the registered one closed without being removed yet.
async fn live_session(
    fixture_id: FixtureId,
    sessions: &RwLock<SessionMap>,
    engine: &Arc<AlertEngine>,
    lifecycle: LifecycleConfig,
) -> Arc<Mutex<FixtureSession>> {
    let registered = {
        let mut map = sessions.write().await;
        Arc::clone(
            map.entry(fixture_id)
                .or_insert_with(|| open_session(fixture_id, engine, lifecycle)),
        )
    };
    if !registered.lock().await.is_closed() {
        return registered;
    }

    let mut map = sessions.write().await;
    let slot = map
        .entry(fixture_id)
        .or_insert_with(|| open_session(fixture_id, engine, lifecycle));
    if Arc::ptr_eq(slot, &registered) {
        debug!(fixture_id, "Closed session replaced");
        *slot = open_session(fixture_id, engine, lifecycle);
    }
    Arc::clone(slot)
}

async fn process_fixture(
    fixture_id: FixtureId,
    source: Arc<dyn SnapshotSource>,
    sessions: Arc<RwLock<SessionMap>>,
    engine: Arc<AlertEngine>,
    lifecycle: LifecycleConfig,
    sink: Sender<AlertDecision>,
) -> TaskOutcome {
    let update = match source.fetch(fixture_id).await {
        Ok(update) => update,
        Err(e) => {
            warn!(fixture_id, transient = e.is_transient(), error = %e, "Fixture skipped this cycle");
            return TaskOutcome::Skipped;
        }
    };

    let session = live_session(fixture_id, &sessions, &engine, lifecycle).await;

    let (result, closed) = {
        let mut guard = session.lock().await;
        let result = guard.update(&update, Utc::now());
        (result, guard.is_closed())
    };

    let fired = result.fired().count();
    if let Some(combined) = result.match_probability {
        debug!(
            fixture_id,
            combined = combined.combined,
            best_team = %combined.best_team,
            "Match corner probability"
        );
    }
    for decision in result.decisions {
        if sink.send(decision).await.is_err() {
            warn!(fixture_id, "Decision sink closed");
            break;
        }
    }

    if closed {
        remove_if_current(&mut *sessions.write().await, fixture_id, &session);
    }

    TaskOutcome::Updated { fired, closed }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::feed::MockSnapshotSource;
    use crate::types::{FixtureUpdate, MarketAvailability, Snapshot};
    use chrono::TimeZone;
    use tokio::sync::mpsc;

    fn make_update(fixture_id: FixtureId, minute: u32) -> FixtureUpdate {
        let ts = Utc.with_ymd_and_hms(2026, 10, 16, 19, 0, 0).unwrap()
            + chrono::Duration::minutes(i64::from(minute));
        FixtureUpdate {
            snapshot: Snapshot::new(fixture_id, ts, minute),
            market: MarketAvailability::open(vec![]),
            finished: false,
        }
    }

    fn scheduler(source: MockSnapshotSource) -> (Scheduler, mpsc::Receiver<AlertDecision>) {
        let (tx, rx) = mpsc::channel(64);
        let engine = AlertEngine::new(ProfileConfig::late_game()).unwrap();
        let scheduler = Scheduler::new(
            Arc::new(source),
            engine,
            SchedulerConfig::default(),
            LifecycleConfig::default(),
            tx,
        );
        (scheduler, rx)
    }

    #[tokio::test]
    async fn failing_fixture_does_not_block_others() {
        let mut source = MockSnapshotSource::new();
        source.expect_name().return_const("mock");
        source
            .expect_live_fixtures()
            .returning(|| Ok(vec![1, 2, 3]));
        source.expect_fetch().returning(|id| {
            if id == 2 {
                Err(EngineError::feed(id, "timeout"))
            } else {
                Ok(make_update(id, 50))
            }
        });

        let (scheduler, _rx) = scheduler(source);
        let report = scheduler.run_cycle().await;

        assert_eq!(report.fixtures, 3);
        assert_eq!(report.updated, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(scheduler.active_fixtures().await, vec![1, 3]);
    }

    #[tokio::test]
    async fn duplicate_fixture_ids_are_processed_once() {
        let mut source = MockSnapshotSource::new();
        source.expect_name().return_const("mock");
        source.expect_live_fixtures().returning(|| Ok(vec![4, 4, 4]));
        source
            .expect_fetch()
            .times(1)
            .returning(|id| Ok(make_update(id, 50)));

        let (scheduler, _rx) = scheduler(source);
        let report = scheduler.run_cycle().await;
        assert_eq!(report.fixtures, 1);
        assert_eq!(report.updated, 1);
    }

    #[tokio::test]
    async fn finished_fixture_session_is_removed() {
        let mut source = MockSnapshotSource::new();
        source.expect_name().return_const("mock");
        source.expect_live_fixtures().returning(|| Ok(vec![7]));
        source.expect_fetch().returning(|id| {
            let mut update = make_update(id, 95);
            update.finished = true;
            Ok(update)
        });

        let (scheduler, mut rx) = scheduler(source);
        let report = scheduler.run_cycle().await;

        assert_eq!(report.closed, 1);
        assert_eq!(scheduler.session_count().await, 0);
        // Outside the timing window: both teams suppressed and emitted
        let first = rx.recv().await.unwrap();
        assert!(!first.fired);
        assert_eq!(first.reasons, vec!["timing".to_string()]);
    }

    #[tokio::test]
    async fn listing_failure_yields_empty_cycle() {
        let mut source = MockSnapshotSource::new();
        source.expect_name().return_const("mock");
        source
            .expect_live_fixtures()
            .returning(|| Err(EngineError::invalid_config("provider down")));
        source.expect_fetch().never();

        let (scheduler, _rx) = scheduler(source);
        assert_eq!(scheduler.run_cycle().await, CycleReport::default());
    }

    #[tokio::test]
    async fn reaper_closes_inactive_sessions() {
        let mut source = MockSnapshotSource::new();
        source.expect_name().return_const("mock");
        source.expect_live_fixtures().returning(|| Ok(vec![1]));
        source.expect_fetch().returning(|id| Ok(make_update(id, 40)));

        let (scheduler, _rx) = scheduler(source);
        scheduler.run_cycle().await;
        assert_eq!(scheduler.session_count().await, 1);

        assert!(scheduler.reap(Utc::now()).await.is_empty());
        let expired = scheduler.reap(Utc::now() + chrono::Duration::minutes(21)).await;
        assert_eq!(expired, vec![(1, CloseReason::Inactive)]);
        assert_eq!(scheduler.session_count().await, 0);
    }

    #[tokio::test]
    async fn closed_but_registered_session_is_replaced() {
        let mut source = MockSnapshotSource::new();
        source.expect_name().return_const("mock");
        source.expect_live_fixtures().returning(|| Ok(vec![1]));
        let mut minute = 40;
        source.expect_fetch().returning(move |id| {
            minute += 1;
            Ok(make_update(id, minute))
        });

        let (scheduler, _rx) = scheduler(source);
        scheduler.run_cycle().await;
        let first = Arc::clone(scheduler.sessions.read().await.get(&1).unwrap());
        // closed by the sweep, removal still pending
        first.lock().await.close(CloseReason::Inactive);

        let report = scheduler.run_cycle().await;
        assert_eq!(report.updated, 1);

        let sessions = scheduler.sessions.read().await;
        let fresh = sessions.get(&1).unwrap();
        assert!(!Arc::ptr_eq(fresh, &first));
        let fresh = fresh.lock().await;
        assert!(!fresh.is_closed());
        assert_eq!(fresh.updates(), 1);
        assert_eq!(fresh.last_minute(), Some(42));
    }

    #[test]
    fn stale_session_does_not_remove_its_replacement() {
        let engine = Arc::new(AlertEngine::new(ProfileConfig::late_game()).unwrap());
        let stale = open_session(1, &engine, LifecycleConfig::default());
        let fresh = open_session(1, &engine, LifecycleConfig::default());
        let mut sessions = SessionMap::new();
        sessions.insert(1, Arc::clone(&fresh));

        assert!(!remove_if_current(&mut sessions, 1, &stale));
        assert!(sessions.contains_key(&1));
        assert!(remove_if_current(&mut sessions, 1, &fresh));
        assert!(sessions.is_empty());
    }

    #[tokio::test]
    async fn reload_applies_to_new_sessions_only() {
        let mut source = MockSnapshotSource::new();
        source.expect_name().return_const("mock");
        source.expect_live_fixtures().returning(|| Ok(vec![1]));
        source.expect_fetch().returning(|id| Ok(make_update(id, 40)));

        let (scheduler, _rx) = scheduler(source);
        scheduler.run_cycle().await;
        scheduler.reload(ProfileConfig::first_half()).await.unwrap();

        assert_eq!(scheduler.profile_name().await, "first_half");
        let sessions = scheduler.sessions.read().await;
        let existing = sessions.get(&1).unwrap().lock().await;
        assert_eq!(existing.profile_name(), "late_game");
    }

    #[tokio::test]
    async fn invalid_reload_keeps_current_profile() {
        let mut source = MockSnapshotSource::new();
        source.expect_name().return_const("mock");
        let (scheduler, _rx) = scheduler(source);

        let mut broken = ProfileConfig::first_half();
        broken.windows.momentum_window_mins = 0;
        assert!(scheduler.reload(broken).await.is_err());
        assert_eq!(scheduler.profile_name().await, "late_game");
    }
}
