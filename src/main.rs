//! CornerBot - replays a recorded statistics feed through the alert engine

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cornerbot::config::{AppConfig, LoggingConfig, PersistenceConfig};
use cornerbot::feed::ReplaySource;
use cornerbot::persistence::AlertLog;
use cornerbot::session::Scheduler;
use cornerbot::strategy::{AlertDecision, AlertEngine};

fn init_tracing(logging: &LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cornerbot=info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    if logging.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn drain_decisions(
    mut rx: mpsc::Receiver<AlertDecision>,
    log: Option<AlertLog>,
    persistence: PersistenceConfig,
) {
    while let Some(decision) = rx.recv().await {
        if decision.fired {
            let probability = decision.total_probability().unwrap_or_default();
            info!(
                fixture_id = decision.fixture_id,
                team = %decision.team,
                minute = decision.minute,
                tier = ?decision.tier,
                probability,
                lines = ?decision.market_lines,
                "CORNER ALERT"
            );
        }
        if let Some(log) = log.as_ref().filter(|_| persistence.records(&decision)) {
            if let Err(e) = log.save_decision(&decision).await {
                warn!(error = %e, "Failed to persist alert decision");
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    init_tracing(&config.logging);
    info!(config = %config, "CornerBot v{}", env!("CARGO_PKG_VERSION"));

    let profile = config.active_profile()?;
    let engine = AlertEngine::new(profile)?;

    let replay_path = config
        .feed
        .replay_path
        .clone()
        .context("feed.replay_path must be set (CORNERBOT__FEED__REPLAY_PATH)")?;
    let source = Arc::new(ReplaySource::from_path(&replay_path).await?);

    let log = if config.persistence.csv_enabled {
        Some(AlertLog::new(&config.persistence.data_dir)?)
    } else {
        None
    };

    let (tx, rx) = mpsc::channel(256);
    let sink = tokio::spawn(drain_decisions(rx, log, config.persistence.clone()));

    let scheduler = Arc::new(Scheduler::new(
        source.clone(),
        engine,
        config.scheduler.clone(),
        config.lifecycle,
        tx,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let runner = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move { scheduler.run(shutdown_rx).await })
    };

    let poll = Duration::from_secs(config.scheduler.poll_interval_secs.max(1));
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                error!(error = %e, "Failed to listen for ctrl-c");
            }
            info!("Shutdown requested");
        }
        _ = async {
            while !source.is_exhausted() {
                tokio::time::sleep(poll).await;
            }
        } => {
            info!("Replay exhausted");
        }
    }

    let _ = shutdown_tx.send(true);
    runner.await.context("Scheduler task panicked")?;
    // Last sender goes with the scheduler
    drop(scheduler);
    sink.await.context("Decision sink panicked")?;

    info!("CornerBot stopped");
    Ok(())
}
