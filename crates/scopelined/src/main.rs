//! Scopeline Daemon - telemetry conditioning service
//!
//! Subscribes to every frame of an experiment on the relay, merges them into
//! one state vector at a fixed rate, and publishes that vector to stream
//! clients:
//! - one length-delimited welcome frame: `{"mapping": {uuid: index}, "sample_rate_msec": N}`
//! - then per tick: f64 timestamp, u64 count, count × f32 (little endian)
//!
//! Config file locations:
//! - Linux: ~/.config/scopeline/scopelined.json
//! - Windows: %APPDATA%\scopeline\scopelined.json
//! - MacOS: ~/Library/Application Support/scopeline/scopelined.json

use scopeline::capture::DelayedBlock;
use scopeline::charts::ChartSet;
use scopeline::experiment::ExperimentDefinition;
use scopeline::sample::StateSnapshot;
use scopeline::session::{Session, SessionConfig};
use scopeline::transport::TcpSource;
use scopeline::wire::Welcome;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod error;
mod paths;
mod publish;

use config::DaemonConfig;
use error::DaemonError;
use paths::AppPaths;

/// Keeps the chart views current so alert latches are logged as they trip.
async fn monitor_charts(
    mut charts: ChartSet,
    period: Duration,
    mut states: broadcast::Receiver<Arc<StateSnapshot>>,
    mut blocks: broadcast::Receiver<Arc<DelayedBlock>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            state = states.recv() => match state {
                Ok(state) => {
                    if let Err(e) = charts.ingest_state(&state, period) {
                        error!("Chart update failed: {}", e);
                        break;
                    }
                }
                Err(RecvError::Lagged(n)) => warn!("Chart monitor skipped {} state(s)", n),
                Err(RecvError::Closed) => break,
            },
            block = blocks.recv() => match block {
                Ok(block) => charts.ingest_block(&block),
                Err(RecvError::Lagged(n)) => warn!("Chart monitor skipped {} block(s)", n),
                Err(RecvError::Closed) => break,
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let paths = AppPaths::new()?;
    let mut cfg = DaemonConfig::load(&paths.config_file())?;
    cfg.apply_env();
    cfg.apply_args(std::env::args().skip(1));
    info!(
        "Config: relay {}, listen {}, {} Hz, {}s history",
        cfg.relay,
        cfg.listen,
        cfg.rate_hz(),
        cfg.history_secs
    );

    let experiment = cfg.experiment.clone().ok_or(DaemonError::NoExperiment)?;
    let definition = ExperimentDefinition::from_path(&experiment).map_err(DaemonError::from)?;
    let catalog = Arc::new(definition.catalog().map_err(DaemonError::from)?);
    info!(
        "Loaded {:?}: {} variable(s) in {} frame(s), {} plot(s)",
        experiment,
        catalog.num_vars(),
        catalog.frames().len(),
        definition.plots.len()
    );

    let period = cfg.tick_period();
    let charts = ChartSet::from_plots(
        &catalog,
        &definition.plots,
        cfg.history()?,
        period,
        cfg.block_samples,
    )
    .map_err(DaemonError::from)?;

    // One subscription per frame
    let mut sources = Vec::with_capacity(catalog.frames().len());
    for (id, frame) in catalog.frames().iter().enumerate() {
        let source = TcpSource::connect(cfg.relay.as_str(), vec![frame.topic.clone()])
            .await
            .map_err(|source| DaemonError::Relay {
                addr: cfg.relay.clone(),
                source,
            })?;
        info!("Subscribed to {} on {}", frame.topic, cfg.relay);
        sources.push((id, source));
    }

    let session = Session::start(
        Arc::clone(&catalog),
        SessionConfig {
            tick_period: period,
            time_source: cfg.time_source(),
            silence_threshold: cfg.silence_threshold()?,
            block_samples: cfg.block_samples,
            capture_frames: charts.scope_frames(),
            ..Default::default()
        },
        sources,
    )
    .map_err(DaemonError::from)?;

    let welcome = Welcome::new(&catalog, cfg.tick_period_ms()).to_json()?;
    let listener = TcpListener::bind(cfg.listen.as_str()).await?;
    info!("Scopeline daemon publishing on {}", cfg.listen);

    let publisher = tokio::spawn(publish::serve(
        listener,
        Arc::new(welcome),
        session.subscribe_states(),
        session.cancellation(),
    ));
    let monitor = tokio::spawn(monitor_charts(
        charts,
        period,
        session.subscribe_states(),
        session.subscribe_blocks(),
        session.cancellation(),
    ));

    tokio::signal::ctrl_c().await?;
    info!("Ctrl-C: shutting down");

    session.shutdown().await;
    for task in [publisher, monitor] {
        if let Err(e) = task.await {
            error!("Task failed during shutdown: {}", e);
        }
    }
    Ok(())
}
