mod cli;
mod config;
mod demo;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tonefield_engine::{
    Engine, EngineDeps, EngineEvent, EngineStatus, PluginSelection, TransportStatus,
};
use tonefield_plugin_api::{MAIN_SURFACE, OutputSurface, OutputTargets, PluginConfigStore};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cli::Cli;
use config::{RunConfig, TimelineEntry};
use demo::ToneAnalyser;

/// Stand-in render target handed to plugins through the main surface.
#[derive(Debug)]
struct DemoCanvas;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut run = RunConfig::load(cli.config.as_deref())?;
    if let Some(duration_ms) = cli.duration_ms {
        run = run
            .with_duration_ms(duration_ms)
            .context("apply --duration-ms")?;
    }
    init_tracing(cli.log_filter.as_deref(), &run.log_filter);

    let registry = demo::registry().context("register demo plugins")?;
    let configs = PluginConfigStore::new();
    let outputs = OutputTargets::new().with_surface(
        MAIN_SURFACE,
        OutputSurface::new(run.surface, Arc::new(DemoCanvas)),
    );
    let engine = Engine::start(
        EngineDeps {
            registry: Arc::new(registry),
            configs: Arc::clone(&configs),
            outputs,
        },
        run.engine.clone(),
    );
    let event_log = spawn_event_log(engine.subscribe_events());
    let transport_log = spawn_transport_log(engine.subscribe_transport_status());

    let (first, rest) = run
        .timeline
        .split_first()
        .context("run config timeline is empty")?;
    apply_configs(&configs, first);
    let (selection_tx, selection_rx) = watch::channel(first.selection.clone());
    let follower = engine.follow_selection(selection_rx);
    info!(duration_ms = run.duration_ms, entries = run.timeline.len(), "run started");

    play_timeline(&run, rest, &engine, &configs, &selection_tx).await;

    drop(selection_tx);
    engine.shutdown().await;
    if let Err(err) = follower.await {
        warn!(error = %err, "selection follower ended abnormally");
    }
    event_log.abort();
    transport_log.abort();
    info!("run finished");
    Ok(())
}

fn init_tracing(flag: Option<&str>, configured: &str) {
    let filter = match flag {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(configured)),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

async fn play_timeline(
    run: &RunConfig,
    entries: &[TimelineEntry],
    engine: &Engine,
    configs: &Arc<PluginConfigStore>,
    selection_tx: &watch::Sender<PluginSelection>,
) {
    let started = Instant::now();
    let end = started + Duration::from_millis(run.duration_ms);
    let mut report = tokio::time::interval(Duration::from_millis(run.report_interval_ms));
    let mut pending = entries.iter().peekable();

    loop {
        let next_at = pending
            .peek()
            .map(|entry| started + Duration::from_millis(entry.at_ms));
        tokio::select! {
            _ = sleep_until(end) => break,
            _ = sleep_until(next_at.unwrap_or(end)), if next_at.is_some_and(|at| at < end) => {
                if let Some(entry) = pending.next() {
                    info!(at_ms = entry.at_ms, selection = ?entry.selection, "timeline step");
                    apply_configs(configs, entry);
                    selection_tx.send_replace(entry.selection.clone());
                }
            },
            _ = report.tick() => report_frame(engine),
        }
    }
}

fn apply_configs(configs: &PluginConfigStore, entry: &TimelineEntry) {
    for (plugin_id, value) in &entry.configs {
        configs.set(plugin_id, value.clone());
    }
}

fn report_frame(engine: &Engine) {
    let frame = engine.frame_data().snapshot();
    let levels = frame
        .analyser
        .as_ref()
        .and_then(|tap| tap.downcast_ref::<ToneAnalyser>())
        .map(ToneAnalyser::levels)
        .unwrap_or_default();
    let peak = levels.iter().copied().fold(0.0_f32, f32::max);
    info!(
        points = frame.points.len(),
        present = frame.has_points,
        samples = frame.samples.len(),
        tones = frame.tones.len(),
        peak_gain = peak,
        "frame"
    );
}

fn spawn_event_log(mut events: broadcast::Receiver<EngineEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(EngineEvent::StatusChanged(EngineStatus::Error(err))) => {
                    warn!(error = %err, "plugin selection failed");
                },
                Ok(EngineEvent::StatusChanged(status)) => info!(?status, "engine status"),
                Ok(EngineEvent::HandlesChanged { ids, .. }) => info!(
                    detection = %ids.detection,
                    sampling = %ids.sampling,
                    sonification = %ids.sonification,
                    "pipeline committed"
                ),
                Ok(EngineEvent::HandlesCleared) => info!("pipeline cleared"),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn spawn_transport_log(mut status: watch::Receiver<TransportStatus>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            match &*status.borrow_and_update() {
                TransportStatus::Error(err) => warn!(error = %err, "transport failed"),
                other => info!(status = ?other, "transport status"),
            }
        }
    })
}
