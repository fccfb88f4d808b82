use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex as AsyncMutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tonefield_plugin_api::{OutputTargets, PluginConfigStore};
use tracing::{debug, info, warn};

use crate::error::LifecycleError;
use crate::frame_data::VisualizerFrameData;
use crate::lifecycle::LifecycleManager;
use crate::registry::PluginRegistry;
use crate::snapshot::EngineHandles;
use crate::transaction::TransactionDeps;
use crate::transport::TransportLoop;
use crate::types::{
    EngineConfig, EngineEvent, EngineStatus, PluginSelection, StopOptions, TransportConfig,
    TransportStatus,
};

/// Collaborators owned by the caller and shared with every transaction.
#[derive(Debug, Clone)]
pub struct EngineDeps {
    pub registry: Arc<PluginRegistry>,
    pub configs: Arc<PluginConfigStore>,
    pub outputs: OutputTargets,
}

/// Composition root: a lifecycle manager plus a transport loop kept in step
/// with whatever handles the manager commits.
pub struct Engine {
    config: EngineConfig,
    manager: LifecycleManager,
    transport: Arc<AsyncMutex<TransportLoop>>,
    frame: Arc<VisualizerFrameData>,
    transport_status: watch::Receiver<TransportStatus>,
    presence: watch::Receiver<bool>,
    shutdown: CancellationToken,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    pub fn start(deps: EngineDeps, config: EngineConfig) -> Self {
        let canvas_size = config.canvas_size.or_else(|| deps.outputs.main_size());
        let manager = LifecycleManager::new(
            TransactionDeps {
                registry: deps.registry,
                configs: deps.configs,
                outputs: deps.outputs,
            },
            &config,
        );
        let frame = VisualizerFrameData::new();
        let transport = TransportLoop::new(TransportConfig { canvas_size }, Arc::clone(&frame));
        let transport_status = transport.subscribe_status();
        let presence = transport.subscribe_presence();
        let transport = Arc::new(AsyncMutex::new(transport));

        let shutdown = CancellationToken::new();
        let supervisor = tonefield_runtime::spawn_named(
            "engine-supervisor",
            supervise(
                manager.subscribe(),
                manager.clone(),
                Arc::clone(&transport),
                config.flush_on_swap,
                shutdown.clone(),
            ),
        );
        info!(?canvas_size, "engine started");

        Self {
            config,
            manager,
            transport,
            frame,
            transport_status,
            presence,
            shutdown,
            supervisor: Mutex::new(Some(supervisor)),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn request(&self, selection: PluginSelection) -> Result<(), LifecycleError> {
        self.manager.request(selection)
    }

    pub fn follow_selection(&self, source: watch::Receiver<PluginSelection>) -> JoinHandle<()> {
        self.manager.follow_selection(source)
    }

    pub fn handles(&self) -> Option<EngineHandles> {
        self.manager.handles()
    }

    pub fn status(&self) -> EngineStatus {
        self.manager.status()
    }

    pub fn transport_status(&self) -> TransportStatus {
        self.transport_status.borrow().clone()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<EngineEvent> {
        self.manager.subscribe()
    }

    pub fn subscribe_transport_status(&self) -> watch::Receiver<TransportStatus> {
        self.transport_status.clone()
    }

    pub fn subscribe_presence(&self) -> watch::Receiver<bool> {
        self.presence.clone()
    }

    pub fn frame_data(&self) -> &Arc<VisualizerFrameData> {
        &self.frame
    }

    pub fn manager(&self) -> &LifecycleManager {
        &self.manager
    }

    pub async fn wait_idle(&self) {
        self.manager.wait_idle().await;
    }

    /// Stops the supervisor and the transport loop, then disposes every
    /// committed handle. Safe to call more than once.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let supervisor = self.supervisor.lock().take();
        if let Some(supervisor) = supervisor {
            if let Err(err) = supervisor.await {
                warn!(error = %err, "engine supervisor ended abnormally");
            }
        }
        self.transport
            .lock()
            .await
            .stop(StopOptions {
                flush: self.config.flush_on_shutdown,
            })
            .await;
        self.manager.dispose().await;
        info!("engine shut down");
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn supervise(
    mut events: broadcast::Receiver<EngineEvent>,
    manager: LifecycleManager,
    transport: Arc<AsyncMutex<TransportLoop>>,
    flush: bool,
    shutdown: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            event = events.recv() => event,
        };
        match event {
            Ok(EngineEvent::HandlesChanged { .. } | EngineEvent::HandlesCleared) => {},
            Ok(EngineEvent::StatusChanged(_)) => continue,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "engine supervisor lagged behind events, resyncing transport");
            },
            Err(RecvError::Closed) => break,
        }

        let handles = manager.handles();
        debug!(?handles, "syncing transport loop with committed handles");
        if let Err(err) = transport.lock().await.sync_handles(handles, flush).await {
            warn!(error = %err, "failed to restart transport loop");
        }
    }
}
