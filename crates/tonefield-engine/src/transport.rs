//! Continuous detect → map → sample → sonify loop over a committed handle triple.

mod mapping;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::{FutureExt, StreamExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tonefield_plugin_api::{PointBatch, SampleMap};
use tracing::{debug, error, info, warn};

use crate::error::{TransportError, panic_message};
use crate::frame_data::VisualizerFrameData;
use crate::snapshot::EngineHandles;
use crate::types::{StopOptions, TransportConfig, TransportStatus};

use self::mapping::map_points;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunExit {
    Cancelled,
    Finished,
    Failed,
}

struct ActiveRun {
    handles: EngineHandles,
    cancel: CancellationToken,
    task: JoinHandle<RunExit>,
}

struct TransportShared {
    config: TransportConfig,
    frame: Arc<VisualizerFrameData>,
    status_tx: watch::Sender<TransportStatus>,
    presence_tx: watch::Sender<bool>,
}

impl TransportShared {
    fn set_status(&self, status: TransportStatus) {
        self.status_tx.send_replace(status);
    }

    fn set_presence(&self, present: bool) {
        self.presence_tx.send_if_modified(|current| {
            if *current == present {
                return false;
            }
            *current = present;
            true
        });
    }

    fn fail(&self, err: TransportError) -> RunExit {
        error!(error = %err, "transport loop stopped on pipeline failure");
        self.set_status(TransportStatus::Error(err));
        RunExit::Failed
    }
}

/// Drives one handle triple at a time.
///
/// The loop never restarts itself when handles change. The owner calls
/// [`TransportLoop::sync_handles`] (or `stop` then `start`) with the new triple.
pub struct TransportLoop {
    shared: Arc<TransportShared>,
    active: Option<ActiveRun>,
}

impl TransportLoop {
    pub fn new(config: TransportConfig, frame: Arc<VisualizerFrameData>) -> Self {
        let (status_tx, _) = watch::channel(TransportStatus::Stopped);
        let (presence_tx, _) = watch::channel(false);
        Self {
            shared: Arc::new(TransportShared {
                config,
                frame,
                status_tx,
                presence_tx,
            }),
            active: None,
        }
    }

    pub fn frame_data(&self) -> &Arc<VisualizerFrameData> {
        &self.shared.frame
    }

    pub fn status(&self) -> TransportStatus {
        self.shared.status_tx.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<TransportStatus> {
        self.shared.status_tx.subscribe()
    }

    /// Whether the latest batch contained any point. Only changes are published.
    pub fn subscribe_presence(&self) -> watch::Receiver<bool> {
        self.shared.presence_tx.subscribe()
    }

    /// Handles of the current run, including one that already ended on its own.
    pub fn handles(&self) -> Option<&EngineHandles> {
        self.active.as_ref().map(|run| &run.handles)
    }

    pub fn is_running_against(&self, handles: &EngineHandles) -> bool {
        self.active
            .as_ref()
            .is_some_and(|run| run.handles.same_as(handles))
    }

    /// Starts iterating `handles`. A run that already ended (stream end or
    /// failure) is replaced; a live one must be stopped first.
    pub fn start(&mut self, handles: EngineHandles) -> Result<(), TransportError> {
        if let Some(run) = self.active.as_ref() {
            if !run.task.is_finished() {
                return Err(TransportError::AlreadyRunning);
            }
        }
        self.active = None;

        let cancel = CancellationToken::new();
        let task = tonefield_runtime::spawn_named(
            "transport-run",
            run_transport(handles.clone(), cancel.clone(), Arc::clone(&self.shared)),
        );
        info!(?handles, "transport loop started");
        self.active = Some(ActiveRun {
            handles,
            cancel,
            task,
        });
        Ok(())
    }

    /// Cancels the current run and waits for it to exit. No-op when idle.
    pub async fn stop(&mut self, options: StopOptions) {
        let Some(run) = self.active.take() else {
            return;
        };
        run.cancel.cancel();
        let exit = match run.task.await {
            Ok(exit) => exit,
            Err(err) => self
                .shared
                .fail(TransportError::Aborted(err.to_string())),
        };
        if options.flush {
            flush(&run.handles, &self.shared).await;
        }
        if exit != RunExit::Failed {
            self.shared.set_status(TransportStatus::Stopped);
        }
        info!(flushed = options.flush, ?exit, "transport loop stopped");
    }

    /// Makes the loop run against `handles`: nothing happens when it already
    /// does, otherwise the current run is stopped and a new one started.
    /// `None` only stops.
    pub async fn sync_handles(
        &mut self,
        handles: Option<EngineHandles>,
        flush: bool,
    ) -> Result<(), TransportError> {
        match handles {
            Some(handles) if self.is_running_against(&handles) => Ok(()),
            Some(handles) => {
                self.stop(StopOptions { flush }).await;
                self.start(handles)
            },
            None => {
                self.stop(StopOptions { flush }).await;
                Ok(())
            },
        }
    }
}

impl Drop for TransportLoop {
    fn drop(&mut self) {
        if let Some(run) = self.active.as_ref() {
            run.cancel.cancel();
        }
    }
}

async fn run_transport(
    handles: EngineHandles,
    cancel: CancellationToken,
    shared: Arc<TransportShared>,
) -> RunExit {
    let exit = match AssertUnwindSafe(drive(&handles, &cancel, &shared))
        .catch_unwind()
        .await
    {
        Ok(exit) => exit,
        Err(payload) => shared.fail(TransportError::Aborted(panic_message(payload))),
    };
    if exit != RunExit::Failed {
        shared.set_status(TransportStatus::Stopped);
    }
    exit
}

async fn drive(
    handles: &EngineHandles,
    cancel: &CancellationToken,
    shared: &TransportShared,
) -> RunExit {
    shared
        .frame
        .publish_analyser(handles.sonifier.analyser_tap());
    let mut points = handles.detector.points(cancel.clone());
    shared.set_status(TransportStatus::Running);

    loop {
        let next = tokio::select! {
            biased;
            next = points.next() => next,
            _ = cancel.cancelled() => return RunExit::Cancelled,
        };
        let batch = match next {
            Some(Ok(batch)) => batch,
            Some(Err(err)) if err.is_cancelled() => return RunExit::Cancelled,
            Some(Err(err)) => return shared.fail(TransportError::Detection(err)),
            None if cancel.is_cancelled() => return RunExit::Cancelled,
            None => {
                debug!("point sequence ended");
                return RunExit::Finished;
            },
        };
        // The lifecycle manager disposes replaced handles before the owner
        // gets to stop this run.
        if handles.any_disposed() {
            debug!("handles disposed under a running transport loop");
            return RunExit::Cancelled;
        }
        if let Err(err) = process_batch(handles, batch, shared).await {
            return shared.fail(err);
        }
        if cancel.is_cancelled() {
            return RunExit::Cancelled;
        }
    }
}

async fn process_batch(
    handles: &EngineHandles,
    batch: PointBatch,
    shared: &TransportShared,
) -> Result<(), TransportError> {
    let mapped = map_points(
        &batch,
        handles.detector.source_size(),
        handles.sampler.visible_rect(),
        shared.config.canvas_size,
    );
    shared.set_presence(!batch.is_empty());
    shared.frame.publish_points(batch);

    let samples = handles
        .sampler
        .sample(&mapped)
        .await
        .map_err(TransportError::Sampling)?;
    shared.frame.publish_samples(samples.clone());

    handles
        .sonifier
        .process_samples(&samples)
        .await
        .map_err(TransportError::Sonification)?;
    shared.frame.publish_tones(handles.sonifier.debug_tones());
    Ok(())
}

async fn flush(handles: &EngineHandles, shared: &TransportShared) {
    // A disposed sonifier has already released its output.
    if !handles.sonifier.is_disposed() {
        if let Err(err) = handles.sonifier.process_samples(&SampleMap::new()).await {
            warn!(error = %err, "sonifier flush failed");
        }
    }
    shared.frame.clear_transient();
    shared.set_presence(false);
}
