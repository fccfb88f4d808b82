use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;

use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tonefield_plugin_api::PluginSlot;
use tracing::{debug, error, info, warn};

use crate::error::{LifecycleError, TransactionError, panic_message};
use crate::event_hub::EventHub;
use crate::snapshot::{CommittedPipeline, EngineHandles, EngineSnapshot};
use crate::transaction::{TransactionDeps, run_engine_init_transaction};
use crate::types::{ActivePluginIds, EngineConfig, EngineEvent, EngineStatus, PluginSelection};

struct InFlight {
    ids: ActivePluginIds,
    cancel: CancellationToken,
}

#[derive(Default)]
struct ManagerState {
    snapshot: EngineSnapshot,
    status: EngineStatus,
    /// Latest requested selection not yet picked up by the drain loop.
    pending: Option<PluginSelection>,
    in_flight: Option<InFlight>,
    drain: Option<JoinHandle<()>>,
    disposed: bool,
}

struct ManagerShared {
    deps: TransactionDeps,
    events: EventHub,
    state: Mutex<ManagerState>,
    idle_tx: watch::Sender<bool>,
}

/// Owns the committed pipeline and serializes reconfiguration requests.
///
/// At most one transaction runs at a time. A request that arrives while one
/// is in flight replaces any pending request and cancels the in-flight
/// attempt unless it targets the same plugin ids.
#[derive(Clone)]
pub struct LifecycleManager {
    shared: Arc<ManagerShared>,
}

impl LifecycleManager {
    pub fn new(deps: TransactionDeps, config: &EngineConfig) -> Self {
        let (idle_tx, _idle_rx) = watch::channel(true);
        Self {
            shared: Arc::new(ManagerShared {
                deps,
                events: EventHub::new(config.event_capacity),
                state: Mutex::new(ManagerState::default()),
                idle_tx,
            }),
        }
    }

    pub fn request(&self, selection: PluginSelection) -> Result<(), LifecycleError> {
        let mut state = self.shared.state.lock();
        if state.disposed {
            return Err(LifecycleError::Disposed);
        }
        let ids = ActivePluginIds::from(&selection);
        if let Some(in_flight) = state.in_flight.as_ref() {
            if in_flight.ids != ids && !in_flight.cancel.is_cancelled() {
                debug!(?ids, "superseding in-flight transaction");
                in_flight.cancel.cancel();
            }
        }
        if let Some(previous) = state.pending.replace(selection) {
            debug!(?previous, "dropped pending selection in favour of a newer one");
        }
        self.shared.set_status(&mut state, EngineStatus::Initializing);
        if state.drain.is_none() {
            self.shared.idle_tx.send_replace(false);
            let shared = Arc::clone(&self.shared);
            state.drain = Some(tonefield_runtime::spawn_named(
                "selection-drain",
                drain_pending(shared),
            ));
        }
        Ok(())
    }

    /// Requests every value published by `source`, starting with the current one.
    pub fn follow_selection(&self, mut source: watch::Receiver<PluginSelection>) -> JoinHandle<()> {
        let manager = self.clone();
        tonefield_runtime::spawn_named("selection-follower", async move {
            loop {
                let selection = source.borrow_and_update().clone();
                if manager.request(selection).is_err() {
                    break;
                }
                if source.changed().await.is_err() {
                    break;
                }
            }
        })
    }

    pub fn handles(&self) -> Option<EngineHandles> {
        self.shared.state.lock().snapshot.handles().cloned()
    }

    pub fn active_ids(&self) -> Option<ActivePluginIds> {
        self.shared.state.lock().snapshot.ids().cloned()
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        self.shared.state.lock().snapshot.clone()
    }

    pub fn status(&self) -> EngineStatus {
        self.shared.state.lock().status.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.shared.events.subscribe()
    }

    /// Resolves once no request is pending and no transaction is running.
    pub async fn wait_idle(&self) {
        let mut idle_rx = self.shared.idle_tx.subscribe();
        let _ = idle_rx.wait_for(|idle| *idle).await;
    }

    /// Cancels outstanding work, waits for it to unwind, then disposes the
    /// committed handles. Later requests fail with [`LifecycleError::Disposed`].
    pub async fn dispose(&self) {
        let drain = {
            let mut state = self.shared.state.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.pending = None;
            if let Some(in_flight) = state.in_flight.as_ref() {
                in_flight.cancel.cancel();
            }
            state.drain.take()
        };
        if let Some(drain) = drain {
            if let Err(err) = drain.await {
                warn!(error = %err, "drain loop ended abnormally");
            }
        }

        let committed = {
            let mut state = self.shared.state.lock();
            state.status = EngineStatus::Idle;
            state.snapshot.take()
        };
        if let Some(pipeline) = committed {
            pipeline.handles.dispose_all();
            info!(ids = ?pipeline.ids, "disposed committed pipeline");
            self.shared.events.emit(EngineEvent::HandlesCleared);
        }
        self.shared
            .events
            .emit(EngineEvent::StatusChanged(EngineStatus::Idle));
        self.shared.idle_tx.send_replace(true);
    }
}

impl ManagerShared {
    fn set_status(&self, state: &mut ManagerState, next: EngineStatus) {
        if matches!(
            (&state.status, &next),
            (EngineStatus::Initializing, EngineStatus::Initializing)
                | (EngineStatus::Ready, EngineStatus::Ready)
        ) {
            return;
        }
        state.status = next.clone();
        self.events.emit(EngineEvent::StatusChanged(next));
    }

    /// Commits or discards one transaction result.
    fn finish(
        &self,
        cancel: &CancellationToken,
        result: Result<CommittedPipeline, TransactionError>,
    ) {
        let mut state = self.state.lock();
        state.in_flight = None;

        if cancel.is_cancelled() || state.disposed {
            let current = state.snapshot.handles().cloned();
            drop(state);
            if let Ok(candidate) = result {
                // Finished past its last checkpoint; release what it created.
                let released = match current {
                    Some(current) => candidate.handles.dispose_replaced(&current),
                    None => {
                        candidate.handles.dispose_all();
                        PluginSlot::ALL.to_vec()
                    },
                };
                debug!(?released, "discarded superseded transaction result");
            } else {
                debug!("superseded transaction unwound");
            }
            return;
        }

        match result {
            Ok(next) => {
                let previous = state.snapshot.replace(next.clone());
                let changed = previous
                    .as_ref()
                    .is_none_or(|previous| !previous.handles.same_as(&next.handles));
                if state.pending.is_none() {
                    self.set_status(&mut state, EngineStatus::Ready);
                }
                if changed {
                    self.events.emit(EngineEvent::HandlesChanged {
                        ids: next.ids.clone(),
                        handles: next.handles.clone(),
                    });
                }
                drop(state);

                let replaced = previous
                    .map(|previous| previous.handles.dispose_replaced(&next.handles))
                    .unwrap_or_default();
                if changed {
                    info!(ids = ?next.ids, ?replaced, "committed plugin selection");
                }
            },
            Err(err) => {
                error!(error = %err, "plugin selection failed, keeping previous pipeline");
                self.set_status(&mut state, EngineStatus::Error(err));
            },
        }
    }
}

async fn drain_pending(shared: Arc<ManagerShared>) {
    loop {
        let (selection, cancel, previous) = {
            let mut state = shared.state.lock();
            let Some(selection) = state.pending.take() else {
                state.drain = None;
                shared.idle_tx.send_replace(true);
                return;
            };
            let cancel = CancellationToken::new();
            state.in_flight = Some(InFlight {
                ids: ActivePluginIds::from(&selection),
                cancel: cancel.clone(),
            });
            (selection, cancel, state.snapshot.clone())
        };

        debug!(?selection, "running plugin selection transaction");
        // Handles created before a panic are dropped with the future, which
        // disposes them.
        let result = AssertUnwindSafe(run_engine_init_transaction(
            &selection,
            &cancel,
            &shared.deps,
            &previous,
        ))
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| Err(TransactionError::Panicked(panic_message(payload))));
        shared.finish(&cancel, result);
    }
}
