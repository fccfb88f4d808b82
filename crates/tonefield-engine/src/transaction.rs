use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tonefield_plugin_api::{
    DetectorHandle, OutputTargets, PluginCapability, PluginConfigStore, PluginError, PluginHandle,
    PluginSlot, SamplerHandle, SonifierHandle,
};
use tracing::{debug, warn};

use crate::error::{InitStage, TransactionError};
use crate::registry::PluginRegistry;
use crate::resolver::{ResolvedPlugin, ResolvedPlugins, resolve};
use crate::snapshot::{CommittedPipeline, EngineHandles, EngineSnapshot};
use crate::types::{ActivePluginIds, PluginSelection};

/// Collaborators a transaction reads from. Owned by the composition root.
#[derive(Debug, Clone)]
pub struct TransactionDeps {
    pub registry: Arc<PluginRegistry>,
    pub configs: Arc<PluginConfigStore>,
    pub outputs: OutputTargets,
}

/// Handles created by the running transaction; the only ones it may dispose.
#[derive(Default)]
struct CreatedHandles {
    detector: Option<DetectorHandle>,
    sampler: Option<SamplerHandle>,
    sonifier: Option<SonifierHandle>,
}

impl CreatedHandles {
    fn dispose_all(&mut self) -> usize {
        let mut disposed = 0;
        if let Some(handle) = self.detector.take() {
            disposed += usize::from(handle.dispose());
        }
        if let Some(handle) = self.sampler.take() {
            disposed += usize::from(handle.dispose());
        }
        if let Some(handle) = self.sonifier.take() {
            disposed += usize::from(handle.dispose());
        }
        disposed
    }
}

/// Attempts to move from `previous` to a pipeline matching `selection`.
///
/// Slots whose plugin id is unchanged keep their live handle and skip every
/// one-time initialization step. New handles are initialized in a fixed
/// order and, on any failure or cancellation, are the only handles disposed.
/// The returned pipeline is a candidate: committing it is the caller's job.
pub async fn run_engine_init_transaction(
    selection: &PluginSelection,
    cancel: &CancellationToken,
    deps: &TransactionDeps,
    previous: &EngineSnapshot,
) -> Result<CommittedPipeline, TransactionError> {
    let resolved = resolve(selection, &deps.registry, &deps.configs)?;
    ensure_active(cancel)?;

    let ids = resolved.ids();
    if let Some(pipeline) = previous.pipeline() {
        if pipeline.ids == ids {
            debug!(?ids, "selection already committed, reusing pipeline");
            return Ok(pipeline.clone());
        }
    }

    let mut created = CreatedHandles::default();
    let result = assemble(&resolved, ids, previous, cancel, deps, &mut created).await;
    if let Err(err) = &result {
        let disposed = created.dispose_all();
        if err.is_cancelled() {
            debug!(disposed, "transaction cancelled, unwound created handles");
        } else {
            warn!(error = %err, disposed, "transaction failed, unwound created handles");
        }
    }
    result
}

async fn assemble(
    resolved: &ResolvedPlugins,
    ids: ActivePluginIds,
    previous: &EngineSnapshot,
    cancel: &CancellationToken,
    deps: &TransactionDeps,
    created: &mut CreatedHandles,
) -> Result<CommittedPipeline, TransactionError> {
    let reusable = |slot: PluginSlot| match previous.pipeline() {
        Some(pipeline) if pipeline.ids.id_for(slot) == ids.id_for(slot) => {
            debug!(%slot, plugin_id = ids.id_for(slot), "reusing live handle");
            Some(&pipeline.handles)
        },
        _ => None,
    };

    let detector = match reusable(PluginSlot::Detection) {
        Some(handles) => Arc::clone(&handles.detector),
        None => {
            let handle = create_handle(PluginSlot::Detection, &resolved.detector).await?;
            created.detector = Some(Arc::clone(&handle));
            ensure_active(cancel)?;
            handle
        },
    };
    let sampler = match reusable(PluginSlot::Sampling) {
        Some(handles) => Arc::clone(&handles.sampler),
        None => {
            let handle = create_handle(PluginSlot::Sampling, &resolved.sampler).await?;
            created.sampler = Some(Arc::clone(&handle));
            ensure_active(cancel)?;
            handle
        },
    };
    let sonifier = match reusable(PluginSlot::Sonification) {
        Some(handles) => Arc::clone(&handles.sonifier),
        None => {
            let handle = create_handle(PluginSlot::Sonification, &resolved.sonifier).await?;
            created.sonifier = Some(Arc::clone(&handle));
            ensure_active(cancel)?;
            handle
        },
    };

    // Output bindings are idempotent, so reused handles are rebound as well.
    detector.bind_outputs(&deps.outputs);
    sampler.bind_outputs(&deps.outputs);
    sonifier.bind_outputs(&deps.outputs);

    if created.sampler.is_some() {
        run_stage(
            InitStage::SamplingPostInitialize,
            cancel,
            sampler.post_initialize(),
        )
        .await?;
    }
    if created.detector.is_some() {
        run_stage(InitStage::DetectionInitialize, cancel, detector.initialize()).await?;
    }
    if created.sonifier.is_some() {
        run_stage(
            InitStage::SonificationInitialize,
            cancel,
            sonifier.initialize(),
        )
        .await?;
    }
    if created.detector.is_some() {
        run_stage(InitStage::DetectionStart, cancel, detector.start()).await?;
        run_stage(
            InitStage::DetectionPostInitialize,
            cancel,
            detector.post_initialize(),
        )
        .await?;
    }
    ensure_active(cancel)?;

    Ok(CommittedPipeline {
        ids,
        handles: EngineHandles {
            detector,
            sampler,
            sonifier,
        },
    })
}

async fn create_handle<C>(
    slot: PluginSlot,
    plugin: &ResolvedPlugin<C>,
) -> Result<Arc<PluginHandle<C>>, TransactionError>
where
    C: ?Sized + PluginCapability + 'static,
{
    debug!(%slot, plugin_id = plugin.id(), "creating plugin handle");
    let capability = plugin
        .definition
        .create(plugin.config.clone(), plugin.context.clone())
        .await
        .map_err(|cause| TransactionError::Creation {
            slot,
            plugin_id: plugin.id().to_string(),
            cause,
        })?;
    Ok(PluginHandle::new(plugin.id(), capability))
}

/// Checks the token, then runs one initialization step.
async fn run_stage<F>(
    stage: InitStage,
    cancel: &CancellationToken,
    step: F,
) -> Result<(), TransactionError>
where
    F: Future<Output = Result<(), PluginError>>,
{
    ensure_active(cancel)?;
    debug!(%stage, "running initialization stage");
    step.await.map_err(|cause| TransactionError::Stage { stage, cause })
}

fn ensure_active(cancel: &CancellationToken) -> Result<(), TransactionError> {
    if cancel.is_cancelled() {
        return Err(TransactionError::Cancelled);
    }
    Ok(())
}
