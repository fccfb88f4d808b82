use std::fmt;
use std::sync::Arc;

use tonefield_plugin_api::{DetectorHandle, PluginSlot, SamplerHandle, SonifierHandle};

use crate::types::ActivePluginIds;

/// One live handle per slot.
#[derive(Clone)]
pub struct EngineHandles {
    pub detector: DetectorHandle,
    pub sampler: SamplerHandle,
    pub sonifier: SonifierHandle,
}

impl EngineHandles {
    /// Reference equality for one slot.
    pub fn same_slot(&self, other: &Self, slot: PluginSlot) -> bool {
        match slot {
            PluginSlot::Detection => Arc::ptr_eq(&self.detector, &other.detector),
            PluginSlot::Sampling => Arc::ptr_eq(&self.sampler, &other.sampler),
            PluginSlot::Sonification => Arc::ptr_eq(&self.sonifier, &other.sonifier),
        }
    }

    /// Reference equality across all three slots.
    pub fn same_as(&self, other: &Self) -> bool {
        PluginSlot::ALL
            .into_iter()
            .all(|slot| self.same_slot(other, slot))
    }

    /// Disposes every handle of `self` whose reference is not kept by `next`.
    /// Returns the slots that were replaced.
    pub fn dispose_replaced(&self, next: &Self) -> Vec<PluginSlot> {
        let mut replaced = Vec::new();
        for slot in PluginSlot::ALL {
            if !self.same_slot(next, slot) {
                self.dispose_slot(slot);
                replaced.push(slot);
            }
        }
        replaced
    }

    pub fn any_disposed(&self) -> bool {
        self.detector.is_disposed() || self.sampler.is_disposed() || self.sonifier.is_disposed()
    }

    pub fn dispose_all(&self) {
        for slot in PluginSlot::ALL {
            self.dispose_slot(slot);
        }
    }

    fn dispose_slot(&self, slot: PluginSlot) {
        match slot {
            PluginSlot::Detection => self.detector.dispose(),
            PluginSlot::Sampling => self.sampler.dispose(),
            PluginSlot::Sonification => self.sonifier.dispose(),
        };
    }
}

impl fmt::Debug for EngineHandles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineHandles")
            .field("detector", &self.detector.plugin_id())
            .field("sampler", &self.sampler.plugin_id())
            .field("sonifier", &self.sonifier.plugin_id())
            .finish()
    }
}

/// Ids and the handles created for them.
#[derive(Debug, Clone)]
pub struct CommittedPipeline {
    pub ids: ActivePluginIds,
    pub handles: EngineHandles,
}

/// The pipeline currently owned by the lifecycle manager, if any.
#[derive(Debug, Clone, Default)]
pub struct EngineSnapshot {
    committed: Option<CommittedPipeline>,
}

impl EngineSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn ids(&self) -> Option<&ActivePluginIds> {
        self.committed.as_ref().map(|pipeline| &pipeline.ids)
    }

    pub fn handles(&self) -> Option<&EngineHandles> {
        self.committed.as_ref().map(|pipeline| &pipeline.handles)
    }

    pub fn pipeline(&self) -> Option<&CommittedPipeline> {
        self.committed.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.committed.is_none()
    }

    pub(crate) fn replace(&mut self, pipeline: CommittedPipeline) -> Option<CommittedPipeline> {
        self.committed.replace(pipeline)
    }

    pub(crate) fn take(&mut self) -> Option<CommittedPipeline> {
        self.committed.take()
    }
}

impl From<CommittedPipeline> for EngineSnapshot {
    fn from(pipeline: CommittedPipeline) -> Self {
        Self {
            committed: Some(pipeline),
        }
    }
}
