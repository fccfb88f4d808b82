use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::capability::{Detector, PluginCapability, Sampler, Sonifier};

pub type DetectorHandle = Arc<PluginHandle<dyn Detector>>;
pub type SamplerHandle = Arc<PluginHandle<dyn Sampler>>;
pub type SonifierHandle = Arc<PluginHandle<dyn Sonifier>>;

/// Runtime instance of a plugin occupying a slot.
///
/// Handles are shared as `Arc` and compared by reference. Disposal runs the
/// capability's hook at most once, whether triggered explicitly or by drop.
pub struct PluginHandle<C: ?Sized + PluginCapability> {
    plugin_id: String,
    disposed: AtomicBool,
    capability: Box<C>,
}

impl<C: ?Sized + PluginCapability> PluginHandle<C> {
    pub fn new(plugin_id: impl Into<String>, capability: Box<C>) -> Arc<Self> {
        Arc::new(Self {
            plugin_id: plugin_id.into(),
            disposed: AtomicBool::new(false),
            capability,
        })
    }

    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Returns `true` if this call performed the disposal.
    pub fn dispose(&self) -> bool {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return false;
        }
        tracing::debug!(plugin_id = %self.plugin_id, "disposing plugin handle");
        self.capability.dispose();
        true
    }
}

impl<C: ?Sized + PluginCapability> Deref for PluginHandle<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.capability
    }
}

impl<C: ?Sized + PluginCapability> Drop for PluginHandle<C> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<C: ?Sized + PluginCapability> fmt::Debug for PluginHandle<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginHandle")
            .field("plugin_id", &self.plugin_id)
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}
