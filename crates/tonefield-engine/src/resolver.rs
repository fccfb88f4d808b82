use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tonefield_plugin_api::{
    Detector, PluginConfigStore, PluginDefinition, PluginSlot, RuntimeContext, Sampler, Sonifier,
};

use crate::error::ResolutionError;
use crate::registry::PluginRegistry;
use crate::types::{ActivePluginIds, PluginSelection};

/// A plugin definition bound to its current configuration and a fresh
/// runtime context.
pub struct ResolvedPlugin<C: ?Sized + Send + 'static> {
    pub definition: PluginDefinition<C>,
    pub config: Value,
    pub context: RuntimeContext,
}

impl<C: ?Sized + Send + 'static> ResolvedPlugin<C> {
    pub fn id(&self) -> &str {
        self.definition.id()
    }
}

impl<C: ?Sized + Send + 'static> fmt::Debug for ResolvedPlugin<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedPlugin")
            .field("id", &self.id())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct ResolvedPlugins {
    pub detector: ResolvedPlugin<dyn Detector>,
    pub sampler: ResolvedPlugin<dyn Sampler>,
    pub sonifier: ResolvedPlugin<dyn Sonifier>,
}

impl ResolvedPlugins {
    pub fn ids(&self) -> ActivePluginIds {
        ActivePluginIds {
            detection: self.detector.id().to_string(),
            sampling: self.sampler.id().to_string(),
            sonification: self.sonifier.id().to_string(),
        }
    }
}

/// Looks up the three required plugins named by `selection`. Synchronous and
/// free of side effects apart from creating the runtime contexts.
pub fn resolve(
    selection: &PluginSelection,
    registry: &PluginRegistry,
    configs: &Arc<PluginConfigStore>,
) -> Result<ResolvedPlugins, ResolutionError> {
    let detector = registry
        .detector(&selection.detection)
        .ok_or_else(|| unknown(PluginSlot::Detection, &selection.detection))?;
    let sampler = registry
        .sampler(&selection.sampling)
        .ok_or_else(|| unknown(PluginSlot::Sampling, &selection.sampling))?;
    let sonifier = registry
        .sonifier(&selection.sonification)
        .ok_or_else(|| unknown(PluginSlot::Sonification, &selection.sonification))?;

    Ok(ResolvedPlugins {
        detector: bind(PluginSlot::Detection, detector, configs),
        sampler: bind(PluginSlot::Sampling, sampler, configs),
        sonifier: bind(PluginSlot::Sonification, sonifier, configs),
    })
}

fn unknown(slot: PluginSlot, id: &str) -> ResolutionError {
    ResolutionError::UnknownPlugin {
        slot,
        id: id.to_string(),
    }
}

fn bind<C: ?Sized + Send + 'static>(
    slot: PluginSlot,
    definition: &PluginDefinition<C>,
    configs: &Arc<PluginConfigStore>,
) -> ResolvedPlugin<C> {
    let config = configs.get_or(definition.id(), definition.default_config());
    let context = RuntimeContext::new(
        slot,
        definition.id(),
        definition.default_config().clone(),
        Arc::clone(configs),
    );
    ResolvedPlugin {
        definition: definition.clone(),
        config,
        context,
    }
}
