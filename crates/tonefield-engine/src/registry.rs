use tonefield_plugin_api::{Detector, PluginDefinition, PluginSlot, Sampler, Sonifier};

use crate::error::RegistryError;

/// Read-only catalogue of plugin definitions, one list per slot.
#[derive(Debug, Clone, Default)]
pub struct PluginRegistry {
    detectors: Vec<PluginDefinition<dyn Detector>>,
    samplers: Vec<PluginDefinition<dyn Sampler>>,
    sonifiers: Vec<PluginDefinition<dyn Sonifier>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_detector(
        &mut self,
        definition: PluginDefinition<dyn Detector>,
    ) -> Result<(), RegistryError> {
        push_unique(&mut self.detectors, PluginSlot::Detection, definition)
    }

    pub fn register_sampler(
        &mut self,
        definition: PluginDefinition<dyn Sampler>,
    ) -> Result<(), RegistryError> {
        push_unique(&mut self.samplers, PluginSlot::Sampling, definition)
    }

    pub fn register_sonifier(
        &mut self,
        definition: PluginDefinition<dyn Sonifier>,
    ) -> Result<(), RegistryError> {
        push_unique(&mut self.sonifiers, PluginSlot::Sonification, definition)
    }

    pub fn detector(&self, id: &str) -> Option<&PluginDefinition<dyn Detector>> {
        self.detectors.iter().find(|def| def.id() == id)
    }

    pub fn sampler(&self, id: &str) -> Option<&PluginDefinition<dyn Sampler>> {
        self.samplers.iter().find(|def| def.id() == id)
    }

    pub fn sonifier(&self, id: &str) -> Option<&PluginDefinition<dyn Sonifier>> {
        self.sonifiers.iter().find(|def| def.id() == id)
    }

    pub fn ids(&self, slot: PluginSlot) -> Vec<&str> {
        match slot {
            PluginSlot::Detection => self.detectors.iter().map(|def| def.id()).collect(),
            PluginSlot::Sampling => self.samplers.iter().map(|def| def.id()).collect(),
            PluginSlot::Sonification => self.sonifiers.iter().map(|def| def.id()).collect(),
        }
    }
}

fn push_unique<C: ?Sized + Send + 'static>(
    list: &mut Vec<PluginDefinition<C>>,
    slot: PluginSlot,
    definition: PluginDefinition<C>,
) -> Result<(), RegistryError> {
    if list.iter().any(|def| def.id() == definition.id()) {
        return Err(RegistryError::DuplicateId {
            slot,
            id: definition.id().to_string(),
        });
    }
    list.push(definition);
    Ok(())
}
