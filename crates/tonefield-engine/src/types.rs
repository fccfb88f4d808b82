use serde::{Deserialize, Serialize};
use tonefield_plugin_api::{PluginSlot, Size};

use crate::error::{TransactionError, TransportError};
use crate::snapshot::EngineHandles;

/// Desired plugin per slot, as supplied by the selection source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginSelection {
    pub detection: String,
    pub sampling: String,
    pub sonification: String,
    /// Optional and not backed by a handle in this engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visualization: Option<String>,
}

impl PluginSelection {
    pub fn new(
        detection: impl Into<String>,
        sampling: impl Into<String>,
        sonification: impl Into<String>,
    ) -> Self {
        Self {
            detection: detection.into(),
            sampling: sampling.into(),
            sonification: sonification.into(),
            visualization: None,
        }
    }

    pub fn id_for(&self, slot: PluginSlot) -> &str {
        match slot {
            PluginSlot::Detection => &self.detection,
            PluginSlot::Sampling => &self.sampling,
            PluginSlot::Sonification => &self.sonification,
        }
    }
}

/// Plugin ids currently backing live handles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActivePluginIds {
    pub detection: String,
    pub sampling: String,
    pub sonification: String,
}

impl ActivePluginIds {
    pub fn id_for(&self, slot: PluginSlot) -> &str {
        match slot {
            PluginSlot::Detection => &self.detection,
            PluginSlot::Sampling => &self.sampling,
            PluginSlot::Sonification => &self.sonification,
        }
    }
}

impl From<&PluginSelection> for ActivePluginIds {
    fn from(selection: &PluginSelection) -> Self {
        Self {
            detection: selection.detection.clone(),
            sampling: selection.sampling.clone(),
            sonification: selection.sonification.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub enum EngineStatus {
    /// No selection has been requested yet.
    #[default]
    Idle,
    Initializing,
    Ready,
    Error(TransactionError),
}

impl EngineStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    pub fn error(&self) -> Option<&TransactionError> {
        match self {
            Self::Error(err) => Some(err),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub enum TransportStatus {
    #[default]
    Stopped,
    Running,
    Error(TransportError),
}

impl TransportStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped)
    }

    pub fn error(&self) -> Option<&TransportError> {
        match self {
            Self::Error(err) => Some(err),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum EngineEvent {
    StatusChanged(EngineStatus),
    HandlesChanged {
        ids: ActivePluginIds,
        handles: EngineHandles,
    },
    HandlesCleared,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StopOptions {
    /// Release all sonifier output and clear transient frame data.
    pub flush: bool,
}

impl StopOptions {
    pub const FLUSH: Self = Self { flush: true };
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TransportConfig {
    /// Raw pixel size of the output surface; mapped points outside it are
    /// discarded. `None` keeps every point.
    pub canvas_size: Option<Size>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub event_capacity: usize,
    /// Overrides the size of the main output surface for point filtering.
    pub canvas_size: Option<Size>,
    pub flush_on_swap: bool,
    pub flush_on_shutdown: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_capacity: 256,
            canvas_size: None,
            flush_on_swap: true,
            flush_on_shutdown: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ActivePluginIds, EngineConfig, PluginSelection};

    #[test]
    fn ids_ignore_visualization() {
        let mut a = PluginSelection::new("cam", "image", "synth");
        let mut b = a.clone();
        a.visualization = Some("bars".to_string());
        b.visualization = None;
        assert_ne!(a, b);
        assert_eq!(ActivePluginIds::from(&a), ActivePluginIds::from(&b));
    }

    #[test]
    fn selection_deserializes_without_visualization() {
        let selection: PluginSelection = serde_json::from_value(json!({
            "detection": "cam",
            "sampling": "image",
            "sonification": "synth"
        }))
        .expect("parse selection");
        assert_eq!(selection, PluginSelection::new("cam", "image", "synth"));
    }

    #[test]
    fn engine_config_fills_missing_fields_with_defaults() {
        let config: EngineConfig =
            serde_json::from_value(json!({ "event_capacity": 8 })).expect("parse config");
        assert_eq!(config.event_capacity, 8);
        assert!(config.flush_on_swap);
        assert!(config.flush_on_shutdown);
        assert_eq!(config.canvas_size, None);
    }
}
