use std::any::Any;
use std::fmt;

use thiserror::Error;
use tonefield_plugin_api::{PluginError, PluginSlot};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("duplicate {slot} plugin id `{id}`")]
    DuplicateId { slot: PluginSlot, id: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("unknown {slot} plugin `{id}`")]
    UnknownPlugin { slot: PluginSlot, id: String },
}

impl ResolutionError {
    pub fn slot(&self) -> PluginSlot {
        match self {
            Self::UnknownPlugin { slot, .. } => *slot,
        }
    }
}

/// One-time initialization steps of a newly created handle, in run order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InitStage {
    SamplingPostInitialize,
    DetectionInitialize,
    SonificationInitialize,
    DetectionStart,
    DetectionPostInitialize,
}

impl InitStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SamplingPostInitialize => "sampling post-initialize",
            Self::DetectionInitialize => "detection initialize",
            Self::SonificationInitialize => "sonification initialize",
            Self::DetectionStart => "detection start",
            Self::DetectionPostInitialize => "detection post-initialize",
        }
    }
}

impl fmt::Display for InitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransactionError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error("failed to create {slot} plugin `{plugin_id}`: {cause}")]
    Creation {
        slot: PluginSlot,
        plugin_id: String,
        cause: PluginError,
    },
    #[error("{stage} failed: {cause}")]
    Stage { stage: InitStage, cause: PluginError },
    /// A plugin panicked while being created or initialized.
    #[error("plugin panicked during selection: {0}")]
    Panicked(String),
    /// Superseded by a newer request; never surfaced as a failure.
    #[error("transaction cancelled")]
    Cancelled,
}

impl TransactionError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn stage(&self) -> Option<InitStage> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("point sequence failed: {0}")]
    Detection(PluginError),
    #[error("sampling failed: {0}")]
    Sampling(PluginError),
    #[error("sonification failed: {0}")]
    Sonification(PluginError),
    #[error("transport loop is already running")]
    AlreadyRunning,
    #[error("transport task aborted: {0}")]
    Aborted(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("lifecycle manager has been disposed")]
    Disposed,
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(message) => (*message).to_string(),
            Err(_) => "non-string panic payload".to_string(),
        },
    }
}
