use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PluginError {
    #[error("plugin unavailable: {0}")]
    Unavailable(String),
    #[error("invalid plugin config: {0}")]
    InvalidConfig(String),
    /// Raised by a point sequence that observed its cancellation token.
    #[error("cancelled")]
    Cancelled,
    #[error("{0}")]
    Failure(String),
}

impl PluginError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<String> for PluginError {
    fn from(value: String) -> Self {
        Self::Failure(value)
    }
}

impl From<&str> for PluginError {
    fn from(value: &str) -> Self {
        Self::Failure(value.to_string())
    }
}
