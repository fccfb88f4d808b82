use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the three required pipeline roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginSlot {
    Detection,
    Sampling,
    Sonification,
}

impl PluginSlot {
    pub const ALL: [Self; 3] = [Self::Detection, Self::Sampling, Self::Sonification];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Detection => "detection",
            Self::Sampling => "sampling",
            Self::Sonification => "sonification",
        }
    }
}

impl fmt::Display for PluginSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
