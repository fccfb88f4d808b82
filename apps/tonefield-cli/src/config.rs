use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tonefield_engine::{EngineConfig, PluginSelection};
use tonefield_plugin_api::Size;

/// Longest run, and latest timeline step, the CLI schedules.
pub const MAX_DURATION_MS: u64 = 24 * 60 * 60 * 1_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub duration_ms: u64,
    /// How often the current frame is summarised in the log.
    pub report_interval_ms: u64,
    /// Size of the demo output surface.
    pub surface: Size,
    pub log_filter: String,
    pub engine: EngineConfig,
    pub timeline: Vec<TimelineEntry>,
}

/// A selection published `at_ms` after the run starts, with optional
/// per-plugin config values written to the config store first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub at_ms: u64,
    pub selection: PluginSelection,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub configs: BTreeMap<String, Value>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            duration_ms: 4_000,
            report_interval_ms: 500,
            surface: Size::new(640.0, 480.0),
            log_filter: "info".to_string(),
            engine: EngineConfig::default(),
            timeline: vec![
                TimelineEntry {
                    at_ms: 0,
                    selection: PluginSelection::new("orbit", "gradient", "tone-log"),
                    configs: BTreeMap::new(),
                },
                TimelineEntry {
                    at_ms: 1_200,
                    selection: PluginSelection::new("scan", "gradient", "tone-log"),
                    configs: BTreeMap::from([(
                        "tone-log".to_string(),
                        json!({ "min_hz": 110.0, "max_hz": 440.0 }),
                    )]),
                },
                TimelineEntry {
                    at_ms: 2_400,
                    selection: PluginSelection::new("scan", "checker", "tone-log"),
                    configs: BTreeMap::new(),
                },
                TimelineEntry {
                    at_ms: 3_200,
                    selection: PluginSelection::new("orbit", "checker", "silent"),
                    configs: BTreeMap::new(),
                },
            ],
        }
    }
}

impl RunConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("read run config {}", path.display()))?;
                Self::parse(&raw).with_context(|| format!("parse run config {}", path.display()))?
            },
            None => Self::default(),
        };
        config.validated()
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validated()
    }

    /// Replaces the configured run length, e.g. from a command line flag.
    pub fn with_duration_ms(mut self, duration_ms: u64) -> Result<Self> {
        self.duration_ms = duration_ms;
        self.validated()
    }

    fn validated(mut self) -> Result<Self> {
        if self.timeline.is_empty() {
            bail!("run config timeline is empty");
        }
        if self.duration_ms > MAX_DURATION_MS {
            bail!("duration_ms {} exceeds the {MAX_DURATION_MS} ms limit", self.duration_ms);
        }
        if let Some(entry) = self.timeline.iter().find(|entry| entry.at_ms > MAX_DURATION_MS) {
            bail!("timeline step at_ms {} exceeds the {MAX_DURATION_MS} ms limit", entry.at_ms);
        }
        if self.report_interval_ms == 0 {
            bail!("report_interval_ms must be positive");
        }
        self.timeline.sort_by_key(|entry| entry.at_ms);
        Ok(self)
    }
}
