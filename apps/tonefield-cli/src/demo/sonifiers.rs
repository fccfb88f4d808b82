use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use tonefield_plugin_api::{
    AnalyserTap, ConfigSubscription, DebugTone, PluginCapability, PluginError, PointId,
    RuntimeContext, SampleMap, Sonifier,
};
use tracing::{debug, info, warn};

use super::parse_config;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
struct ToneRange {
    min_hz: f32,
    max_hz: f32,
}

impl Default for ToneRange {
    fn default() -> Self {
        Self {
            min_hz: 220.0,
            max_hz: 880.0,
        }
    }
}

impl ToneRange {
    fn parse(value: Value) -> Result<Self, PluginError> {
        let range: Self = parse_config("tone-log", value)?;
        if !(range.min_hz > 0.0 && range.min_hz < range.max_hz) {
            return Err(PluginError::InvalidConfig(format!(
                "tone-log: invalid range {}..{} Hz",
                range.min_hz, range.max_hz
            )));
        }
        Ok(range)
    }

    fn frequency(self, level: f32) -> f32 {
        self.min_hz + level.clamp(0.0, 1.0) * (self.max_hz - self.min_hz)
    }
}

/// Levels of the tones currently sounding, readable through the analyser tap.
#[derive(Debug, Default)]
pub struct ToneAnalyser {
    levels: Mutex<Vec<f32>>,
}

impl ToneAnalyser {
    pub fn levels(&self) -> Vec<f32> {
        self.levels.lock().clone()
    }

    fn update<'a>(&self, tones: impl Iterator<Item = &'a DebugTone>) {
        *self.levels.lock() = tones.map(|tone| tone.gain).collect();
    }
}

/// Logs a tone per point instead of producing audio. Channel 0 picks the
/// pitch, channel 1 the gain.
pub struct ToneLogSonifier {
    range: Arc<Mutex<ToneRange>>,
    tones: Mutex<BTreeMap<PointId, DebugTone>>,
    analyser: Arc<ToneAnalyser>,
    subscription: Mutex<Option<ConfigSubscription>>,
}

impl ToneLogSonifier {
    pub fn create(config: Value, ctx: &RuntimeContext) -> Result<Self, PluginError> {
        let range = Arc::new(Mutex::new(ToneRange::parse(config)?));
        let subscription = ctx.subscribe_config({
            let range = Arc::clone(&range);
            move |value| match ToneRange::parse(value.clone()) {
                Ok(next) => {
                    info!(min_hz = next.min_hz, max_hz = next.max_hz, "tone range updated");
                    *range.lock() = next;
                },
                Err(err) => warn!(error = %err, "ignoring tone-log config update"),
            }
        });
        Ok(Self {
            range,
            tones: Mutex::new(BTreeMap::new()),
            analyser: Arc::new(ToneAnalyser::default()),
            subscription: Mutex::new(Some(subscription)),
        })
    }

    fn release_all(&self) {
        let mut tones = self.tones.lock();
        for point_id in tones.keys() {
            info!(point_id, "tone off");
        }
        tones.clear();
        self.analyser.update(tones.values());
    }
}

impl PluginCapability for ToneLogSonifier {
    fn dispose(&self) {
        self.stop();
        self.subscription.lock().take();
    }
}

#[async_trait]
impl Sonifier for ToneLogSonifier {
    async fn initialize(&self) -> Result<(), PluginError> {
        let range = *self.range.lock();
        debug!(min_hz = range.min_hz, max_hz = range.max_hz, "tone log ready");
        Ok(())
    }

    async fn process_samples(&self, samples: &SampleMap) -> Result<(), PluginError> {
        let range = *self.range.lock();
        let mut tones = self.tones.lock();
        tones.retain(|point_id, _| {
            let keep = samples.contains_key(point_id);
            if !keep {
                info!(point_id = *point_id, "tone off");
            }
            keep
        });
        for (&point_id, sample) in samples {
            let level = sample.channels.first().copied().unwrap_or(0.0);
            let gain = sample
                .channels
                .get(1)
                .map_or(0.5, |value| 0.2 + 0.8 * value.clamp(0.0, 1.0));
            let tone = DebugTone {
                point_id,
                frequency_hz: range.frequency(level),
                gain,
            };
            if tones.insert(point_id, tone).is_none() {
                info!(point_id, frequency_hz = tone.frequency_hz, "tone on");
            }
        }
        self.analyser.update(tones.values());
        Ok(())
    }

    fn debug_tones(&self) -> Vec<DebugTone> {
        self.tones.lock().values().copied().collect()
    }

    fn analyser_tap(&self) -> Option<AnalyserTap> {
        Some(Arc::clone(&self.analyser) as AnalyserTap)
    }

    fn stop(&self) {
        self.release_all();
    }
}

/// Accepts every frame and produces nothing.
pub struct SilentSonifier;

impl PluginCapability for SilentSonifier {}

#[async_trait]
impl Sonifier for SilentSonifier {
    async fn initialize(&self) -> Result<(), PluginError> {
        Ok(())
    }

    async fn process_samples(&self, _samples: &SampleMap) -> Result<(), PluginError> {
        Ok(())
    }

    fn stop(&self) {}
}
