use std::f32::consts::TAU;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream;
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tonefield_plugin_api::{
    DetectedPoint, Detector, PluginCapability, PluginError, PointBatch, PointStream, Size,
};
use tracing::debug;

use super::parse_config;

/// Rows in one scan sweep, followed by a few ticks without points.
const SCAN_ROWS: u64 = 24;
const SCAN_GAP: u64 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    Orbit,
    Scan,
}

impl Pattern {
    fn id(self) -> &'static str {
        match self {
            Self::Orbit => "orbit",
            Self::Scan => "scan",
        }
    }

    fn frame(self, config: &MotionConfig, tick: u64) -> PointBatch {
        let (width, height) = (config.width, config.height);
        let count = config.points;
        match self {
            Self::Orbit => {
                let radius = width.min(height) * 0.35;
                (0..count)
                    .map(|i| {
                        let phase = tick as f32 * 0.08 + i as f32 * TAU / count as f32;
                        DetectedPoint::new(
                            i,
                            width / 2.0 + radius * phase.cos(),
                            height / 2.0 + radius * phase.sin(),
                        )
                    })
                    .collect()
            },
            Self::Scan => {
                let row = tick % (SCAN_ROWS + SCAN_GAP);
                if row >= SCAN_ROWS {
                    return PointBatch::new();
                }
                let y = (row as f32 + 0.5) * height / SCAN_ROWS as f32;
                (0..count)
                    .map(|i| DetectedPoint::new(i, (i as f32 + 0.5) * width / count as f32, y))
                    .collect()
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
struct MotionConfig {
    interval_ms: u64,
    points: u32,
    width: f32,
    height: f32,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            interval_ms: 40,
            points: 3,
            width: 640.0,
            height: 480.0,
        }
    }
}

/// Synthetic detector emitting a moving point pattern on a fixed tick.
pub struct MotionDetector {
    pattern: Pattern,
    config: MotionConfig,
    started: AtomicBool,
}

impl MotionDetector {
    pub fn create(pattern: Pattern, config: Value) -> Result<Self, PluginError> {
        let config: MotionConfig = parse_config(pattern.id(), config)?;
        if config.interval_ms == 0 {
            return Err(PluginError::InvalidConfig(format!(
                "{}: interval_ms must be positive",
                pattern.id()
            )));
        }
        if Size::new(config.width, config.height).is_empty() {
            return Err(PluginError::InvalidConfig(format!(
                "{}: source size must be positive",
                pattern.id()
            )));
        }
        Ok(Self {
            pattern,
            config,
            started: AtomicBool::new(false),
        })
    }
}

impl PluginCapability for MotionDetector {
    fn dispose(&self) {
        self.stop();
    }
}

#[async_trait]
impl Detector for MotionDetector {
    async fn initialize(&self) -> Result<(), PluginError> {
        debug!(pattern = self.pattern.id(), points = self.config.points, "detector ready");
        Ok(())
    }

    async fn start(&self) -> Result<(), PluginError> {
        self.started.store(true, Ordering::Release);
        Ok(())
    }

    fn source_size(&self) -> Option<Size> {
        Some(Size::new(self.config.width, self.config.height))
    }

    fn points(&self, cancel: CancellationToken) -> PointStream {
        if !self.started.load(Ordering::Acquire) {
            let err =
                PluginError::Unavailable(format!("{} detector is not started", self.pattern.id()));
            return Box::pin(stream::iter([Err::<PointBatch, _>(err)]));
        }
        let pattern = self.pattern;
        let config = self.config;
        let interval = Duration::from_millis(config.interval_ms);
        let frame = Arc::new(move |tick| pattern.frame(&config, tick));
        Box::pin(stream::unfold(0_u64, move |tick| {
            let cancel = cancel.clone();
            let frame = Arc::clone(&frame);
            async move {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    _ = tokio::time::sleep(interval) => Some((Ok(frame(tick)), tick + 1)),
                }
            }
        }))
    }

    fn stop(&self) {
        if self.started.swap(false, Ordering::AcqRel) {
            debug!(pattern = self.pattern.id(), "detector stopped");
        }
    }
}
