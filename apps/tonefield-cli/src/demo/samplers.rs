use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use tonefield_plugin_api::{
    DetectedPoint, OutputTargets, PluginCapability, PluginError, Rect, Sample, SampleMap, Sampler,
    Size,
};

use super::parse_config;

/// Main surface size captured at bind time.
#[derive(Default)]
struct SurfaceBinding {
    size: Mutex<Option<Size>>,
}

impl SurfaceBinding {
    fn bind(&self, targets: &OutputTargets) {
        *self.size.lock() = targets.main_size().filter(|size| !size.is_empty());
    }

    fn require(&self) -> Result<Size, PluginError> {
        self.size
            .lock()
            .ok_or_else(|| PluginError::Unavailable("no main output surface bound".to_string()))
    }

    fn visible_rect(&self) -> Option<Rect> {
        self.size
            .lock()
            .map(|size| Rect::new(0.0, 0.0, size.width, size.height))
    }
}

fn normalized(value: f32, extent: f32) -> f32 {
    (value / extent).clamp(0.0, 1.0)
}

/// Channels are the point's normalised x and y on the surface.
#[derive(Default)]
pub struct GradientSampler {
    surface: SurfaceBinding,
}

impl PluginCapability for GradientSampler {
    fn bind_outputs(&self, targets: &OutputTargets) {
        self.surface.bind(targets);
    }
}

#[async_trait]
impl Sampler for GradientSampler {
    async fn post_initialize(&self) -> Result<(), PluginError> {
        self.surface.require().map(|_| ())
    }

    fn visible_rect(&self) -> Option<Rect> {
        self.surface.visible_rect()
    }

    async fn sample(&self, points: &[DetectedPoint]) -> Result<SampleMap, PluginError> {
        let size = self.surface.require()?;
        Ok(points
            .iter()
            .map(|point| {
                let channels = vec![
                    normalized(point.x, size.width),
                    normalized(point.y, size.height),
                ];
                (point.id, Sample {
                    x: point.x,
                    y: point.y,
                    channels,
                })
            })
            .collect())
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
struct CheckerConfig {
    cells: u32,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self { cells: 8 }
    }
}

/// Channel 0 alternates between dark and light cells of a checkerboard;
/// channel 1 is the normalised y.
pub struct CheckerSampler {
    config: CheckerConfig,
    surface: SurfaceBinding,
}

impl CheckerSampler {
    pub fn create(config: Value) -> Result<Self, PluginError> {
        let config: CheckerConfig = parse_config("checker", config)?;
        if config.cells == 0 {
            return Err(PluginError::InvalidConfig(
                "checker: cells must be positive".to_string(),
            ));
        }
        Ok(Self {
            config,
            surface: SurfaceBinding::default(),
        })
    }

    fn cell_value(&self, point: &DetectedPoint, size: Size) -> f32 {
        let cells = self.config.cells as f32;
        let column = (normalized(point.x, size.width) * cells).min(cells - 1.0) as u32;
        let row = (normalized(point.y, size.height) * cells).min(cells - 1.0) as u32;
        if (column + row) % 2 == 0 { 1.0 } else { 0.25 }
    }
}

impl PluginCapability for CheckerSampler {
    fn bind_outputs(&self, targets: &OutputTargets) {
        self.surface.bind(targets);
    }
}

#[async_trait]
impl Sampler for CheckerSampler {
    async fn post_initialize(&self) -> Result<(), PluginError> {
        self.surface.require().map(|_| ())
    }

    fn visible_rect(&self) -> Option<Rect> {
        self.surface.visible_rect()
    }

    async fn sample(&self, points: &[DetectedPoint]) -> Result<SampleMap, PluginError> {
        let size = self.surface.require()?;
        Ok(points
            .iter()
            .map(|point| {
                let channels = vec![self.cell_value(point, size), normalized(point.y, size.height)];
                (point.id, Sample {
                    x: point.x,
                    y: point.y,
                    channels,
                })
            })
            .collect())
    }
}
