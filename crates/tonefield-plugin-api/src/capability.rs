use async_trait::async_trait;
use futures_util::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use crate::error::PluginError;
use crate::geometry::{DetectedPoint, PointBatch, Rect, Size};
use crate::output::OutputTargets;
use crate::sample::{AnalyserTap, DebugTone, SampleMap};

/// Lazy sequence of point batches. Ends when the detector stops producing;
/// yields `Err(PluginError::Cancelled)` or simply ends once its token fires.
pub type PointStream = BoxStream<'static, Result<PointBatch, PluginError>>;

/// Lifecycle hooks shared by every capability.
pub trait PluginCapability: Send + Sync {
    /// Binds the capability to its rendering surfaces. Called on every
    /// transaction that includes the handle, so it must be idempotent.
    fn bind_outputs(&self, _targets: &OutputTargets) {}

    /// Releases everything the capability holds. The owning
    /// [`PluginHandle`](crate::PluginHandle) guarantees a single call.
    fn dispose(&self) {}
}

#[async_trait]
pub trait Detector: PluginCapability {
    async fn initialize(&self) -> Result<(), PluginError>;

    async fn start(&self) -> Result<(), PluginError>;

    async fn post_initialize(&self) -> Result<(), PluginError> {
        Ok(())
    }

    /// Size of the coordinate space the reported points live in.
    fn source_size(&self) -> Option<Size> {
        None
    }

    fn points(&self, cancel: CancellationToken) -> PointStream;

    fn stop(&self);
}

#[async_trait]
pub trait Sampler: PluginCapability {
    /// Runs once after the sampler is committed into a pipeline, e.g. to load
    /// and draw the image it samples from.
    async fn post_initialize(&self) -> Result<(), PluginError> {
        Ok(())
    }

    /// Region of the sampler's space that detector coordinates map onto.
    fn visible_rect(&self) -> Option<Rect> {
        None
    }

    async fn sample(&self, points: &[DetectedPoint]) -> Result<SampleMap, PluginError>;
}

#[async_trait]
pub trait Sonifier: PluginCapability {
    async fn initialize(&self) -> Result<(), PluginError>;

    /// Renders one frame of samples. Ids absent from `samples` should have
    /// their output released; an empty map releases everything.
    async fn process_samples(&self, samples: &SampleMap) -> Result<(), PluginError>;

    fn debug_tones(&self) -> Vec<DebugTone> {
        Vec::new()
    }

    fn analyser_tap(&self) -> Option<AnalyserTap> {
        None
    }

    fn stop(&self);
}
