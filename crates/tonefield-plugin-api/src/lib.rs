#![deny(clippy::wildcard_imports)]

pub mod capability;
pub mod context;
pub mod error;
pub mod factory;
pub mod geometry;
pub mod handle;
pub mod output;
pub mod sample;
pub mod slot;

pub use capability::{Detector, PluginCapability, PointStream, Sampler, Sonifier};
pub use context::{ConfigSubscription, PluginConfigStore, RuntimeContext};
pub use error::PluginError;
pub use factory::{PluginDefinition, PluginFactory};
pub use geometry::{DetectedPoint, PointBatch, PointId, Rect, Size};
pub use handle::{DetectorHandle, PluginHandle, SamplerHandle, SonifierHandle};
pub use output::{MAIN_SURFACE, OutputSurface, OutputTargets};
pub use sample::{AnalyserTap, DebugTone, Sample, SampleMap};
pub use slot::PluginSlot;
