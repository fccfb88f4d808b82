use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::geometry::PointId;

/// Data extracted by a sampler at one mapped point.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Sample {
    pub x: f32,
    pub y: f32,
    pub channels: Vec<f32>,
}

/// Samples keyed by the id of the point that produced them.
pub type SampleMap = BTreeMap<PointId, Sample>;

/// A tone a sonifier is currently producing, for visualization only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DebugTone {
    pub point_id: PointId,
    pub frequency_hz: f32,
    pub gain: f32,
}

/// Opaque analysis handle exposed by a sonifier (e.g. a spectrum buffer).
pub type AnalyserTap = Arc<dyn Any + Send + Sync>;
