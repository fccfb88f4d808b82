use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arc_swap::{ArcSwap, ArcSwapOption};
use tonefield_plugin_api::{AnalyserTap, DebugTone, PointBatch, SampleMap};

/// Latest per-frame outputs of the transport loop.
///
/// Written only by the transport loop and read by visualization code. Each
/// field is swapped independently, so a reader may observe fields from
/// different frames.
#[derive(Default)]
pub struct VisualizerFrameData {
    points: ArcSwap<PointBatch>,
    has_points: AtomicBool,
    samples: ArcSwap<SampleMap>,
    tones: ArcSwap<Vec<DebugTone>>,
    analyser: ArcSwapOption<AnalyserTap>,
}

/// Point-in-time copy of [`VisualizerFrameData`].
#[derive(Clone, Default)]
pub struct VisualizerFrame {
    pub points: Arc<PointBatch>,
    pub has_points: bool,
    pub samples: Arc<SampleMap>,
    pub tones: Arc<Vec<DebugTone>>,
    pub analyser: Option<AnalyserTap>,
}

impl VisualizerFrameData {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn points(&self) -> Arc<PointBatch> {
        self.points.load_full()
    }

    pub fn has_points(&self) -> bool {
        self.has_points.load(Ordering::Acquire)
    }

    pub fn samples(&self) -> Arc<SampleMap> {
        self.samples.load_full()
    }

    pub fn tones(&self) -> Arc<Vec<DebugTone>> {
        self.tones.load_full()
    }

    pub fn analyser(&self) -> Option<AnalyserTap> {
        self.analyser.load_full().map(|tap| Arc::clone(&*tap))
    }

    pub fn snapshot(&self) -> VisualizerFrame {
        VisualizerFrame {
            points: self.points(),
            has_points: self.has_points(),
            samples: self.samples(),
            tones: self.tones(),
            analyser: self.analyser(),
        }
    }

    pub(crate) fn publish_points(&self, points: PointBatch) {
        self.has_points.store(!points.is_empty(), Ordering::Release);
        self.points.store(Arc::new(points));
    }

    pub(crate) fn publish_samples(&self, samples: SampleMap) {
        self.samples.store(Arc::new(samples));
    }

    pub(crate) fn publish_tones(&self, tones: Vec<DebugTone>) {
        self.tones.store(Arc::new(tones));
    }

    pub(crate) fn publish_analyser(&self, analyser: Option<AnalyserTap>) {
        self.analyser.store(analyser.map(Arc::new));
    }

    /// Clears detection, sampling and sonification output. The analyser tap
    /// is left in place.
    pub(crate) fn clear_transient(&self) {
        self.publish_points(PointBatch::new());
        self.publish_samples(SampleMap::new());
        self.publish_tones(Vec::new());
    }
}
