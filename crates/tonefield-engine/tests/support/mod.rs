#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream;
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tonefield_engine::{EngineHandles, LifecycleManager, PluginRegistry, TransactionDeps};
use tonefield_plugin_api::{
    AnalyserTap, DebugTone, DetectedPoint, Detector, OutputTargets, PluginCapability,
    PluginConfigStore, PluginDefinition, PluginError, PluginHandle, PointBatch, PointId,
    PointStream, Sample, SampleMap, Sampler, Sonifier,
};

pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

pub type FeedItem = Result<PointBatch, PluginError>;

/// Ordered log of everything the fake plugins did.
#[derive(Default)]
pub struct Probe {
    entries: Mutex<Vec<String>>,
}

impl Probe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record(&self, entry: impl Into<String>) {
        self.entries.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.entries.lock().iter().filter(|e| *e == entry).count()
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.count(entry) > 0
    }

    /// Entries whose action (the last `:` segment) is one of `actions`.
    pub fn actions(&self, actions: &[&str]) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter(|e| {
                e.rsplit(':')
                    .next()
                    .is_some_and(|action| actions.contains(&action))
            })
            .cloned()
            .collect()
    }

    pub async fn wait_for(&self, entry: &str) {
        self.wait_for_count(entry, 1).await;
    }

    pub async fn wait_for_count(&self, entry: &str, count: usize) {
        tokio::time::timeout(TEST_TIMEOUT, async {
            while self.count(entry) < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for `{entry}` x{count}: {:?}", self.entries()));
    }
}

/// Behaviour of one fake plugin definition.
#[derive(Clone)]
pub struct FakeSpec {
    pub id: &'static str,
    pub fail_create: bool,
    /// Action name that returns an error, e.g. `initialize` or `sample`.
    pub fail_at: Option<&'static str>,
    /// Action name that panics, including `create` for the factory.
    pub panic_at: Option<&'static str>,
    /// Blocks the first initialization step until a permit is added.
    pub gate: Option<Arc<Semaphore>>,
    pub feed: Option<Arc<Mutex<Option<mpsc::UnboundedReceiver<FeedItem>>>>>,
}

impl FakeSpec {
    pub fn new(id: &'static str) -> Self {
        Self {
            id,
            fail_create: false,
            fail_at: None,
            panic_at: None,
            gate: None,
            feed: None,
        }
    }

    pub fn failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    pub fn failing_at(mut self, action: &'static str) -> Self {
        self.fail_at = Some(action);
        self
    }

    pub fn panicking_at(mut self, action: &'static str) -> Self {
        self.panic_at = Some(action);
        self
    }

    fn panic_if(&self, action: &str) {
        if self.panic_at == Some(action) {
            panic!("{} {action} panicked", self.id);
        }
    }

    pub fn gated(mut self, gate: &Arc<Semaphore>) -> Self {
        self.gate = Some(Arc::clone(gate));
        self
    }

    /// Points come from the returned sender, for the first `points` call only.
    pub fn fed(mut self) -> (Self, mpsc::UnboundedSender<FeedItem>) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.feed = Some(Arc::new(Mutex::new(Some(rx))));
        (self, tx)
    }
}

pub fn closed_gate() -> Arc<Semaphore> {
    Arc::new(Semaphore::new(0))
}

struct Fake {
    slot: &'static str,
    probe: Arc<Probe>,
    spec: FakeSpec,
}

impl Fake {
    fn new(slot: &'static str, probe: &Arc<Probe>, spec: FakeSpec) -> Self {
        Self {
            slot,
            probe: Arc::clone(probe),
            spec,
        }
    }

    fn record(&self, action: &str) {
        self.probe
            .record(format!("{}:{}:{action}", self.slot, self.spec.id));
    }

    async fn step(&self, action: &str) -> Result<(), PluginError> {
        self.record(action);
        if let Some(gate) = self.spec.gate.as_ref() {
            gate.acquire()
                .await
                .map_err(|_| PluginError::Failure("gate closed".to_string()))?
                .forget();
        }
        self.check(action)
    }

    fn check(&self, action: &str) -> Result<(), PluginError> {
        self.spec.panic_if(action);
        if self.spec.fail_at == Some(action) {
            return Err(PluginError::Failure(format!("{} {action} failed", self.spec.id)));
        }
        Ok(())
    }

    fn dispose(&self) {
        self.record("dispose");
    }
}

pub struct FakeDetector(Fake);

impl FakeDetector {
    pub fn new(probe: &Arc<Probe>, spec: FakeSpec) -> Self {
        Self(Fake::new("detection", probe, spec))
    }
}

impl PluginCapability for FakeDetector {
    fn dispose(&self) {
        self.0.dispose();
    }
}

#[async_trait]
impl Detector for FakeDetector {
    async fn initialize(&self) -> Result<(), PluginError> {
        self.0.step("initialize").await
    }

    async fn start(&self) -> Result<(), PluginError> {
        self.0.record("start");
        self.0.check("start")
    }

    async fn post_initialize(&self) -> Result<(), PluginError> {
        self.0.record("post_initialize");
        self.0.check("post_initialize")
    }

    fn points(&self, cancel: CancellationToken) -> PointStream {
        self.0.record("points");
        let feed = self.0.spec.feed.as_ref().and_then(|feed| feed.lock().take());
        let Some(rx) = feed else {
            return Box::pin(stream::pending::<FeedItem>());
        };
        Box::pin(stream::unfold((rx, cancel), |(mut rx, cancel)| async move {
            let item = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                item = rx.recv() => item,
            };
            item.map(|item| (item, (rx, cancel)))
        }))
    }

    fn stop(&self) {
        self.0.record("stop");
    }
}

pub struct FakeSampler(Fake);

impl FakeSampler {
    pub fn new(probe: &Arc<Probe>, spec: FakeSpec) -> Self {
        Self(Fake::new("sampling", probe, spec))
    }
}

impl PluginCapability for FakeSampler {
    fn dispose(&self) {
        self.0.dispose();
    }
}

#[async_trait]
impl Sampler for FakeSampler {
    async fn post_initialize(&self) -> Result<(), PluginError> {
        self.0.step("post_initialize").await
    }

    async fn sample(&self, points: &[DetectedPoint]) -> Result<SampleMap, PluginError> {
        self.0.record(&format!("sample:{}", points.len()));
        self.0.check("sample")?;
        Ok(points
            .iter()
            .map(|point| {
                let sample = Sample {
                    x: point.x,
                    y: point.y,
                    channels: vec![point.x, point.y],
                };
                (point.id, sample)
            })
            .collect())
    }
}

pub struct FakeSonifier {
    inner: Fake,
    active: Mutex<Vec<PointId>>,
}

impl FakeSonifier {
    pub fn new(probe: &Arc<Probe>, spec: FakeSpec) -> Self {
        Self {
            inner: Fake::new("sonification", probe, spec),
            active: Mutex::new(Vec::new()),
        }
    }
}

impl PluginCapability for FakeSonifier {
    fn dispose(&self) {
        self.inner.dispose();
    }
}

#[async_trait]
impl Sonifier for FakeSonifier {
    async fn initialize(&self) -> Result<(), PluginError> {
        self.inner.step("initialize").await
    }

    async fn process_samples(&self, samples: &SampleMap) -> Result<(), PluginError> {
        self.inner.record(&format!("process:{}", samples.len()));
        self.inner.check("process")?;
        *self.active.lock() = samples.keys().copied().collect();
        Ok(())
    }

    fn debug_tones(&self) -> Vec<DebugTone> {
        self.active
            .lock()
            .iter()
            .map(|&point_id| DebugTone {
                point_id,
                frequency_hz: 440.0,
                gain: 0.5,
            })
            .collect()
    }

    fn analyser_tap(&self) -> Option<AnalyserTap> {
        Some(Arc::new(self.inner.spec.id.to_string()))
    }

    fn stop(&self) {
        self.inner.record("stop");
    }
}

pub fn detector_definition(probe: &Arc<Probe>, spec: FakeSpec) -> PluginDefinition<dyn Detector> {
    let probe = Arc::clone(probe);
    PluginDefinition::from_fn(spec.id, json!({}), move |_config, _ctx| {
        let probe = Arc::clone(&probe);
        let spec = spec.clone();
        async move {
            probe.record(format!("detection:{}:create", spec.id));
            spec.panic_if("create");
            if spec.fail_create {
                return Err(PluginError::Unavailable(spec.id.to_string()));
            }
            Ok(Box::new(FakeDetector::new(&probe, spec)) as Box<dyn Detector>)
        }
    })
}

pub fn sampler_definition(probe: &Arc<Probe>, spec: FakeSpec) -> PluginDefinition<dyn Sampler> {
    let probe = Arc::clone(probe);
    PluginDefinition::from_fn(spec.id, json!({}), move |_config, _ctx| {
        let probe = Arc::clone(&probe);
        let spec = spec.clone();
        async move {
            probe.record(format!("sampling:{}:create", spec.id));
            spec.panic_if("create");
            if spec.fail_create {
                return Err(PluginError::Unavailable(spec.id.to_string()));
            }
            Ok(Box::new(FakeSampler::new(&probe, spec)) as Box<dyn Sampler>)
        }
    })
}

pub fn sonifier_definition(probe: &Arc<Probe>, spec: FakeSpec) -> PluginDefinition<dyn Sonifier> {
    let probe = Arc::clone(probe);
    PluginDefinition::from_fn(spec.id, json!({}), move |_config, _ctx| {
        let probe = Arc::clone(&probe);
        let spec = spec.clone();
        async move {
            probe.record(format!("sonification:{}:create", spec.id));
            spec.panic_if("create");
            if spec.fail_create {
                return Err(PluginError::Unavailable(spec.id.to_string()));
            }
            Ok(Box::new(FakeSonifier::new(&probe, spec)) as Box<dyn Sonifier>)
        }
    })
}

pub fn registry(
    probe: &Arc<Probe>,
    detectors: Vec<FakeSpec>,
    samplers: Vec<FakeSpec>,
    sonifiers: Vec<FakeSpec>,
) -> Arc<PluginRegistry> {
    let mut registry = PluginRegistry::new();
    for spec in detectors {
        registry
            .register_detector(detector_definition(probe, spec))
            .expect("register detector");
    }
    for spec in samplers {
        registry
            .register_sampler(sampler_definition(probe, spec))
            .expect("register sampler");
    }
    for spec in sonifiers {
        registry
            .register_sonifier(sonifier_definition(probe, spec))
            .expect("register sonifier");
    }
    Arc::new(registry)
}

pub fn transaction_deps(registry: Arc<PluginRegistry>) -> TransactionDeps {
    TransactionDeps {
        registry,
        configs: PluginConfigStore::new(),
        outputs: OutputTargets::new(),
    }
}

pub async fn eventually(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(TEST_TIMEOUT, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

pub async fn settle(manager: &LifecycleManager) {
    tokio::time::timeout(TEST_TIMEOUT, manager.wait_idle())
        .await
        .expect("lifecycle manager did not settle");
}

/// Builds a handle triple directly, bypassing the lifecycle manager.
pub fn direct_handles(
    probe: &Arc<Probe>,
    detector: FakeSpec,
    sampler: FakeSpec,
    sonifier: FakeSpec,
) -> EngineHandles {
    EngineHandles {
        detector: PluginHandle::<dyn Detector>::new(
            detector.id,
            Box::new(FakeDetector::new(probe, detector)),
        ),
        sampler: PluginHandle::<dyn Sampler>::new(
            sampler.id,
            Box::new(FakeSampler::new(probe, sampler)),
        ),
        sonifier: PluginHandle::<dyn Sonifier>::new(
            sonifier.id,
            Box::new(FakeSonifier::new(probe, sonifier)),
        ),
    }
}

pub fn point(id: PointId, x: f32, y: f32) -> DetectedPoint {
    DetectedPoint::new(id, x, y)
}
