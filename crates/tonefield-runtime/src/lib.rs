use std::collections::HashMap;
use std::future::Future;
use std::sync::OnceLock;

use parking_lot::Mutex;
use tokio::runtime::{Builder, Runtime};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, debug_span};

/// Process-wide runtime for engine background tasks, so they can be started
/// from synchronous call sites and outlive the caller's own executor.
fn runtime() -> &'static Runtime {
    static RUNTIME: OnceLock<Runtime> = OnceLock::new();
    RUNTIME.get_or_init(|| {
        Builder::new_multi_thread()
            .enable_all()
            .thread_name("tonefield-runtime")
            .build()
            .expect("failed to build shared tokio runtime")
    })
}

fn live_tasks() -> &'static Mutex<HashMap<&'static str, usize>> {
    static LIVE: OnceLock<Mutex<HashMap<&'static str, usize>>> = OnceLock::new();
    LIVE.get_or_init(Default::default)
}

/// Counts a named task as live until dropped, including on panic or abort.
struct LiveTask(&'static str);

impl LiveTask {
    fn enter(name: &'static str) -> Self {
        *live_tasks().lock().entry(name).or_default() += 1;
        Self(name)
    }
}

impl Drop for LiveTask {
    fn drop(&mut self) {
        let mut live = live_tasks().lock();
        if let Some(count) = live.get_mut(self.0) {
            *count -= 1;
            if *count == 0 {
                live.remove(self.0);
            }
        }
    }
}

/// Spawns an engine task on the shared runtime under a `task` span.
///
/// The task counts towards [`running`] for `name` from spawn until its
/// future completes, panics, or is aborted.
pub fn spawn_named<F>(name: &'static str, future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let live = LiveTask::enter(name);
    let span = debug_span!("task", name);
    runtime().spawn(
        async move {
            let _live = live;
            debug!("task started");
            let output = future.await;
            debug!("task finished");
            output
        }
        .instrument(span),
    )
}

/// Number of live tasks spawned under `name`.
pub fn running(name: &str) -> usize {
    live_tasks().lock().get(name).copied().unwrap_or(0)
}
