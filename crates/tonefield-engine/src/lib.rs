#![deny(clippy::wildcard_imports)]

pub mod engine;
pub mod error;
mod event_hub;
pub mod frame_data;
pub mod lifecycle;
pub mod registry;
pub mod resolver;
pub mod snapshot;
pub mod transaction;
pub mod transport;
pub mod types;

pub use engine::{Engine, EngineDeps};
pub use error::{
    InitStage, LifecycleError, RegistryError, ResolutionError, TransactionError, TransportError,
};
pub use frame_data::{VisualizerFrame, VisualizerFrameData};
pub use lifecycle::LifecycleManager;
pub use registry::PluginRegistry;
pub use snapshot::{CommittedPipeline, EngineHandles, EngineSnapshot};
pub use transaction::{TransactionDeps, run_engine_init_transaction};
pub use transport::TransportLoop;
pub use types::{
    ActivePluginIds, EngineConfig, EngineEvent, EngineStatus, PluginSelection, StopOptions,
    TransportConfig, TransportStatus,
};
