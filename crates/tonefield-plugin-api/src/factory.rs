use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::RuntimeContext;
use crate::error::PluginError;

/// Creates capability instances for one plugin definition.
#[async_trait]
pub trait PluginFactory<C: ?Sized + Send + 'static>: Send + Sync {
    async fn create(&self, config: Value, ctx: RuntimeContext) -> Result<Box<C>, PluginError>;
}

struct FnFactory<F>(F);

#[async_trait]
impl<C, F, Fut> PluginFactory<C> for FnFactory<F>
where
    C: ?Sized + Send + 'static,
    F: Fn(Value, RuntimeContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Box<C>, PluginError>> + Send + 'static,
{
    async fn create(&self, config: Value, ctx: RuntimeContext) -> Result<Box<C>, PluginError> {
        (self.0)(config, ctx).await
    }
}

/// A registered plugin: stable id, default configuration and factory.
pub struct PluginDefinition<C: ?Sized + Send + 'static> {
    id: String,
    default_config: Value,
    factory: Arc<dyn PluginFactory<C>>,
}

impl<C: ?Sized + Send + 'static> PluginDefinition<C> {
    pub fn new(
        id: impl Into<String>,
        default_config: Value,
        factory: impl PluginFactory<C> + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            default_config,
            factory: Arc::new(factory),
        }
    }

    pub fn from_fn<F, Fut>(id: impl Into<String>, default_config: Value, create: F) -> Self
    where
        F: Fn(Value, RuntimeContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Box<C>, PluginError>> + Send + 'static,
    {
        Self::new(id, default_config, FnFactory(create))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn default_config(&self) -> &Value {
        &self.default_config
    }

    pub async fn create(&self, config: Value, ctx: RuntimeContext) -> Result<Box<C>, PluginError> {
        self.factory.create(config, ctx).await
    }
}

impl<C: ?Sized + Send + 'static> Clone for PluginDefinition<C> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            default_config: self.default_config.clone(),
            factory: Arc::clone(&self.factory),
        }
    }
}

impl<C: ?Sized + Send + 'static> fmt::Debug for PluginDefinition<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDefinition")
            .field("id", &self.id)
            .field("default_config", &self.default_config)
            .finish_non_exhaustive()
    }
}
