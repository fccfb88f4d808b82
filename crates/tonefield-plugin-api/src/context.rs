use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value;

use crate::slot::PluginSlot;

type ConfigListener = Arc<dyn Fn(&Value) + Send + Sync>;

#[derive(Default)]
struct StoreState {
    values: HashMap<String, Value>,
    listeners: HashMap<String, Vec<(u64, ConfigListener)>>,
    next_listener_id: u64,
}

/// Per-plugin configuration values with change notification.
///
/// Owned by the composition root and shared with every runtime context.
#[derive(Default)]
pub struct PluginConfigStore {
    state: Mutex<StoreState>,
}

impl PluginConfigStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn get(&self, plugin_id: &str) -> Option<Value> {
        self.state.lock().values.get(plugin_id).cloned()
    }

    /// Current value for `plugin_id`, or `default` when nothing is stored yet.
    pub fn get_or(&self, plugin_id: &str, default: &Value) -> Value {
        self.get(plugin_id).unwrap_or_else(|| default.clone())
    }

    pub fn set(&self, plugin_id: &str, value: Value) {
        let listeners = {
            let mut state = self.state.lock();
            state.values.insert(plugin_id.to_string(), value.clone());
            state.listeners.get(plugin_id).cloned().unwrap_or_default()
        };
        for (_, listener) in listeners {
            listener(&value);
        }
    }

    /// Shallow-merges `partial` over the current value (or `default`).
    pub fn merge(&self, plugin_id: &str, default: &Value, partial: Value) -> Value {
        let mut next = self.get_or(plugin_id, default);
        merge_shallow(&mut next, partial);
        self.set(plugin_id, next.clone());
        next
    }

    fn subscribe(self: &Arc<Self>, plugin_id: &str, listener: ConfigListener) -> ConfigSubscription {
        let mut state = self.state.lock();
        let id = state.next_listener_id;
        state.next_listener_id = state.next_listener_id.wrapping_add(1);
        state
            .listeners
            .entry(plugin_id.to_string())
            .or_default()
            .push((id, listener));
        ConfigSubscription {
            store: Arc::downgrade(self),
            plugin_id: plugin_id.to_string(),
            id,
        }
    }

    fn unsubscribe(&self, plugin_id: &str, id: u64) {
        let mut state = self.state.lock();
        if let Some(listeners) = state.listeners.get_mut(plugin_id) {
            listeners.retain(|(listener_id, _)| *listener_id != id);
            if listeners.is_empty() {
                state.listeners.remove(plugin_id);
            }
        }
    }
}

fn merge_shallow(target: &mut Value, partial: Value) {
    match (target, partial) {
        (Value::Object(current), Value::Object(patch)) => {
            for (key, value) in patch {
                current.insert(key, value);
            }
        },
        (target, partial) => *target = partial,
    }
}

/// Live config listener registration; dropping it unsubscribes.
pub struct ConfigSubscription {
    store: Weak<PluginConfigStore>,
    plugin_id: String,
    id: u64,
}

impl ConfigSubscription {
    pub fn unsubscribe(self) {}
}

impl Drop for ConfigSubscription {
    fn drop(&mut self) {
        if let Some(store) = self.store.upgrade() {
            store.unsubscribe(&self.plugin_id, self.id);
        }
    }
}

/// Capability injected into every plugin factory to read and write the
/// plugin's own configuration.
#[derive(Clone)]
pub struct RuntimeContext {
    slot: PluginSlot,
    plugin_id: String,
    default_config: Value,
    store: Arc<PluginConfigStore>,
}

impl RuntimeContext {
    pub fn new(
        slot: PluginSlot,
        plugin_id: impl Into<String>,
        default_config: Value,
        store: Arc<PluginConfigStore>,
    ) -> Self {
        Self {
            slot,
            plugin_id: plugin_id.into(),
            default_config,
            store,
        }
    }

    pub fn slot(&self) -> PluginSlot {
        self.slot
    }

    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    pub fn config(&self) -> Value {
        self.store.get_or(&self.plugin_id, &self.default_config)
    }

    pub fn set_config(&self, partial: Value) -> Value {
        self.store.merge(&self.plugin_id, &self.default_config, partial)
    }

    pub fn subscribe_config(
        &self,
        listener: impl Fn(&Value) + Send + Sync + 'static,
    ) -> ConfigSubscription {
        self.store.subscribe(&self.plugin_id, Arc::new(listener))
    }
}

impl fmt::Debug for PluginConfigStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("PluginConfigStore")
            .field("values", &state.values)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for RuntimeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeContext")
            .field("slot", &self.slot)
            .field("plugin_id", &self.plugin_id)
            .finish_non_exhaustive()
    }
}
