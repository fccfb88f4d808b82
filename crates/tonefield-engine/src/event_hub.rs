use tokio::sync::broadcast;

use crate::types::EngineEvent;

pub(crate) struct EventHub {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventHub {
    pub(crate) fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    pub(crate) fn emit(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }
}
