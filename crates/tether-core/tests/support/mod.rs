#![allow(dead_code)]

use std::sync::Arc;

use tokio::sync::broadcast;

use tether_core::events::GatewayEvent;
use tether_core::store::memory::MemoryStore;
use tether_core::AppState;

pub struct TestContext {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
}

impl TestContext {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let state = AppState::new(store.clone(), store.clone(), store.clone());
        Self { state, store }
    }

    /// Simulate a validated handshake: register the connection and run
    /// the presence/reconcile path the gateway runs.
    pub async fn connect(&self, user_id: &str, connection_id: &str) {
        self.state
            .presence
            .connection_opened(user_id, connection_id)
            .await
            .expect("connection_opened");
    }

    pub async fn disconnect(&self, connection_id: &str) {
        self.state.presence.connection_closed(connection_id).await;
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.state.bus.subscribe()
    }
}

/// Drain everything currently queued on the bus receiver.
pub fn drain(rx: &mut broadcast::Receiver<GatewayEvent>) -> Vec<GatewayEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// How many events of the given type were delivered to the given
/// connection.
pub fn delivered_to(events: &[GatewayEvent], event_type: &str, connection_id: &str) -> usize {
    events
        .iter()
        .filter(|e| {
            e.event_type == event_type && e.connection_ids.iter().any(|c| c == connection_id)
        })
        .count()
}

pub fn count_of(events: &[GatewayEvent], event_type: &str) -> usize {
    events.iter().filter(|e| e.event_type == event_type).count()
}
