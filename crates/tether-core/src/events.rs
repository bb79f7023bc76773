use tokio::sync::broadcast;

use tether_models::ConnectionId;

/// An outbound event with its resolved delivery set. Coordinators compute
/// the target connections up front; gateway sessions filter on their own
/// connection id, so per-connection ordering follows the broadcast order.
#[derive(Debug, Clone)]
pub struct GatewayEvent {
    pub event_type: String,
    pub payload: serde_json::Value,
    pub connection_ids: Vec<ConnectionId>,
}

/// Broadcast-based event bus for real-time dispatch.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<GatewayEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to the given connections. Empty delivery sets and
    /// missing receivers are silently ignored.
    pub fn emit(
        &self,
        event_type: &str,
        payload: serde_json::Value,
        connection_ids: Vec<ConnectionId>,
    ) {
        if connection_ids.is_empty() {
            return;
        }
        let _ = self.sender.send(GatewayEvent {
            event_type: event_type.to_string(),
            payload,
            connection_ids,
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(4096)
    }
}
