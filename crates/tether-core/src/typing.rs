//! Ephemeral typing signals. Nothing here is ever persisted: the server
//! only debounces emission per (sender, target) pair; clearing a stale
//! indicator is the receiving client's job after [`TYPING_EXPIRY`] with
//! no further signal.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::json;
use tokio::time::{Duration, Instant};

use tether_models::gateway::{EVENT_GROUP_TYPING_UPDATE, EVENT_TYPING_UPDATE};
use tether_models::{group_room_id, UserId};

use crate::events::EventBus;
use crate::registry::ConnectionRegistry;
use crate::rooms::RoomMembershipCoordinator;

/// Emit at most one typing update per sender/target pair per window.
pub const TYPING_DEBOUNCE: Duration = Duration::from_millis(500);
/// Receiver-side indicator lifetime; the server runs no expiry sweep.
pub const TYPING_EXPIRY: Duration = Duration::from_secs(3);

const DEBOUNCE_MAP_PRUNE_THRESHOLD: usize = 4096;

pub struct TypingCoordinator {
    /// Last emission instant per (sender, target) pair.
    last_emit: DashMap<(UserId, String), Instant>,
    registry: Arc<ConnectionRegistry>,
    rooms: RoomMembershipCoordinator,
    bus: EventBus,
    window: Duration,
}

impl TypingCoordinator {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        rooms: RoomMembershipCoordinator,
        bus: EventBus,
    ) -> Self {
        Self::with_window(registry, rooms, bus, TYPING_DEBOUNCE)
    }

    pub fn with_window(
        registry: Arc<ConnectionRegistry>,
        rooms: RoomMembershipCoordinator,
        bus: EventBus,
        window: Duration,
    ) -> Self {
        Self {
            last_emit: DashMap::new(),
            registry,
            rooms,
            bus,
            window,
        }
    }

    /// Typing toward a direct peer. Emits `typingUpdate` to the peer's
    /// live connections; an offline peer is a silent no-op.
    pub fn start_typing_direct(&self, sender_id: &str, receiver_id: &str) {
        if !self.should_emit(sender_id, receiver_id) {
            return;
        }
        let connections = self.registry.connections_for(receiver_id);
        if connections.is_empty() {
            tracing::trace!(sender_id, receiver_id, "typing target offline, skipped");
            return;
        }
        self.bus.emit(
            EVENT_TYPING_UPDATE,
            json!({ "senderId": sender_id }),
            connections,
        );
    }

    /// Typing inside a group room, excluding all of the sender's own
    /// connections. An explicit stop (`is_typing == false`) bypasses the
    /// debounce and clears the pair state so the next start emits
    /// immediately.
    pub fn typing_in_group(&self, sender_id: &str, group_id: &str, is_typing: bool) {
        if is_typing {
            if !self.should_emit(sender_id, group_id) {
                return;
            }
        } else {
            self.last_emit
                .remove(&(sender_id.to_string(), group_id.to_string()));
        }
        let own: std::collections::HashSet<_> =
            self.registry.connections_for(sender_id).into_iter().collect();
        let targets: Vec<_> = self
            .rooms
            .subscribers(&group_room_id(group_id))
            .into_iter()
            .filter(|c| !own.contains(c))
            .collect();
        self.bus.emit(
            EVENT_GROUP_TYPING_UPDATE,
            json!({ "groupId": group_id, "senderId": sender_id, "isTyping": is_typing }),
            targets,
        );
    }

    fn should_emit(&self, sender_id: &str, target: &str) -> bool {
        if self.last_emit.len() > DEBOUNCE_MAP_PRUNE_THRESHOLD {
            let horizon = self.window.max(TYPING_EXPIRY);
            self.last_emit.retain(|_, emitted| emitted.elapsed() < horizon);
        }
        let key = (sender_id.to_string(), target.to_string());
        match self.last_emit.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(mut entry) => {
                if entry.get().elapsed() < self.window {
                    return false;
                }
                entry.insert(Instant::now());
                true
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Instant::now());
                true
            }
        }
    }
}
