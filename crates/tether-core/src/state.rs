use std::sync::Arc;

use crate::dispatch::MessageDispatcher;
use crate::events::EventBus;
use crate::presence::PresenceTracker;
use crate::registry::ConnectionRegistry;
use crate::rooms::RoomMembershipCoordinator;
use crate::store::{GroupStore, MessageStore, UserDirectory};
use crate::typing::TypingCoordinator;

/// Everything the gateway needs, wired once at process start. All shared
/// mutable state lives inside the coordinators; nothing is ambient.
#[derive(Clone)]
pub struct AppState {
    pub bus: EventBus,
    pub registry: Arc<ConnectionRegistry>,
    pub rooms: RoomMembershipCoordinator,
    pub presence: Arc<PresenceTracker>,
    pub typing: Arc<TypingCoordinator>,
    pub dispatcher: Arc<MessageDispatcher>,
    pub users: Arc<dyn UserDirectory>,
}

impl AppState {
    pub fn new(
        users: Arc<dyn UserDirectory>,
        groups: Arc<dyn GroupStore>,
        messages: Arc<dyn MessageStore>,
    ) -> Self {
        let bus = EventBus::default();
        let registry = Arc::new(ConnectionRegistry::new());
        let rooms = RoomMembershipCoordinator::new(
            groups.clone(),
            users.clone(),
            registry.clone(),
            bus.clone(),
        );
        let presence = Arc::new(PresenceTracker::new(
            registry.clone(),
            rooms.clone(),
            users.clone(),
            bus.clone(),
        ));
        let typing = Arc::new(TypingCoordinator::new(
            registry.clone(),
            rooms.clone(),
            bus.clone(),
        ));
        let dispatcher = Arc::new(MessageDispatcher::new(
            registry.clone(),
            rooms.clone(),
            users.clone(),
            messages,
            groups,
            bus.clone(),
        ));
        Self {
            bus,
            registry,
            rooms,
            presence,
            typing,
            dispatcher,
            users,
        }
    }
}
