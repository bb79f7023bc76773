//! Derives online/offline state from connection registry transitions.
//!
//! Presence flips on the 0→1 and 1→0 connection-count transitions only; a
//! second device connecting or one of several devices dropping changes
//! nothing. This is what distinguishes presence from raw connection
//! counting.

use std::sync::Arc;

use serde_json::json;

use tether_models::gateway::EVENT_USER_OFFLINE;

use crate::error::CoreError;
use crate::events::EventBus;
use crate::registry::{ConnectTransition, ConnectionRegistry, DisconnectTransition};
use crate::rooms::RoomMembershipCoordinator;
use crate::store::UserDirectory;

pub struct PresenceTracker {
    registry: Arc<ConnectionRegistry>,
    rooms: RoomMembershipCoordinator,
    users: Arc<dyn UserDirectory>,
    bus: EventBus,
}

impl PresenceTracker {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        rooms: RoomMembershipCoordinator,
        users: Arc<dyn UserDirectory>,
        bus: EventBus,
    ) -> Self {
        Self {
            registry,
            rooms,
            users,
            bus,
        }
    }

    /// Register a validated connection. On the 0→1 transition the user is
    /// marked online and their new connection is reconciled into every
    /// group room the durable store lists them in; additional devices
    /// subscribe to those rooms without re-firing the online signal.
    pub async fn connection_opened(
        &self,
        user_id: &str,
        connection_id: &str,
    ) -> Result<(), CoreError> {
        match self.registry.register(user_id, connection_id) {
            ConnectTransition::CameOnline => {
                if let Err(err) = self.users.set_online(user_id, true).await {
                    tracing::warn!(user_id, %err, "failed to project online status");
                }
                self.rooms.reconcile_on_reconnect(user_id, connection_id).await
            }
            ConnectTransition::AlreadyOnline => {
                self.rooms
                    .subscribe_member_rooms(user_id, connection_id, false)
                    .await
            }
        }
    }

    /// Tear down a connection: unregister it everywhere synchronously. On
    /// the 1→0 transition, every group room the user was a subscribed
    /// member of is told they went offline.
    pub async fn connection_closed(&self, connection_id: &str) {
        let Some((user_id, transition)) = self.registry.unregister(connection_id) else {
            return;
        };
        let affected = self.rooms.drop_connection(&user_id, connection_id);
        if transition == DisconnectTransition::StillOnline {
            return;
        }
        if let Err(err) = self.users.set_online(&user_id, false).await {
            tracing::warn!(user_id, %err, "failed to project offline status");
        }
        for (group_id, remaining) in affected {
            self.bus.emit(
                EVENT_USER_OFFLINE,
                json!({ "groupId": group_id, "userId": user_id }),
                remaining,
            );
        }
        tracing::info!(user_id, "user went offline");
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.registry.is_online(user_id)
    }
}
