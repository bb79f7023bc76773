use std::collections::HashSet;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use tether_models::{ConnectionId, UserId};

/// A live connection bound to exactly one user.
#[derive(Debug, Clone)]
pub struct Connection {
    pub connection_id: ConnectionId,
    pub user_id: UserId,
    pub established_at: DateTime<Utc>,
}

/// Outcome of binding a connection, distinguishing the 0→1 transition
/// from an additional device of an already-online user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectTransition {
    CameOnline,
    AlreadyOnline,
}

/// Outcome of removing a connection, distinguishing the 1→0 transition
/// from a user who still has other live connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectTransition {
    WentOffline,
    StillOnline,
}

/// Maps user identities to their live connection handles. Owned by the
/// gateway process; callers must have validated the user before
/// registering so no partial mapping is ever stored.
#[derive(Default)]
pub struct ConnectionRegistry {
    by_user: DashMap<UserId, HashSet<ConnectionId>>,
    by_connection: DashMap<ConnectionId, Connection>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a connection to a user. A second connection under a different
    /// id coexists (multi-device); re-registering the same id is
    /// idempotent.
    pub fn register(&self, user_id: &str, connection_id: &str) -> ConnectTransition {
        self.by_connection
            .entry(connection_id.to_string())
            .or_insert_with(|| Connection {
                connection_id: connection_id.to_string(),
                user_id: user_id.to_string(),
                established_at: Utc::now(),
            });
        let mut connections = self.by_user.entry(user_id.to_string()).or_default();
        let was_offline = connections.is_empty();
        connections.insert(connection_id.to_string());
        if was_offline {
            ConnectTransition::CameOnline
        } else {
            ConnectTransition::AlreadyOnline
        }
    }

    /// Remove a single connection. Other connections of the same user
    /// remain bound.
    pub fn unregister(&self, connection_id: &str) -> Option<(UserId, DisconnectTransition)> {
        let (_, connection) = self.by_connection.remove(connection_id)?;
        let user_id = connection.user_id;
        let mut went_offline = false;
        if let Some(mut connections) = self.by_user.get_mut(&user_id) {
            connections.remove(connection_id);
            went_offline = connections.is_empty();
        }
        if went_offline {
            self.by_user.remove_if(&user_id, |_, conns| conns.is_empty());
            Some((user_id, DisconnectTransition::WentOffline))
        } else {
            Some((user_id, DisconnectTransition::StillOnline))
        }
    }

    pub fn connections_for(&self, user_id: &str) -> Vec<ConnectionId> {
        self.by_user
            .get(user_id)
            .map(|conns| conns.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn user_for(&self, connection_id: &str) -> Option<UserId> {
        self.by_connection
            .get(connection_id)
            .map(|c| c.user_id.clone())
    }

    /// Derived presence: a user is online iff they have at least one live
    /// connection.
    pub fn is_online(&self, user_id: &str) -> bool {
        self.by_user
            .get(user_id)
            .map(|conns| !conns.is_empty())
            .unwrap_or(false)
    }
}
