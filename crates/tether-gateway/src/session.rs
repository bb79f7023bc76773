use chrono::{DateTime, Utc};

use tether_models::{ConnectionId, UserId};

/// Identity of one live connection, resolved once at handshake time and
/// never re-derived from client-supplied event fields.
pub struct Session {
    pub user_id: UserId,
    pub connection_id: ConnectionId,
    pub established_at: DateTime<Utc>,
}

impl Session {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            connection_id: uuid::Uuid::new_v4().to_string(),
            established_at: Utc::now(),
        }
    }

    pub fn should_receive(&self, connection_ids: &[ConnectionId]) -> bool {
        connection_ids.iter().any(|c| c == &self.connection_id)
    }
}
