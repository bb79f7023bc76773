use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{GroupId, MessageId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    File,
}

/// A saved chat message as seen by the real-time layer. Owned by the
/// message store; immutable once dispatched apart from the `is_read` /
/// `read_by` projection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEnvelope {
    pub id: MessageId,
    pub sender_id: UserId,
    /// Set for direct messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<UserId>,
    /// Set for group messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<GroupId>,
    pub content: String,
    pub message_type: MessageType,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<MessageId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    pub is_read: bool,
    pub read_by: Vec<UserId>,
}

impl MessageEnvelope {
    pub fn is_direct(&self) -> bool {
        self.recipient_id.is_some()
    }
}
