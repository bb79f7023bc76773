use serde::{Deserialize, Serialize};

use crate::message::MessageType;
use crate::{GroupId, MessageId, RoomId, UserId};

// Server -> client event names
pub const EVENT_RECEIVE_MESSAGE: &str = "receiveMessage";
pub const EVENT_TYPING_UPDATE: &str = "typingUpdate";
pub const EVENT_GROUP_TYPING_UPDATE: &str = "groupTypingUpdate";
pub const EVENT_NEW_GROUP_MESSAGE: &str = "newGroupMessage";
pub const EVENT_GROUP_MEMBER_JOINED: &str = "groupMemberJoined";
pub const EVENT_GROUP_MEMBER_LEFT: &str = "groupMemberLeft";
pub const EVENT_ADMIN_TRANSFERRED: &str = "adminTransferred";
pub const EVENT_MESSAGE_READ: &str = "messageRead";
pub const EVENT_USER_ONLINE: &str = "userOnline";
pub const EVENT_USER_OFFLINE: &str = "userOffline";
pub const EVENT_JOIN_CHAT: &str = "joinChat";
pub const EVENT_ERROR: &str = "error";

// Per-operation acknowledgements, emitted only to the originating
// connection.
pub const EVENT_JOIN_GROUP_ACK: &str = "joinGroupAck";
pub const EVENT_LEAVE_GROUP_ACK: &str = "leaveGroupAck";
pub const EVENT_SEND_MESSAGE_TO_GROUP_ACK: &str = "sendMessageToGroupAck";
pub const EVENT_MARK_MESSAGE_AS_READ_ACK: &str = "markMessageAsReadAck";
pub const EVENT_TRANSFER_ADMIN_ACK: &str = "transferAdminAck";

/// Inbound real-time events. Tagged by event name; unknown names or
/// malformed payloads fail deserialization and are rejected at the
/// gateway boundary.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    JoinRoom { room_id: RoomId },
    #[serde(rename_all = "camelCase")]
    TypingStart {
        sender_id: UserId,
        receiver_id: UserId,
    },
    #[serde(rename_all = "camelCase")]
    SendMessage {
        receiver_id: UserId,
        content: String,
        #[serde(default)]
        message_type: Option<MessageType>,
        #[serde(default)]
        file_name: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    JoinGroup { group_id: GroupId, user_id: UserId },
    #[serde(rename_all = "camelCase")]
    LeaveGroup { group_id: GroupId, user_id: UserId },
    #[serde(rename_all = "camelCase")]
    SendMessageToGroup {
        group_id: GroupId,
        content: String,
        #[serde(default)]
        message_type: Option<MessageType>,
        #[serde(default)]
        reply_to: Option<MessageId>,
        #[serde(default)]
        file_name: Option<String>,
        #[serde(default)]
        file_type: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    TypingInGroup { group_id: GroupId, is_typing: bool },
    #[serde(rename_all = "camelCase")]
    MarkMessageAsRead {
        group_id: Option<GroupId>,
        message_id: MessageId,
    },
    #[serde(rename_all = "camelCase")]
    TransferAdmin {
        group_id: GroupId,
        new_admin_id: UserId,
    },
}

/// Outbound frame shape: `{"event": <name>, "data": {...}}`.
#[derive(Debug, Clone, Serialize)]
pub struct ServerFrame<'a> {
    pub event: &'a str,
    pub data: serde_json::Value,
}

impl<'a> ServerFrame<'a> {
    pub fn new(event: &'a str, data: serde_json::Value) -> Self {
        Self { event, data }
    }
}
