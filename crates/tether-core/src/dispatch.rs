//! Computes delivery sets for saved messages and emits the corresponding
//! gateway events. Failure to deliver live is never an error: an offline
//! recipient still gets the message durably saved and is simply skipped
//! here with a log note.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::json;

use tether_models::gateway::{
    EVENT_JOIN_CHAT, EVENT_MESSAGE_READ, EVENT_NEW_GROUP_MESSAGE, EVENT_RECEIVE_MESSAGE,
};
use tether_models::message::{MessageEnvelope, MessageType};
use tether_models::{group_room_id, ConnectionId, GroupId, MessageId, UserId};

use crate::error::CoreError;
use crate::events::EventBus;
use crate::registry::ConnectionRegistry;
use crate::rooms::RoomMembershipCoordinator;
use crate::store::{GroupStore, MessageStore, NewMessage, UserDirectory};

#[derive(Debug, Clone)]
pub struct DirectMessageInput {
    pub receiver_id: UserId,
    pub content: String,
    pub message_type: MessageType,
    pub file_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GroupMessageInput {
    pub group_id: GroupId,
    pub content: String,
    pub message_type: MessageType,
    pub reply_to: Option<MessageId>,
    pub file_name: Option<String>,
    pub file_type: Option<String>,
}

#[derive(Clone)]
pub struct MessageDispatcher {
    registry: Arc<ConnectionRegistry>,
    rooms: RoomMembershipCoordinator,
    users: Arc<dyn UserDirectory>,
    messages: Arc<dyn MessageStore>,
    groups: Arc<dyn GroupStore>,
    bus: EventBus,
}

impl MessageDispatcher {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        rooms: RoomMembershipCoordinator,
        users: Arc<dyn UserDirectory>,
        messages: Arc<dyn MessageStore>,
        groups: Arc<dyn GroupStore>,
        bus: EventBus,
    ) -> Self {
        Self {
            registry,
            rooms,
            users,
            messages,
            groups,
            bus,
        }
    }

    /// Persist and deliver a direct message. The sender's originating
    /// connection gets a `joinChat` room hint so its other open views can
    /// subscribe; the recipient's live connections (and any other
    /// connections already in the chat room) get `receiveMessage`.
    pub async fn dispatch_direct(
        &self,
        sender_id: &str,
        origin: &ConnectionId,
        input: DirectMessageInput,
    ) -> Result<MessageEnvelope, CoreError> {
        if self.users.find(&input.receiver_id).await?.is_none() {
            return Err(CoreError::NotFound("User"));
        }

        let message = self
            .messages
            .create(NewMessage {
                sender_id: sender_id.to_string(),
                recipient_id: Some(input.receiver_id.clone()),
                group_id: None,
                content: input.content,
                message_type: input.message_type,
                reply_to: None,
                file_name: input.file_name,
                file_type: None,
            })
            .await?;

        let chat = self
            .messages
            .find_or_create_chat(sender_id, &input.receiver_id)
            .await?;
        self.messages.append_to_chat(&chat.id, &message.id).await?;

        self.bus.emit(
            EVENT_JOIN_CHAT,
            json!({ "chatId": chat.id }),
            vec![origin.clone()],
        );

        let mut delivery: HashSet<ConnectionId> = self
            .registry
            .connections_for(&input.receiver_id)
            .into_iter()
            .collect();
        if delivery.is_empty() {
            tracing::warn!(
                recipient_id = %input.receiver_id,
                message_id = %message.id,
                "recipient has no live connection, delivery skipped"
            );
        }
        for connection in self.rooms.subscribers(&chat.id) {
            if connection != *origin {
                delivery.insert(connection);
            }
        }
        self.bus.emit(
            EVENT_RECEIVE_MESSAGE,
            serde_json::to_value(&message).map_err(|e| CoreError::Internal(e.to_string()))?,
            delivery.into_iter().collect(),
        );
        Ok(message)
    }

    /// Persist and deliver a group message to the room's current live
    /// subscriber set. A non-member is rejected before anything is
    /// persisted.
    pub async fn dispatch_to_group(
        &self,
        sender_id: &str,
        input: GroupMessageInput,
    ) -> Result<MessageEnvelope, CoreError> {
        let group = self
            .groups
            .find(&input.group_id)
            .await?
            .ok_or(CoreError::NotFound("Group"))?;
        if !group.is_member(sender_id) {
            return Err(CoreError::NotAMember);
        }

        let message = self
            .messages
            .create(NewMessage {
                sender_id: sender_id.to_string(),
                recipient_id: None,
                group_id: Some(input.group_id.clone()),
                content: input.content,
                message_type: input.message_type,
                reply_to: input.reply_to,
                file_name: input.file_name,
                file_type: input.file_type,
            })
            .await?;
        self.groups.add_message(&input.group_id, &message.id).await?;

        tracing::debug!(
            group_id = %input.group_id,
            sender_id,
            message_id = %message.id,
            "group message dispatched"
        );
        self.bus.emit(
            EVENT_NEW_GROUP_MESSAGE,
            json!({
                "groupId": input.group_id,
                "senderId": sender_id,
                "message": message,
            }),
            self.rooms.subscribers(&group_room_id(&input.group_id)),
        );
        Ok(message)
    }

    /// Mark a message read by `reader_id` and notify the original sender
    /// best-effort. Repeat calls leave `read_by` unchanged and emit no
    /// second notification. The receipt's group scope comes from the
    /// stored message, never from the caller.
    pub async fn mark_read(
        &self,
        reader_id: &str,
        message_id: &str,
    ) -> Result<MessageEnvelope, CoreError> {
        let message = self
            .messages
            .find(message_id)
            .await?
            .ok_or(CoreError::NotFound("Message"))?;

        match &message.group_id {
            Some(gid) => {
                let group = self
                    .groups
                    .find(gid)
                    .await?
                    .ok_or(CoreError::NotFound("Group"))?;
                if !group.is_member(reader_id) {
                    return Err(CoreError::NotAMember);
                }
            }
            None => {
                let is_recipient = message.recipient_id.as_deref() == Some(reader_id);
                if !is_recipient && message.sender_id != reader_id {
                    return Err(CoreError::Forbidden("not a recipient of this message"));
                }
            }
        }

        let outcome = self.messages.mark_read(message_id, reader_id).await?;
        if outcome.newly_read && outcome.message.sender_id != reader_id {
            let sender_connections = self.registry.connections_for(&outcome.message.sender_id);
            self.bus.emit(
                EVENT_MESSAGE_READ,
                json!({
                    "groupId": outcome.message.group_id,
                    "messageId": message_id,
                    "userId": reader_id,
                }),
                sender_connections,
            );
        }
        Ok(outcome.message)
    }
}
