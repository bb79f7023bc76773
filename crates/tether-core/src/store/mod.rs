//! Seams to the durable collaborators. The real-time layer treats each
//! call as a black box with at-least atomic single-document semantics;
//! the in-memory implementation in [`memory`] is the reference used by
//! the standalone server and the test suite.

pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

use tether_models::group::GroupRecord;
use tether_models::message::{MessageEnvelope, MessageType};
use tether_models::user::UserProfile;
use tether_models::{GroupId, MessageId, RoomId, UserId};

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Input for creating a message. Exactly one of `recipient_id` /
/// `group_id` is set.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub sender_id: UserId,
    pub recipient_id: Option<UserId>,
    pub group_id: Option<GroupId>,
    pub content: String,
    pub message_type: MessageType,
    pub reply_to: Option<MessageId>,
    pub file_name: Option<String>,
    pub file_type: Option<String>,
}

/// Result of the conditional membership insert.
#[derive(Debug, Clone)]
pub enum JoinOutcome {
    /// The user was added; the returned record includes them.
    Joined(GroupRecord),
    /// The record already listed the user; nothing was written.
    AlreadyMember,
}

#[derive(Debug, Clone)]
pub struct MarkReadOutcome {
    pub message: MessageEnvelope,
    /// False when the reader was already in `read_by` (idempotent repeat).
    pub newly_read: bool,
}

/// Durable direct-chat document linking two users to their message history.
#[derive(Debug, Clone)]
pub struct ChatRecord {
    pub id: RoomId,
    pub participants: (UserId, UserId),
    pub messages: Vec<MessageId>,
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find(&self, user_id: &str) -> Result<Option<UserProfile>, StoreError>;
    /// Best-effort projection of derived presence onto the user record.
    async fn set_online(&self, user_id: &str, online: bool) -> Result<(), StoreError>;
}

#[async_trait]
pub trait GroupStore: Send + Sync {
    async fn find(&self, group_id: &str) -> Result<Option<GroupRecord>, StoreError>;
    async fn groups_for_member(&self, user_id: &str) -> Result<Vec<GroupRecord>, StoreError>;
    /// Atomically add `user_id` to the member set only if absent.
    /// Fails `NotFound` when the group does not exist.
    async fn add_member_if_absent(
        &self,
        group_id: &str,
        user_id: &str,
    ) -> Result<JoinOutcome, StoreError>;
    /// Atomically remove `user_id` if currently a member. `Ok(None)` means
    /// the user was not a member; the record is unchanged.
    async fn remove_member(
        &self,
        group_id: &str,
        user_id: &str,
    ) -> Result<Option<GroupRecord>, StoreError>;
    async fn set_admin(&self, group_id: &str, new_admin_id: &str)
        -> Result<GroupRecord, StoreError>;
    /// Delete the group and its membership (admin-leave cascade).
    async fn delete(&self, group_id: &str) -> Result<GroupRecord, StoreError>;
    async fn add_message(&self, group_id: &str, message_id: &str) -> Result<(), StoreError>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn create(&self, message: NewMessage) -> Result<MessageEnvelope, StoreError>;
    async fn find(&self, message_id: &str) -> Result<Option<MessageEnvelope>, StoreError>;
    /// Add the reader to `read_by` if absent. Repeat calls are no-ops.
    async fn mark_read(
        &self,
        message_id: &str,
        reader_id: &str,
    ) -> Result<MarkReadOutcome, StoreError>;
    /// Find the chat document between two users, creating it on first
    /// contact. The chat id doubles as the direct-chat room id.
    async fn find_or_create_chat(&self, a: &str, b: &str) -> Result<ChatRecord, StoreError>;
    async fn append_to_chat(&self, chat_id: &str, message_id: &str) -> Result<(), StoreError>;
}
