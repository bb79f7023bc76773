//! In-memory store implementation with the same single-document atomicity
//! the durable backends provide. Used by the standalone server binary and
//! the test suite.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;

use tether_models::direct_room_id;
use tether_models::group::GroupRecord;
use tether_models::message::MessageEnvelope;
use tether_models::user::UserProfile;

use super::{
    ChatRecord, GroupStore, JoinOutcome, MarkReadOutcome, MessageStore, NewMessage, StoreError,
    UserDirectory,
};

#[derive(Default)]
pub struct MemoryStore {
    users: DashMap<String, UserProfile>,
    groups: DashMap<String, GroupRecord>,
    messages: DashMap<String, MessageEnvelope>,
    chats: DashMap<String, ChatRecord>,
    /// Counts actual membership inserts, for concurrency assertions.
    membership_writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_user(&self, id: &str, username: &str) -> UserProfile {
        let profile = UserProfile {
            id: id.to_string(),
            username: username.to_string(),
            email: None,
            avatar_url: None,
            is_online: false,
        };
        self.users.insert(id.to_string(), profile.clone());
        profile
    }

    pub fn seed_profile(&self, profile: UserProfile) {
        self.users.insert(profile.id.clone(), profile);
    }

    /// Create a group with the admin as initial member, mirroring the
    /// group service's create semantics.
    pub fn seed_group(&self, id: &str, name: &str, admin_id: &str, members: &[&str]) -> GroupRecord {
        let mut member_set: HashSet<String> = members.iter().map(|m| m.to_string()).collect();
        member_set.insert(admin_id.to_string());
        let record = GroupRecord {
            id: id.to_string(),
            name: name.to_string(),
            description: None,
            admin_id: admin_id.to_string(),
            members: member_set,
            messages: Vec::new(),
        };
        self.groups.insert(id.to_string(), record.clone());
        record
    }

    pub fn membership_write_count(&self) -> usize {
        self.membership_writes.load(Ordering::SeqCst)
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn find(&self, user_id: &str) -> Result<Option<UserProfile>, StoreError> {
        Ok(self.users.get(user_id).map(|p| p.clone()))
    }

    async fn set_online(&self, user_id: &str, online: bool) -> Result<(), StoreError> {
        match self.users.get_mut(user_id) {
            Some(mut profile) => {
                profile.is_online = online;
                Ok(())
            }
            None => Err(StoreError::NotFound),
        }
    }
}

#[async_trait]
impl GroupStore for MemoryStore {
    async fn find(&self, group_id: &str) -> Result<Option<GroupRecord>, StoreError> {
        Ok(self.groups.get(group_id).map(|g| g.clone()))
    }

    async fn groups_for_member(&self, user_id: &str) -> Result<Vec<GroupRecord>, StoreError> {
        Ok(self
            .groups
            .iter()
            .filter(|g| g.members.contains(user_id))
            .map(|g| g.clone())
            .collect())
    }

    async fn add_member_if_absent(
        &self,
        group_id: &str,
        user_id: &str,
    ) -> Result<JoinOutcome, StoreError> {
        let mut group = self.groups.get_mut(group_id).ok_or(StoreError::NotFound)?;
        if !group.members.insert(user_id.to_string()) {
            return Ok(JoinOutcome::AlreadyMember);
        }
        self.membership_writes.fetch_add(1, Ordering::SeqCst);
        Ok(JoinOutcome::Joined(group.clone()))
    }

    async fn remove_member(
        &self,
        group_id: &str,
        user_id: &str,
    ) -> Result<Option<GroupRecord>, StoreError> {
        let mut group = self.groups.get_mut(group_id).ok_or(StoreError::NotFound)?;
        if !group.members.remove(user_id) {
            return Ok(None);
        }
        Ok(Some(group.clone()))
    }

    async fn set_admin(
        &self,
        group_id: &str,
        new_admin_id: &str,
    ) -> Result<GroupRecord, StoreError> {
        let mut group = self.groups.get_mut(group_id).ok_or(StoreError::NotFound)?;
        group.admin_id = new_admin_id.to_string();
        Ok(group.clone())
    }

    async fn delete(&self, group_id: &str) -> Result<GroupRecord, StoreError> {
        self.groups
            .remove(group_id)
            .map(|(_, g)| g)
            .ok_or(StoreError::NotFound)
    }

    async fn add_message(&self, group_id: &str, message_id: &str) -> Result<(), StoreError> {
        let mut group = self.groups.get_mut(group_id).ok_or(StoreError::NotFound)?;
        group.messages.push(message_id.to_string());
        Ok(())
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn create(&self, message: NewMessage) -> Result<MessageEnvelope, StoreError> {
        let envelope = MessageEnvelope {
            id: uuid::Uuid::new_v4().to_string(),
            sender_id: message.sender_id,
            recipient_id: message.recipient_id,
            group_id: message.group_id,
            content: message.content,
            message_type: message.message_type,
            created_at: Utc::now(),
            reply_to: message.reply_to,
            file_name: message.file_name,
            file_type: message.file_type,
            is_read: false,
            read_by: Vec::new(),
        };
        self.messages.insert(envelope.id.clone(), envelope.clone());
        Ok(envelope)
    }

    async fn find(&self, message_id: &str) -> Result<Option<MessageEnvelope>, StoreError> {
        Ok(self.messages.get(message_id).map(|m| m.clone()))
    }

    async fn mark_read(
        &self,
        message_id: &str,
        reader_id: &str,
    ) -> Result<MarkReadOutcome, StoreError> {
        let mut message = self.messages.get_mut(message_id).ok_or(StoreError::NotFound)?;
        if message.read_by.iter().any(|r| r == reader_id) {
            return Ok(MarkReadOutcome {
                message: message.clone(),
                newly_read: false,
            });
        }
        message.read_by.push(reader_id.to_string());
        message.is_read = true;
        Ok(MarkReadOutcome {
            message: message.clone(),
            newly_read: true,
        })
    }

    async fn find_or_create_chat(&self, a: &str, b: &str) -> Result<ChatRecord, StoreError> {
        let chat_id = direct_room_id(a, b);
        let chat = self
            .chats
            .entry(chat_id.clone())
            .or_insert_with(|| ChatRecord {
                id: chat_id.clone(),
                participants: (a.to_string(), b.to_string()),
                messages: Vec::new(),
            });
        Ok(chat.clone())
    }

    async fn append_to_chat(&self, chat_id: &str, message_id: &str) -> Result<(), StoreError> {
        let mut chat = self.chats.get_mut(chat_id).ok_or(StoreError::NotFound)?;
        chat.messages.push(message_id.to_string());
        Ok(())
    }
}
