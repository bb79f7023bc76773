use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::user::UserProfile;
use crate::{GroupId, MessageId, UserId};

/// Durable group membership record as held by the group store.
/// Invariant: `admin_id` is always present in `members`, and a group has
/// at least one member for as long as it exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRecord {
    pub id: GroupId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub admin_id: UserId,
    pub members: HashSet<UserId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<MessageId>,
}

impl GroupRecord {
    pub fn is_member(&self, user_id: &str) -> bool {
        self.members.contains(user_id)
    }

    pub fn is_admin(&self, user_id: &str) -> bool {
        self.admin_id == user_id
    }
}

/// Wire projection of a group with admin and member profiles populated,
/// carried in membership-change broadcasts and acks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupView {
    pub id: GroupId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub admin: UserProfile,
    pub members: Vec<UserProfile>,
}
