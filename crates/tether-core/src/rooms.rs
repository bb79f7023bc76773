//! Per-room subscriber state and group membership operations.
//!
//! The durable group store is ground truth; the in-memory room map is a
//! derived, reconstructable cache populated lazily on first subscriber and
//! on reconnect. Membership mutations touch the cache only after the
//! durable write has succeeded, so a failed store call never leaves a
//! half-applied room visible.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde_json::json;

use tether_models::gateway::{
    EVENT_ADMIN_TRANSFERRED, EVENT_GROUP_MEMBER_JOINED, EVENT_GROUP_MEMBER_LEFT, EVENT_USER_ONLINE,
};
use tether_models::group::{GroupRecord, GroupView};
use tether_models::user::UserProfile;
use tether_models::{group_room_id, ConnectionId, GroupId, RoomId, UserId};

use crate::error::CoreError;
use crate::events::EventBus;
use crate::registry::ConnectionRegistry;
use crate::store::{GroupStore, JoinOutcome, UserDirectory};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoomKind {
    Direct,
    Group,
}

#[derive(Debug)]
struct RoomState {
    kind: RoomKind,
    /// Live connections subscribed to this room. Multiple devices of one
    /// member each appear independently.
    subscribers: HashSet<ConnectionId>,
    /// Mirror of the durable member set; empty for direct rooms.
    members: HashSet<UserId>,
}

impl RoomState {
    fn direct() -> Self {
        RoomState {
            kind: RoomKind::Direct,
            subscribers: HashSet::new(),
            members: HashSet::new(),
        }
    }

    fn group(record: &GroupRecord) -> Self {
        RoomState {
            kind: RoomKind::Group,
            subscribers: HashSet::new(),
            members: record.members.clone(),
        }
    }
}

/// Result of a leave operation; leaving as admin cascades into deletion.
#[derive(Debug, Clone)]
pub enum LeaveOutcome {
    Left(GroupView),
    GroupDeleted(GroupView),
}

impl LeaveOutcome {
    pub fn group(&self) -> &GroupView {
        match self {
            LeaveOutcome::Left(g) | LeaveOutcome::GroupDeleted(g) => g,
        }
    }
}

type SharedJoin = Shared<BoxFuture<'static, Result<GroupView, CoreError>>>;

/// Maintains, per group, the set of live connections subscribed to that
/// group's event room, and applies membership changes against the durable
/// store.
#[derive(Clone)]
pub struct RoomMembershipCoordinator {
    rooms: Arc<DashMap<RoomId, RoomState>>,
    /// Pending join futures keyed by (group, user): near-simultaneous join
    /// requests collapse into one durable write and all callers observe
    /// the same resulting membership.
    pending_joins: Arc<DashMap<(GroupId, UserId), SharedJoin>>,
    groups: Arc<dyn GroupStore>,
    users: Arc<dyn UserDirectory>,
    registry: Arc<ConnectionRegistry>,
    bus: EventBus,
}

impl RoomMembershipCoordinator {
    pub fn new(
        groups: Arc<dyn GroupStore>,
        users: Arc<dyn UserDirectory>,
        registry: Arc<ConnectionRegistry>,
        bus: EventBus,
    ) -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
            pending_joins: Arc::new(DashMap::new()),
            groups,
            users,
            registry,
            bus,
        }
    }

    /// Current live delivery set for a room.
    pub fn subscribers(&self, room_id: &str) -> Vec<ConnectionId> {
        self.rooms
            .get(room_id)
            .map(|room| room.subscribers.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_subscribed(&self, room_id: &str, connection_id: &str) -> bool {
        self.rooms
            .get(room_id)
            .map(|room| room.subscribers.contains(connection_id))
            .unwrap_or(false)
    }

    /// Subscribe a connection to a direct-chat room. The room id encodes
    /// both participants, so a connection can only enter rooms its own
    /// user belongs to.
    pub fn subscribe_direct(
        &self,
        room_id: &str,
        user_id: &str,
        connection_id: &str,
    ) -> Result<(), CoreError> {
        let mut parts = room_id.splitn(3, ':');
        let (prefix, a, b) = (parts.next(), parts.next(), parts.next());
        if prefix != Some("dm") || b.is_none() {
            return Err(CoreError::BadRequest(format!(
                "'{room_id}' is not a direct-chat room id"
            )));
        }
        if a != Some(user_id) && b != Some(user_id) {
            return Err(CoreError::Forbidden("not a participant of this chat"));
        }
        self.rooms
            .entry(room_id.to_string())
            .or_insert_with(RoomState::direct)
            .subscribers
            .insert(connection_id.to_string());
        Ok(())
    }

    /// Join a group: one durable conditional insert, then subscribe every
    /// live connection of the user and broadcast the membership change.
    pub async fn join(&self, group_id: &str, user_id: &str) -> Result<GroupView, CoreError> {
        if self.users.find(user_id).await?.is_none() {
            return Err(CoreError::NotFound("User"));
        }

        let key = (group_id.to_string(), user_id.to_string());
        let pending = match self.pending_joins.entry(key.clone()) {
            Entry::Occupied(existing) => existing.get().clone(),
            Entry::Vacant(slot) => {
                let this = self.clone();
                let group_id = group_id.to_string();
                let user_id = user_id.to_string();
                let future = async move { this.join_durable(&group_id, &user_id).await }
                    .boxed()
                    .shared();
                slot.insert(future.clone());
                future
            }
        };
        let result = pending.await;
        self.pending_joins.remove(&key);
        result
    }

    async fn join_durable(&self, group_id: &str, user_id: &str) -> Result<GroupView, CoreError> {
        let record = match self.groups.add_member_if_absent(group_id, user_id).await {
            Ok(JoinOutcome::Joined(record)) => record,
            Ok(JoinOutcome::AlreadyMember) => return Err(CoreError::AlreadyMember),
            Err(crate::store::StoreError::NotFound) => return Err(CoreError::NotFound("Group")),
            Err(err) => return Err(err.into()),
        };

        let room_id = group_room_id(group_id);
        {
            let mut room = self
                .rooms
                .entry(room_id.clone())
                .or_insert_with(|| RoomState::group(&record));
            room.members = record.members.clone();
            for connection in self.registry.connections_for(user_id) {
                room.subscribers.insert(connection);
            }
        }

        let view = self.group_view(&record).await?;
        tracing::info!(group_id, user_id, "user joined group");
        self.bus.emit(
            EVENT_GROUP_MEMBER_JOINED,
            json!({ "group": view, "userId": user_id }),
            self.subscribers(&room_id),
        );
        Ok(view)
    }

    /// Leave a group. The admin leaving deletes the group entirely; the
    /// room is torn down and every subscriber is notified.
    pub async fn leave(&self, group_id: &str, user_id: &str) -> Result<LeaveOutcome, CoreError> {
        let record = self
            .groups
            .find(group_id)
            .await?
            .ok_or(CoreError::NotFound("Group"))?;
        let room_id = group_room_id(group_id);

        if record.is_admin(user_id) {
            let view = self.group_view(&record).await?;
            self.groups.delete(group_id).await?;
            let subscribers = self
                .rooms
                .remove(&room_id)
                .map(|(_, room)| room.subscribers.into_iter().collect::<Vec<_>>())
                .unwrap_or_default();
            tracing::info!(group_id, user_id, "admin left, group deleted");
            self.bus.emit(
                EVENT_GROUP_MEMBER_LEFT,
                json!({ "groupId": group_id, "userId": user_id, "group": view }),
                subscribers,
            );
            return Ok(LeaveOutcome::GroupDeleted(view));
        }

        let record = self
            .groups
            .remove_member(group_id, user_id)
            .await?
            .ok_or(CoreError::NotAMember)?;

        let remaining = {
            match self.rooms.entry(room_id.clone()) {
                Entry::Occupied(mut entry) => {
                    let room = entry.get_mut();
                    room.members = record.members.clone();
                    for connection in self.registry.connections_for(user_id) {
                        room.subscribers.remove(&connection);
                    }
                    if room.subscribers.is_empty() {
                        entry.remove();
                        Vec::new()
                    } else {
                        entry.get().subscribers.iter().cloned().collect()
                    }
                }
                Entry::Vacant(_) => Vec::new(),
            }
        };

        let view = self.group_view(&record).await?;
        tracing::info!(group_id, user_id, "user left group");
        self.bus.emit(
            EVENT_GROUP_MEMBER_LEFT,
            json!({ "groupId": group_id, "userId": user_id, "group": view }),
            remaining,
        );
        Ok(LeaveOutcome::Left(view))
    }

    /// Swap the admin. Administration rights are never left unset: the
    /// caller must be the current admin and the proposed admin must
    /// already be a member.
    pub async fn transfer_admin(
        &self,
        group_id: &str,
        current_admin_id: &str,
        new_admin_id: &str,
    ) -> Result<GroupView, CoreError> {
        let record = self
            .groups
            .find(group_id)
            .await?
            .ok_or(CoreError::NotFound("Group"))?;
        if !record.is_admin(current_admin_id) {
            return Err(CoreError::NotAdmin);
        }
        if !record.is_member(new_admin_id) {
            return Err(CoreError::NotAMember);
        }

        let record = self.groups.set_admin(group_id, new_admin_id).await?;
        let view = self.group_view(&record).await?;
        tracing::info!(group_id, current_admin_id, new_admin_id, "admin transferred");
        self.bus.emit(
            EVENT_ADMIN_TRANSFERRED,
            json!({
                "groupId": group_id,
                "oldAdminId": current_admin_id,
                "newAdminId": new_admin_id,
                "group": view,
            }),
            self.subscribers(&group_room_id(group_id)),
        );
        Ok(view)
    }

    /// Re-subscribe a user's fresh connection (0→1 transition) to every
    /// group the durable store still lists them in, announcing the user
    /// as online to each room.
    pub async fn reconcile_on_reconnect(
        &self,
        user_id: &str,
        connection_id: &str,
    ) -> Result<(), CoreError> {
        self.subscribe_member_rooms(user_id, connection_id, true).await
    }

    /// Subscribe a connection to all rooms its user durably belongs to.
    /// `announce` controls the `userOnline` broadcast; additional devices
    /// of an already-online user subscribe silently.
    pub async fn subscribe_member_rooms(
        &self,
        user_id: &str,
        connection_id: &str,
        announce: bool,
    ) -> Result<(), CoreError> {
        for record in self.groups.groups_for_member(user_id).await? {
            let room_id = group_room_id(&record.id);
            let others: Vec<ConnectionId> = {
                let mut room = self
                    .rooms
                    .entry(room_id)
                    .or_insert_with(|| RoomState::group(&record));
                room.members = record.members.clone();
                room.subscribers.insert(connection_id.to_string());
                room.subscribers
                    .iter()
                    .filter(|c| c.as_str() != connection_id)
                    .cloned()
                    .collect()
            };
            if announce {
                self.bus.emit(
                    EVENT_USER_ONLINE,
                    json!({ "groupId": record.id, "userId": user_id }),
                    others,
                );
            }
        }
        Ok(())
    }

    /// Remove a connection from every room it was subscribed to; rooms
    /// with no subscribers left are evicted (their durable membership is
    /// unaffected). Returns, for each group room the connection's user is
    /// a member of, the subscribers that remain.
    pub fn drop_connection(
        &self,
        user_id: &str,
        connection_id: &str,
    ) -> Vec<(GroupId, Vec<ConnectionId>)> {
        let mut affected = Vec::new();
        self.rooms.retain(|room_id, room| {
            if !room.subscribers.remove(connection_id) {
                return !room.subscribers.is_empty();
            }
            if room.kind == RoomKind::Group && room.members.contains(user_id) {
                if let Some(group_id) = room_id.strip_prefix("group:") {
                    affected.push((
                        group_id.to_string(),
                        room.subscribers.iter().cloned().collect(),
                    ));
                }
            }
            !room.subscribers.is_empty()
        });
        affected
    }

    /// Build the wire projection with admin and member profiles populated.
    pub async fn group_view(&self, record: &GroupRecord) -> Result<GroupView, CoreError> {
        let admin = self
            .users
            .find(&record.admin_id)
            .await?
            .ok_or_else(|| CoreError::Internal(format!("admin of group {} missing", record.id)))?;
        let mut members: Vec<UserProfile> = Vec::with_capacity(record.members.len());
        for member_id in &record.members {
            if let Some(profile) = self.users.find(member_id).await? {
                members.push(profile);
            }
        }
        members.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(GroupView {
            id: record.id.clone(),
            name: record.name.clone(),
            description: record.description.clone(),
            admin,
            members,
        })
    }
}
