pub mod gateway;
pub mod group;
pub mod message;
pub mod user;

/// Store-assigned user identifier.
pub type UserId = String;
/// Store-assigned group identifier.
pub type GroupId = String;
/// Store-assigned message identifier.
pub type MessageId = String;
/// Identifier of a direct-chat or group event room.
pub type RoomId = String;
/// Gateway-assigned identifier for a single live WebSocket connection.
pub type ConnectionId = String;

/// Room id for the direct chat between two users, order-independent.
pub fn direct_room_id(a: &str, b: &str) -> RoomId {
    if a <= b {
        format!("dm:{a}:{b}")
    } else {
        format!("dm:{b}:{a}")
    }
}

/// Room id for a group's event room.
pub fn group_room_id(group_id: &str) -> RoomId {
    format!("group:{group_id}")
}
