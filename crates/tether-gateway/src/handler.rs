use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::broadcast;

use tether_core::dispatch::{DirectMessageInput, GroupMessageInput};
use tether_core::{AppState, CoreError};
use tether_models::gateway::*;

use crate::session::Session;

pub async fn handle_connection(socket: WebSocket, state: AppState, user_id: Option<String>) {
    let (mut sender, receiver) = socket.split();

    // Handshake: the claimed identity must resolve to an existing user or
    // the connection is refused before any mapping is stored.
    let Some(user_id) = user_id else {
        tracing::warn!("handshake rejected: userId missing");
        let _ = close(&mut sender, 1008, "userId missing from handshake").await;
        return;
    };
    let profile = match state.users.find(&user_id).await {
        Ok(Some(profile)) => profile,
        Ok(None) => {
            tracing::warn!(user_id, "handshake rejected: unknown user");
            let _ = close(&mut sender, 1008, "unknown user").await;
            return;
        }
        Err(err) => {
            tracing::error!(user_id, %err, "handshake rejected: user directory unavailable");
            let _ = close(&mut sender, 1011, "user directory unavailable").await;
            return;
        }
    };

    let session = Session::new(profile.id);
    // Subscribe before registering so nothing targeted at this connection
    // can slip between registration and the first poll.
    let event_rx = state.bus.subscribe();
    if let Err(err) = state
        .presence
        .connection_opened(&session.user_id, &session.connection_id)
        .await
    {
        tracing::error!(user_id = %session.user_id, %err, "connection setup failed");
        state.presence.connection_closed(&session.connection_id).await;
        let _ = close(&mut sender, 1011, "connection setup failed").await;
        return;
    }
    tracing::info!(
        user_id = %session.user_id,
        connection_id = %session.connection_id,
        "client connected"
    );

    let disconnect_reason = run_session(sender, receiver, event_rx, &session, &state).await;

    // A disconnect unconditionally cancels all pending interest for this
    // connection: unregistered everywhere, synchronously.
    state.presence.connection_closed(&session.connection_id).await;
    tracing::info!(
        user_id = %session.user_id,
        connection_id = %session.connection_id,
        disconnect_reason,
        "client disconnected"
    );
}

async fn run_session(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    mut event_rx: broadcast::Receiver<tether_core::events::GatewayEvent>,
    session: &Session,
    state: &AppState,
) -> &'static str {
    loop {
        tokio::select! {
            msg = receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    handle_frame(text.as_str(), session, state).await;
                }
                Some(Ok(Message::Close(_))) => break "client close frame",
                Some(Ok(_)) => {} // ping/pong/binary: nothing to do
                Some(Err(err)) => {
                    tracing::debug!(user_id = %session.user_id, %err, "websocket receive error");
                    break "websocket receive error";
                }
                None => break "websocket stream ended",
            },
            event = event_rx.recv() => match event {
                Ok(event) => {
                    if !session.should_receive(&event.connection_ids) {
                        continue;
                    }
                    let frame = ServerFrame::new(&event.event_type, event.payload);
                    let Ok(text) = serde_json::to_string(&frame) else {
                        continue;
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break "websocket send error";
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        user_id = %session.user_id,
                        skipped,
                        "event stream lagged; forcing reconnect"
                    );
                    let _ = close(&mut sender, 1013, "gateway fell behind; reconnect required").await;
                    break "event stream lagged";
                }
                Err(broadcast::error::RecvError::Closed) => break "event stream closed",
            },
        }
    }
}

/// Parse and route one inbound frame. Any rejection becomes a single
/// `error` event back to the originating connection; other participants
/// never observe a failed attempt.
async fn handle_frame(text: &str, session: &Session, state: &AppState) {
    let event = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => event,
        Err(err) => {
            tracing::debug!(user_id = %session.user_id, %err, "malformed client frame");
            emit_error(state, session, "malformed payload".to_string());
            return;
        }
    };
    if let Err(err) = route_event(event, session, state).await {
        match &err {
            CoreError::Store(_) | CoreError::Internal(_) => {
                tracing::error!(user_id = %session.user_id, %err, "event handling failed");
            }
            _ => {
                tracing::debug!(user_id = %session.user_id, %err, "client event rejected");
            }
        }
        emit_error(state, session, err.client_message());
    }
}

async fn route_event(
    event: ClientEvent,
    session: &Session,
    state: &AppState,
) -> Result<(), CoreError> {
    match event {
        ClientEvent::JoinRoom { room_id } => {
            state
                .rooms
                .subscribe_direct(&room_id, &session.user_id, &session.connection_id)
        }
        ClientEvent::TypingStart {
            sender_id,
            receiver_id,
        } => {
            ensure_self(&sender_id, session)?;
            state.typing.start_typing_direct(&session.user_id, &receiver_id);
            Ok(())
        }
        ClientEvent::SendMessage {
            receiver_id,
            content,
            message_type,
            file_name,
        } => state
            .dispatcher
            .dispatch_direct(
                &session.user_id,
                &session.connection_id,
                DirectMessageInput {
                    receiver_id,
                    content,
                    message_type: message_type.unwrap_or_default(),
                    file_name,
                },
            )
            .await
            .map(|_| ()),
        ClientEvent::JoinGroup { group_id, user_id } => {
            ensure_self(&user_id, session)?;
            let result = state.rooms.join(&group_id, &session.user_id).await;
            send_ack(
                state,
                session,
                EVENT_JOIN_GROUP_ACK,
                result.map(|group| json!({ "group": group })),
            )
        }
        ClientEvent::LeaveGroup { group_id, user_id } => {
            ensure_self(&user_id, session)?;
            let result = state.rooms.leave(&group_id, &session.user_id).await;
            send_ack(
                state,
                session,
                EVENT_LEAVE_GROUP_ACK,
                result.map(|outcome| json!({ "group": outcome.group() })),
            )
        }
        ClientEvent::SendMessageToGroup {
            group_id,
            content,
            message_type,
            reply_to,
            file_name,
            file_type,
        } => {
            let result = state
                .dispatcher
                .dispatch_to_group(
                    &session.user_id,
                    GroupMessageInput {
                        group_id,
                        content,
                        message_type: message_type.unwrap_or_default(),
                        reply_to,
                        file_name,
                        file_type,
                    },
                )
                .await;
            send_ack(
                state,
                session,
                EVENT_SEND_MESSAGE_TO_GROUP_ACK,
                result.map(|message| json!({ "message": message })),
            )
        }
        ClientEvent::TypingInGroup {
            group_id,
            is_typing,
        } => {
            state
                .typing
                .typing_in_group(&session.user_id, &group_id, is_typing);
            Ok(())
        }
        ClientEvent::MarkMessageAsRead {
            // Scope is resolved from the stored message; the client hint
            // is not trusted.
            group_id: _,
            message_id,
        } => {
            let result = state
                .dispatcher
                .mark_read(&session.user_id, &message_id)
                .await;
            send_ack(
                state,
                session,
                EVENT_MARK_MESSAGE_AS_READ_ACK,
                result.map(|_| json!({})),
            )
        }
        ClientEvent::TransferAdmin {
            group_id,
            new_admin_id,
        } => {
            let result = state
                .rooms
                .transfer_admin(&group_id, &session.user_id, &new_admin_id)
                .await;
            send_ack(
                state,
                session,
                EVENT_TRANSFER_ADMIN_ACK,
                result.map(|group| json!({ "group": group })),
            )
        }
    }
}

/// Identity claimed in an event payload must match the identity resolved
/// at handshake time; a connection can never act as another user.
fn ensure_self(claimed: &str, session: &Session) -> Result<(), CoreError> {
    if claimed == session.user_id {
        Ok(())
    } else {
        Err(CoreError::Forbidden(
            "event identity does not match connection identity",
        ))
    }
}

/// Emit the `{success, ...}` ack to the originating connection. Failures
/// produce a failure ack and still propagate so the shared error path
/// also fires.
fn send_ack(
    state: &AppState,
    session: &Session,
    ack_event: &str,
    result: Result<serde_json::Value, CoreError>,
) -> Result<(), CoreError> {
    match result {
        Ok(mut data) => {
            if let Some(fields) = data.as_object_mut() {
                fields.insert("success".to_string(), json!(true));
            }
            state
                .bus
                .emit(ack_event, data, vec![session.connection_id.clone()]);
            Ok(())
        }
        Err(err) => {
            state.bus.emit(
                ack_event,
                json!({ "success": false, "error": err.client_message() }),
                vec![session.connection_id.clone()],
            );
            Err(err)
        }
    }
}

fn emit_error(state: &AppState, session: &Session, message: String) {
    state.bus.emit(
        EVENT_ERROR,
        json!({ "message": message }),
        vec![session.connection_id.clone()],
    );
}

async fn close(
    sender: &mut SplitSink<WebSocket, Message>,
    code: u16,
    reason: &str,
) -> Result<(), axum::Error> {
    sender
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.to_string().into(),
        })))
        .await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use tether_core::store::memory::MemoryStore;
    use tether_core::store::GroupStore;

    use super::*;

    fn fixture() -> (AppState, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        store.seed_user("alice", "alice");
        store.seed_user("bob", "bob");
        store.seed_group("g", "ops", "bob", &[]);
        let state = AppState::new(store.clone(), store.clone(), store.clone());
        (state, store)
    }

    fn session_for(user_id: &str, connection_id: &str) -> Session {
        Session {
            user_id: user_id.to_string(),
            connection_id: connection_id.to_string(),
            established_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn join_group_with_foreign_identity_is_rejected() {
        let (state, store) = fixture();
        let session = session_for("alice", "a1");
        let mut rx = state.bus.subscribe();

        let err = route_event(
            ClientEvent::JoinGroup {
                group_id: "g".to_string(),
                user_id: "bob".to_string(),
            },
            &session,
            &state,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));

        // Nothing was written and nothing went out, not even an ack.
        let record = GroupStore::find(store.as_ref(), "g").await.unwrap().unwrap();
        assert!(!record.is_member("alice"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn leave_group_with_foreign_identity_is_rejected() {
        let (state, store) = fixture();
        let session = session_for("alice", "a1");

        let err = route_event(
            ClientEvent::LeaveGroup {
                group_id: "g".to_string(),
                user_id: "bob".to_string(),
            },
            &session,
            &state,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));

        let record = GroupStore::find(store.as_ref(), "g").await.unwrap().unwrap();
        assert!(record.is_member("bob"));
    }

    #[tokio::test]
    async fn typing_with_foreign_identity_is_rejected() {
        let (state, _) = fixture();
        let session = session_for("alice", "a1");
        let mut rx = state.bus.subscribe();

        let err = route_event(
            ClientEvent::TypingStart {
                sender_id: "bob".to_string(),
                receiver_id: "alice".to_string(),
            },
            &session,
            &state,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn malformed_frame_emits_single_error_to_origin() {
        let (state, _) = fixture();
        let session = session_for("alice", "a1");
        let mut rx = state.bus.subscribe();

        handle_frame(r#"{"event":"sendMessage","data":{"content":42}}"#, &session, &state).await;

        let event = rx.try_recv().unwrap();
        assert_eq!(event.event_type, EVENT_ERROR);
        assert_eq!(event.connection_ids, vec!["a1".to_string()]);
        assert_eq!(event.payload["message"], "malformed payload");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn rejected_event_reaches_only_the_origin() {
        let (state, _) = fixture();
        state
            .presence
            .connection_opened("bob", "b1")
            .await
            .unwrap();
        let session = session_for("alice", "a1");
        let mut rx = state.bus.subscribe();

        // Valid frame, but alice claims bob's identity.
        handle_frame(
            r#"{"event":"joinGroup","data":{"groupId":"g","userId":"bob"}}"#,
            &session,
            &state,
        )
        .await;

        let event = rx.try_recv().unwrap();
        assert_eq!(event.event_type, EVENT_ERROR);
        assert_eq!(event.connection_ids, vec!["a1".to_string()]);
        assert!(rx.try_recv().is_err());
    }
}
