mod support;

use anyhow::Result;

use tether_core::dispatch::{DirectMessageInput, GroupMessageInput};
use tether_core::store::MessageStore;
use tether_core::CoreError;
use tether_models::gateway::{
    EVENT_JOIN_CHAT, EVENT_MESSAGE_READ, EVENT_NEW_GROUP_MESSAGE, EVENT_RECEIVE_MESSAGE,
};
use tether_models::message::MessageType;

use support::{count_of, delivered_to, drain, TestContext};

fn text_to(receiver: &str, content: &str) -> DirectMessageInput {
    DirectMessageInput {
        receiver_id: receiver.to_string(),
        content: content.to_string(),
        message_type: MessageType::Text,
        file_name: None,
    }
}

fn group_text(group_id: &str, content: &str) -> GroupMessageInput {
    GroupMessageInput {
        group_id: group_id.to_string(),
        content: content.to_string(),
        message_type: MessageType::Text,
        reply_to: None,
        file_name: None,
        file_type: None,
    }
}

#[tokio::test]
async fn offline_recipient_message_saved_not_delivered() -> Result<()> {
    let ctx = TestContext::new();
    ctx.store.seed_user("alice", "alice");
    ctx.store.seed_user("bob", "bob");
    ctx.connect("alice", "a1").await;
    let mut rx = ctx.subscribe();

    let message = ctx
        .state
        .dispatcher
        .dispatch_direct("alice", &"a1".to_string(), text_to("bob", "hello"))
        .await?;
    assert_eq!(message.recipient_id.as_deref(), Some("bob"));
    assert_eq!(ctx.store.message_count(), 1);

    let events = drain(&mut rx);
    assert_eq!(count_of(&events, EVENT_RECEIVE_MESSAGE), 0);
    assert_eq!(delivered_to(&events, EVENT_JOIN_CHAT, "a1"), 1);
    Ok(())
}

#[tokio::test]
async fn direct_message_reaches_every_recipient_device() -> Result<()> {
    let ctx = TestContext::new();
    ctx.store.seed_user("alice", "alice");
    ctx.store.seed_user("bob", "bob");
    ctx.connect("alice", "a1").await;
    ctx.connect("bob", "b1").await;
    ctx.connect("bob", "b2").await;
    let mut rx = ctx.subscribe();

    ctx.state
        .dispatcher
        .dispatch_direct("alice", &"a1".to_string(), text_to("bob", "hello"))
        .await?;

    let events = drain(&mut rx);
    assert_eq!(delivered_to(&events, EVENT_RECEIVE_MESSAGE, "b1"), 1);
    assert_eq!(delivered_to(&events, EVENT_RECEIVE_MESSAGE, "b2"), 1);
    assert_eq!(delivered_to(&events, EVENT_RECEIVE_MESSAGE, "a1"), 0);
    let payload = &events
        .iter()
        .find(|e| e.event_type == EVENT_RECEIVE_MESSAGE)
        .unwrap()
        .payload;
    assert_eq!(payload["senderId"], "alice");
    assert_eq!(payload["content"], "hello");
    Ok(())
}

#[tokio::test]
async fn unknown_recipient_is_rejected() {
    let ctx = TestContext::new();
    ctx.store.seed_user("alice", "alice");
    ctx.connect("alice", "a1").await;

    let err = ctx
        .state
        .dispatcher
        .dispatch_direct("alice", &"a1".to_string(), text_to("ghost", "hello"))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound("User")));
    assert_eq!(ctx.store.message_count(), 0);
}

#[tokio::test]
async fn group_fanout_covers_subscribed_members_only() -> Result<()> {
    let ctx = TestContext::new();
    ctx.store.seed_user("alice", "alice");
    ctx.store.seed_user("bob", "bob");
    ctx.store.seed_user("carol", "carol");
    ctx.store.seed_group("g", "ops", "alice", &["bob"]);

    ctx.connect("alice", "a1").await;
    ctx.connect("bob", "b1").await;
    ctx.connect("carol", "c1").await;
    let mut rx = ctx.subscribe();

    ctx.state
        .dispatcher
        .dispatch_to_group("alice", group_text("g", "standup in 5"))
        .await?;

    let events = drain(&mut rx);
    assert_eq!(delivered_to(&events, EVENT_NEW_GROUP_MESSAGE, "a1"), 1);
    assert_eq!(delivered_to(&events, EVENT_NEW_GROUP_MESSAGE, "b1"), 1);
    assert_eq!(delivered_to(&events, EVENT_NEW_GROUP_MESSAGE, "c1"), 0);
    Ok(())
}

#[tokio::test]
async fn non_member_send_rejected_before_persist() {
    let ctx = TestContext::new();
    ctx.store.seed_user("alice", "alice");
    ctx.store.seed_user("carol", "carol");
    ctx.store.seed_group("g", "ops", "alice", &[]);
    ctx.connect("carol", "c1").await;

    let err = ctx
        .state
        .dispatcher
        .dispatch_to_group("carol", group_text("g", "let me in"))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotAMember));
    assert_eq!(ctx.store.message_count(), 0);
}

#[tokio::test]
async fn read_receipt_notifies_sender_once() -> Result<()> {
    let ctx = TestContext::new();
    ctx.store.seed_user("alice", "alice");
    ctx.store.seed_user("bob", "bob");
    ctx.connect("alice", "a1").await;
    ctx.connect("bob", "b1").await;

    let message = ctx
        .state
        .dispatcher
        .dispatch_direct("alice", &"a1".to_string(), text_to("bob", "hello"))
        .await?;
    let mut rx = ctx.subscribe();

    ctx.state.dispatcher.mark_read("bob", &message.id).await?;
    let events = drain(&mut rx);
    assert_eq!(delivered_to(&events, EVENT_MESSAGE_READ, "a1"), 1);
    assert_eq!(delivered_to(&events, EVENT_MESSAGE_READ, "b1"), 0);
    let payload = &events
        .iter()
        .find(|e| e.event_type == EVENT_MESSAGE_READ)
        .unwrap()
        .payload;
    // Direct-message receipts carry no group scope.
    assert!(payload["groupId"].is_null());
    assert_eq!(payload["messageId"], message.id.as_str());

    // Repeat is idempotent: no second receipt, read_by unchanged.
    ctx.state.dispatcher.mark_read("bob", &message.id).await?;
    let events = drain(&mut rx);
    assert_eq!(count_of(&events, EVENT_MESSAGE_READ), 0);

    let stored = ctx.store.find(&message.id).await?.unwrap();
    assert_eq!(stored.read_by, vec!["bob".to_string()]);
    assert!(stored.is_read);
    Ok(())
}

#[tokio::test]
async fn stranger_cannot_mark_direct_message_read() -> Result<()> {
    let ctx = TestContext::new();
    ctx.store.seed_user("alice", "alice");
    ctx.store.seed_user("bob", "bob");
    ctx.store.seed_user("carol", "carol");
    ctx.connect("alice", "a1").await;

    let message = ctx
        .state
        .dispatcher
        .dispatch_direct("alice", &"a1".to_string(), text_to("bob", "hello"))
        .await?;

    let err = ctx
        .state
        .dispatcher
        .mark_read("carol", &message.id)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Forbidden(_)));
    Ok(())
}

#[tokio::test]
async fn sender_reading_own_message_emits_nothing() -> Result<()> {
    let ctx = TestContext::new();
    ctx.store.seed_user("alice", "alice");
    ctx.store.seed_user("bob", "bob");
    ctx.connect("alice", "a1").await;

    let message = ctx
        .state
        .dispatcher
        .dispatch_direct("alice", &"a1".to_string(), text_to("bob", "hello"))
        .await?;
    let mut rx = ctx.subscribe();

    ctx.state
        .dispatcher
        .mark_read("alice", &message.id)
        .await?;
    let events = drain(&mut rx);
    assert_eq!(count_of(&events, EVENT_MESSAGE_READ), 0);
    Ok(())
}

#[tokio::test]
async fn group_read_receipt_requires_membership() -> Result<()> {
    let ctx = TestContext::new();
    ctx.store.seed_user("alice", "alice");
    ctx.store.seed_user("bob", "bob");
    ctx.store.seed_user("carol", "carol");
    ctx.store.seed_group("g", "ops", "alice", &["bob"]);
    ctx.connect("alice", "a1").await;
    ctx.connect("bob", "b1").await;

    let message = ctx
        .state
        .dispatcher
        .dispatch_to_group("alice", group_text("g", "standup in 5"))
        .await?;
    let mut rx = ctx.subscribe();

    let err = ctx
        .state
        .dispatcher
        .mark_read("carol", &message.id)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotAMember));

    ctx.state
        .dispatcher
        .mark_read("bob", &message.id)
        .await?;
    let events = drain(&mut rx);
    assert_eq!(delivered_to(&events, EVENT_MESSAGE_READ, "a1"), 1);
    let payload = &events
        .iter()
        .find(|e| e.event_type == EVENT_MESSAGE_READ)
        .unwrap()
        .payload;
    assert_eq!(payload["groupId"], "g");
    assert_eq!(payload["userId"], "bob");
    Ok(())
}
