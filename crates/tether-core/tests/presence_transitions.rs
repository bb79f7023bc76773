mod support;

use anyhow::Result;

use tether_core::store::UserDirectory;
use tether_models::gateway::{EVENT_USER_OFFLINE, EVENT_USER_ONLINE};

use support::{count_of, delivered_to, drain, TestContext};

#[tokio::test]
async fn online_announced_only_on_first_connection() -> Result<()> {
    let ctx = TestContext::new();
    ctx.store.seed_user("alice", "alice");
    ctx.store.seed_user("bob", "bob");
    ctx.store.seed_group("g1", "ops", "bob", &["alice"]);

    ctx.connect("bob", "b1").await;
    let mut rx = ctx.subscribe();

    ctx.connect("alice", "a1").await;
    let events = drain(&mut rx);
    assert_eq!(delivered_to(&events, EVENT_USER_ONLINE, "b1"), 1);
    assert_eq!(delivered_to(&events, EVENT_USER_ONLINE, "a1"), 0);

    // Second device subscribes silently.
    ctx.connect("alice", "a2").await;
    let events = drain(&mut rx);
    assert_eq!(count_of(&events, EVENT_USER_ONLINE), 0);

    assert!(ctx.state.presence.is_online("alice"));
    let profile = ctx.store.find("alice").await?.unwrap();
    assert!(profile.is_online);
    Ok(())
}

#[tokio::test]
async fn offline_announced_only_when_last_connection_drops() -> Result<()> {
    let ctx = TestContext::new();
    ctx.store.seed_user("alice", "alice");
    ctx.store.seed_user("bob", "bob");
    ctx.store.seed_group("g1", "ops", "bob", &["alice"]);

    ctx.connect("bob", "b1").await;
    ctx.connect("alice", "a1").await;
    ctx.connect("alice", "a2").await;
    let mut rx = ctx.subscribe();

    ctx.disconnect("a2").await;
    let events = drain(&mut rx);
    assert_eq!(count_of(&events, EVENT_USER_OFFLINE), 0);
    assert!(ctx.state.presence.is_online("alice"));

    ctx.disconnect("a1").await;
    let events = drain(&mut rx);
    assert_eq!(delivered_to(&events, EVENT_USER_OFFLINE, "b1"), 1);
    assert!(!ctx.state.presence.is_online("alice"));
    let profile = ctx.store.find("alice").await?.unwrap();
    assert!(!profile.is_online);
    Ok(())
}

#[tokio::test]
async fn unknown_connection_close_is_ignored() {
    let ctx = TestContext::new();
    let mut rx = ctx.subscribe();
    ctx.disconnect("never-registered").await;
    assert!(drain(&mut rx).is_empty());
}
