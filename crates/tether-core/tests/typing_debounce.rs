mod support;

use tokio::time::{advance, Duration};

use tether_models::gateway::{EVENT_GROUP_TYPING_UPDATE, EVENT_TYPING_UPDATE};

use support::{count_of, delivered_to, drain, TestContext};

#[tokio::test(start_paused = true)]
async fn direct_typing_debounced_per_pair() {
    let ctx = TestContext::new();
    ctx.store.seed_user("alice", "alice");
    ctx.store.seed_user("bob", "bob");
    ctx.connect("alice", "a1").await;
    ctx.connect("bob", "b1").await;
    let mut rx = ctx.subscribe();

    ctx.state.typing.start_typing_direct("bob", "alice");
    ctx.state.typing.start_typing_direct("bob", "alice");
    let events = drain(&mut rx);
    assert_eq!(delivered_to(&events, EVENT_TYPING_UPDATE, "a1"), 1);

    // A different pair has its own window.
    ctx.state.typing.start_typing_direct("alice", "bob");
    let events = drain(&mut rx);
    assert_eq!(delivered_to(&events, EVENT_TYPING_UPDATE, "b1"), 1);

    advance(Duration::from_millis(600)).await;
    ctx.state.typing.start_typing_direct("bob", "alice");
    let events = drain(&mut rx);
    assert_eq!(delivered_to(&events, EVENT_TYPING_UPDATE, "a1"), 1);
}

#[tokio::test(start_paused = true)]
async fn typing_toward_offline_peer_is_silent() {
    let ctx = TestContext::new();
    ctx.store.seed_user("alice", "alice");
    ctx.store.seed_user("bob", "bob");
    ctx.connect("alice", "a1").await;
    let mut rx = ctx.subscribe();

    ctx.state.typing.start_typing_direct("alice", "bob");
    assert_eq!(count_of(&drain(&mut rx), EVENT_TYPING_UPDATE), 0);
}

#[tokio::test(start_paused = true)]
async fn group_typing_excludes_sender_and_stop_resets_window() {
    let ctx = TestContext::new();
    ctx.store.seed_user("alice", "alice");
    ctx.store.seed_user("bob", "bob");
    ctx.store.seed_group("g", "ops", "alice", &["bob"]);
    ctx.connect("alice", "a1").await;
    ctx.connect("bob", "b1").await;
    let mut rx = ctx.subscribe();

    ctx.state.typing.typing_in_group("bob", "g", true);
    let events = drain(&mut rx);
    assert_eq!(delivered_to(&events, EVENT_GROUP_TYPING_UPDATE, "a1"), 1);
    assert_eq!(delivered_to(&events, EVENT_GROUP_TYPING_UPDATE, "b1"), 0);
    assert_eq!(events[0].payload["isTyping"], true);

    // Within the window a repeated start is swallowed.
    ctx.state.typing.typing_in_group("bob", "g", true);
    assert_eq!(count_of(&drain(&mut rx), EVENT_GROUP_TYPING_UPDATE), 0);

    // An explicit stop goes out immediately and clears the pair state.
    ctx.state.typing.typing_in_group("bob", "g", false);
    let events = drain(&mut rx);
    assert_eq!(delivered_to(&events, EVENT_GROUP_TYPING_UPDATE, "a1"), 1);
    assert_eq!(events[0].payload["isTyping"], false);

    ctx.state.typing.typing_in_group("bob", "g", true);
    let events = drain(&mut rx);
    assert_eq!(delivered_to(&events, EVENT_GROUP_TYPING_UPDATE, "a1"), 1);
}
