#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::Message;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use huddle_core::protocol::{ServerEvent, IDLE_KICK_MESSAGE, IDLE_REASON};
use huddle_core::{ConnectionId, HuddleError, Identity, MessageRecord, Result, RoomId, UserId};
use huddle_gateway::collab::{ChatStore, InMemoryChatStore};
use huddle_gateway::config::SweeperSection;
use huddle_gateway::gateway::{GatewayOptions, RoomGateway, SessionCtx};
use huddle_gateway::obs::GatewayMetrics;
use huddle_gateway::realtime::core::FORCED_CLOSE_CODE;
use huddle_gateway::realtime::{PresenceRegistry, RealtimeCore};
use huddle_gateway::sweeper::IdleSweeper;

/// Delegates to the in-memory store but fails or hangs on chosen rooms.
struct FlakyStore {
    inner: InMemoryChatStore,
    fail_room: Option<RoomId>,
    hang: bool,
}

#[async_trait]
impl ChatStore for FlakyStore {
    async fn append_message(&self, room: &RoomId, sender: &UserId, text: &str) -> Result<MessageRecord> {
        self.inner.append_message(room, sender, text).await
    }

    async fn fetch_history(&self, room: &RoomId, limit: u32) -> Result<Vec<MessageRecord>> {
        self.inner.fetch_history(room, limit).await
    }

    async fn remove_member(&self, room: &RoomId, user: &UserId) -> Result<Option<String>> {
        // Real backends suspend here; give concurrent callers a turn.
        tokio::task::yield_now().await;
        if self.hang {
            std::future::pending::<()>().await;
        }
        if self.fail_room.as_ref() == Some(room) {
            return Err(HuddleError::Collaborator("membership table unavailable".into()));
        }
        self.inner.remove_member(room, user).await
    }

    async fn add_member(&self, room: &RoomId, user: &UserId) -> Result<()> {
        self.inner.add_member(room, user).await
    }

    async fn create_room(
        &self,
        id: Option<RoomId>,
        title: Option<String>,
        creator: &UserId,
        members: &[UserId],
    ) -> Result<RoomId> {
        self.inner.create_room(id, title, creator, members).await
    }

    async fn room_members(&self, room: &RoomId) -> Result<Vec<UserId>> {
        self.inner.room_members(room).await
    }
}

struct Harness {
    gateway: Arc<RoomGateway>,
    registry: Arc<PresenceRegistry>,
    core: Arc<RealtimeCore>,
    store: Arc<FlakyStore>,
    metrics: Arc<GatewayMetrics>,
    sweeper: Arc<IdleSweeper>,
}

async fn harness_with(fail_room: Option<&str>, hang: bool) -> Harness {
    let inner = InMemoryChatStore::new();
    inner.register_user("alice", "Alice");
    inner.register_user("bob", "Bob");
    inner
        .create_room(Some("lobby".into()), None, &"alice".into(), &["bob".into()])
        .await
        .unwrap();
    inner
        .create_room(Some("ops".into()), None, &"alice".into(), &["bob".into()])
        .await
        .unwrap();
    let store = Arc::new(FlakyStore {
        inner,
        fail_room: fail_room.map(RoomId::from),
        hang,
    });

    let metrics = Arc::new(GatewayMetrics::default());
    let registry = Arc::new(PresenceRegistry::new());
    let core = Arc::new(RealtimeCore::new(metrics.clone()));
    let gateway = Arc::new(RoomGateway::new(
        registry.clone(),
        core.clone(),
        store.clone(),
        metrics.clone(),
        GatewayOptions::default(),
    ));
    let sweeper = Arc::new(IdleSweeper::new(
        registry.clone(),
        core.clone(),
        store.clone(),
        metrics.clone(),
        &SweeperSection {
            interval_ms: 30_000,
            idle_threshold_ms: 120_000,
        },
    ));
    Harness {
        gateway,
        registry,
        core,
        store,
        metrics,
        sweeper,
    }
}

async fn harness() -> Harness {
    harness_with(None, false).await
}

struct Client {
    ctx: SessionCtx,
    rx: mpsc::Receiver<Message>,
}

impl Client {
    fn frames(&mut self) -> Vec<Message> {
        let mut out = Vec::new();
        while let Ok(m) = self.rx.try_recv() {
            out.push(m);
        }
        out
    }

    fn events(&mut self) -> Vec<ServerEvent> {
        self.frames()
            .into_iter()
            .filter_map(|m| match m {
                Message::Text(s) => Some(ServerEvent::from_json(&s).unwrap()),
                _ => None,
            })
            .collect()
    }
}

async fn connect_and_join(h: &Harness, user: &str, rooms: &[&str]) -> Client {
    let (tx, rx) = mpsc::channel(64);
    let identity = Identity {
        user_id: UserId::from(user),
        display_name: user.into(),
    };
    let (ctx, _conn) = h
        .gateway
        .connect(ConnectionId::from(format!("c-{user}")), identity, tx);
    for r in rooms {
        h.gateway.join_chat_room(&ctx, &RoomId::from(*r)).await.unwrap();
    }
    let mut client = Client { ctx, rx };
    client.frames();
    client
}

#[tokio::test(start_paused = true)]
async fn evicts_only_sessions_past_the_threshold() {
    let h = harness().await;
    let mut alice = connect_and_join(&h, "alice", &["lobby"]).await;
    tokio::time::advance(Duration::from_secs(120)).await;
    let mut bob = connect_and_join(&h, "bob", &["lobby"]).await;
    alice.frames();
    tokio::time::advance(Duration::from_secs(60)).await;

    let report = h
        .sweeper
        .sweep_once(Instant::now(), &CancellationToken::new())
        .await;
    assert_eq!(report.scanned, 2);
    assert_eq!(report.evicted, 1);
    assert_eq!(report.room_failures, 0);
    assert!(!report.abandoned);

    // Bystander sees the idle departure with the resolved display name.
    match bob.events().as_slice() {
        [ServerEvent::UserLeft {
            room_id,
            user_id,
            username,
            reason,
            message,
        }] => {
            assert_eq!(room_id.as_str(), "lobby");
            assert_eq!(user_id.as_str(), "alice");
            assert_eq!(username.as_deref(), Some("Alice"));
            assert_eq!(reason.as_deref(), Some(IDLE_REASON));
            assert_eq!(message, IDLE_KICK_MESSAGE);
        }
        other => panic!("unexpected {other:?}"),
    }

    // The evicted connection: UserLeft, Kicked, ForceDisconnect, then close.
    let frames = alice.frames();
    let names: Vec<&str> = frames
        .iter()
        .filter_map(|m| match m {
            Message::Text(s) => Some(ServerEvent::from_json(s).unwrap().name()),
            _ => None,
        })
        .collect();
    assert_eq!(names, vec!["UserLeft", "Kicked", "ForceDisconnect"]);
    match frames.last() {
        Some(Message::Close(Some(frame))) => assert_eq!(frame.code, FORCED_CLOSE_CODE),
        other => panic!("expected close frame, got {other:?}"),
    }

    assert!(h.registry.get(&alice.ctx.connection_id).is_none());
    assert!(!h.core.is_connected(&alice.ctx.connection_id));
    assert_eq!(h.core.members(&"lobby".into()), vec![bob.ctx.connection_id.clone()]);
    assert_eq!(
        h.store.room_members(&"lobby".into()).await.unwrap(),
        vec![UserId::from("bob")]
    );
    assert!(h.registry.get(&bob.ctx.connection_id).is_some());
    assert_eq!(h.metrics.evictions.get(&[]), 1);
}

#[tokio::test(start_paused = true)]
async fn any_command_resets_idleness() {
    let h = harness().await;
    let alice = connect_and_join(&h, "alice", &["lobby"]).await;

    tokio::time::advance(Duration::from_secs(100)).await;
    h.gateway.ping(&alice.ctx);
    tokio::time::advance(Duration::from_secs(100)).await;

    let report = h
        .sweeper
        .sweep_once(Instant::now(), &CancellationToken::new())
        .await;
    assert_eq!(report.evicted, 0);
    assert!(h.registry.is_joined(&alice.ctx.connection_id, &"lobby".into()));
}

#[tokio::test(start_paused = true)]
async fn session_without_rooms_is_still_evicted() {
    let h = harness().await;
    let mut alice = connect_and_join(&h, "alice", &[]).await;
    tokio::time::advance(Duration::from_secs(121)).await;

    let report = h
        .sweeper
        .sweep_once(Instant::now(), &CancellationToken::new())
        .await;
    assert_eq!(report.evicted, 1);
    let names: Vec<_> = alice.events().iter().map(ServerEvent::name).collect();
    assert_eq!(names, vec!["Kicked", "ForceDisconnect"]);
    assert!(h.registry.is_empty());
}

#[tokio::test(start_paused = true)]
async fn room_failure_does_not_stop_the_eviction() {
    let h = harness_with(Some("ops"), false).await;
    let alice = connect_and_join(&h, "alice", &["lobby", "ops"]).await;
    let mut bob = connect_and_join(&h, "bob", &["ops"]).await;
    tokio::time::advance(Duration::from_secs(90)).await;
    h.gateway.ping(&bob.ctx);
    bob.frames();
    tokio::time::advance(Duration::from_secs(60)).await;

    let report = h
        .sweeper
        .sweep_once(Instant::now(), &CancellationToken::new())
        .await;
    assert_eq!(report.evicted, 1);
    assert_eq!(report.room_failures, 1);
    assert_eq!(h.metrics.eviction_room_failures.get(&[]), 1);

    // Failed persistence still broadcasts, without a display name.
    match bob.events().as_slice() {
        [ServerEvent::UserLeft {
            room_id, username, ..
        }] => {
            assert_eq!(room_id.as_str(), "ops");
            assert_eq!(*username, None);
        }
        other => panic!("unexpected {other:?}"),
    }

    assert!(h.registry.get(&alice.ctx.connection_id).is_none());
    assert!(!h.core.is_subscribed(&alice.ctx.connection_id, &"ops".into()));
    assert!(!h.core.is_subscribed(&alice.ctx.connection_id, &"lobby".into()));
    assert!(!h
        .store
        .room_members(&"lobby".into())
        .await
        .unwrap()
        .contains(&UserId::from("alice")));
}

#[tokio::test(start_paused = true)]
async fn sweep_racing_a_leave_ends_consistent() {
    let h = harness().await;
    let alice = connect_and_join(&h, "alice", &["lobby"]).await;
    tokio::time::advance(Duration::from_secs(150)).await;
    // Joins after the clock moved, so bob stays active.
    let mut bob = connect_and_join(&h, "bob", &["lobby"]).await;

    let token = CancellationToken::new();
    let lobby = RoomId::from("lobby");
    // The sweep suspends inside persistence, so the leave runs mid-eviction.
    let (report, left) = tokio::join!(
        h.sweeper.sweep_once(Instant::now(), &token),
        h.gateway.leave_chat_room(&alice.ctx, &lobby),
    );

    assert!(matches!(left, Ok(())));
    assert_eq!(report.evicted, 1);
    assert_eq!(report.room_failures, 0);

    let alice_id = &alice.ctx.connection_id;
    assert!(!h.core.members(&lobby).contains(alice_id));
    assert_eq!(h.core.members(&lobby), vec![bob.ctx.connection_id.clone()]);
    assert!(!h.core.is_connected(alice_id));
    assert!(h.registry.get(alice_id).is_none());
    assert!(h.registry.get(&bob.ctx.connection_id).is_some());
    assert!(!h
        .store
        .room_members(&lobby)
        .await
        .unwrap()
        .contains(&UserId::from("alice")));

    let left_events: Vec<Option<String>> = bob
        .events()
        .into_iter()
        .filter_map(|e| match e {
            ServerEvent::UserLeft { user_id, reason, .. } if user_id.as_str() == "alice" => {
                Some(reason)
            }
            _ => None,
        })
        .collect();
    let idle_reason = Some(IDLE_REASON.to_string());
    assert_eq!(left_events.iter().filter(|r| **r == idle_reason).count(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancelled_sweep_is_abandoned() {
    let h = harness().await;
    let alice = connect_and_join(&h, "alice", &["lobby"]).await;
    tokio::time::advance(Duration::from_secs(150)).await;

    let token = CancellationToken::new();
    token.cancel();
    let report = h.sweeper.sweep_once(Instant::now(), &token).await;
    assert!(report.abandoned);
    assert_eq!(report.evicted, 0);
    assert!(h.registry.get(&alice.ctx.connection_id).is_some());
}

#[tokio::test(start_paused = true)]
async fn shutdown_interrupts_a_hung_persistence_call() {
    let h = harness_with(None, true).await;
    let alice = connect_and_join(&h, "alice", &["lobby"]).await;
    tokio::time::advance(Duration::from_secs(150)).await;

    let token = CancellationToken::new();
    let sweeper = h.sweeper.clone();
    let child = token.clone();
    let task = tokio::spawn(async move { sweeper.sweep_once(Instant::now(), &child).await });

    tokio::task::yield_now().await;
    token.cancel();
    let report = task.await.unwrap();

    assert!(report.abandoned);
    assert_eq!(report.evicted, 0);
    assert!(h.registry.get(&alice.ctx.connection_id).is_some());
}

#[tokio::test(start_paused = true)]
async fn run_loop_sweeps_on_its_own_interval() {
    let h = harness().await;
    let alice = connect_and_join(&h, "alice", &["lobby"]).await;

    let shutdown = CancellationToken::new();
    let handle = h.sweeper.clone().spawn(shutdown.clone());

    for _ in 0..20 {
        if h.registry.get(&alice.ctx.connection_id).is_none() {
            break;
        }
        tokio::time::sleep(Duration::from_secs(30)).await;
    }
    assert!(h.registry.get(&alice.ctx.connection_id).is_none());
    assert!(h.metrics.sweeps.get(&[]) >= 1);

    shutdown.cancel();
    handle.await.unwrap();
}
