//! Room gateway: the per-connection command protocol.
//!
//! Every command refreshes presence first, then mutates registry membership
//! and broadcast-group subscription together. Errors are returned to the
//! caller of each operation; `report_error` turns them into a caller-only
//! `Error` event. Room members never see a failed command.

use std::sync::Arc;

use axum::extract::ws::Message;
use tokio::sync::mpsc;

use huddle_core::error::{HuddleError, Result};
use huddle_core::protocol::ServerEvent;
use huddle_core::{ConnectionId, Identity, MessageRecord, RoomId, UserId};

use crate::collab::ChatStore;
use crate::config::HistoryLimits;
use crate::obs::GatewayMetrics;
use crate::realtime::{Connection, Outgoing, PreparedMsg, PresenceRegistry, QoS, RealtimeCore};

/// Per-connection context handed to services.
#[derive(Debug, Clone)]
pub struct SessionCtx {
    pub connection_id: ConnectionId,
    pub identity: Identity,
}

/// Tunables for the gateway, taken from `gateway.*` config.
#[derive(Debug, Clone, Copy)]
pub struct GatewayOptions {
    pub message_timeout_ms: u64,
    pub history: HistoryLimits,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            message_timeout_ms: 1500,
            history: HistoryLimits::default(),
        }
    }
}

pub struct RoomGateway {
    registry: Arc<PresenceRegistry>,
    core: Arc<RealtimeCore>,
    store: Arc<dyn ChatStore>,
    metrics: Arc<GatewayMetrics>,
    opts: GatewayOptions,
}

impl RoomGateway {
    pub fn new(
        registry: Arc<PresenceRegistry>,
        core: Arc<RealtimeCore>,
        store: Arc<dyn ChatStore>,
        metrics: Arc<GatewayMetrics>,
        opts: GatewayOptions,
    ) -> Self {
        Self {
            registry,
            core,
            store,
            metrics,
            opts,
        }
    }

    pub fn registry(&self) -> &Arc<PresenceRegistry> {
        &self.registry
    }

    pub fn core(&self) -> &Arc<RealtimeCore> {
        &self.core
    }

    /// Connecting -> Connected. Registers the outbound queue with the
    /// transport, creates the presence session, and greets the client.
    pub fn connect(
        &self,
        connection_id: ConnectionId,
        identity: Identity,
        tx: mpsc::Sender<Message>,
    ) -> (SessionCtx, Connection) {
        let conn = Connection::new(tx);
        self.core.register(connection_id.clone(), conn.clone());
        self.registry
            .add(connection_id.clone(), identity.user_id.clone());

        tracing::info!(
            conn = %connection_id,
            user = %identity.user_id,
            name = %identity.display_name,
            "connected"
        );

        let ctx = SessionCtx {
            connection_id,
            identity,
        };
        self.send_to_caller(
            &ctx,
            &ServerEvent::Connected {
                connection_id: ctx.connection_id.clone(),
                user_id: ctx.identity.user_id.clone(),
                display_name: ctx.identity.display_name.clone(),
            },
        );
        (ctx, conn)
    }

    /// Any state -> Disconnected. Safe to call after a forced eviction.
    pub fn disconnect(&self, ctx: &SessionCtx) {
        self.registry.touch(&ctx.connection_id);
        let session = self.registry.remove(&ctx.connection_id);
        let rooms = self.core.unregister(&ctx.connection_id).unwrap_or_default();

        tracing::info!(
            conn = %ctx.connection_id,
            user = %ctx.identity.user_id,
            rooms = rooms.len(),
            evicted = session.is_none(),
            "disconnected"
        );
    }

    /// The caller's registered user, or `Unauthorized` if the session is gone.
    fn caller(&self, ctx: &SessionCtx) -> Result<UserId> {
        match self.registry.user_of(&ctx.connection_id) {
            Some(user) if user == ctx.identity.user_id => Ok(user),
            _ => Err(HuddleError::Unauthorized),
        }
    }

    pub async fn join_chat_room(&self, ctx: &SessionCtx, room: &RoomId) -> Result<()> {
        let user = self.caller(ctx)?;

        // Encode before mutating anything so a failure leaves no trace.
        let joined = PreparedMsg::prepare(&ServerEvent::UserJoined {
            room_id: room.clone(),
            user_id: user.clone(),
            message: "User joined the chat".into(),
        })?;

        self.registry.touch(&ctx.connection_id);
        if !self.registry.join_room(&ctx.connection_id, room) {
            return Err(HuddleError::Unauthorized);
        }
        if let Err(e) = self.core.subscribe(&ctx.connection_id, room) {
            self.registry.leave_room(&ctx.connection_id, room);
            return Err(e);
        }

        tracing::info!(conn = %ctx.connection_id, user = %user, room = %room, "joined chat room");
        self.core.deliver(room, &joined, QoS::Lossy).await;
        Ok(())
    }

    pub async fn leave_chat_room(&self, ctx: &SessionCtx, room: &RoomId) -> Result<()> {
        let user = self.caller(ctx)?;
        let left = PreparedMsg::prepare(&ServerEvent::UserLeft {
            room_id: room.clone(),
            user_id: user.clone(),
            username: None,
            reason: None,
            message: "User left the chat".into(),
        })?;

        self.registry.touch(&ctx.connection_id);
        self.registry.leave_room(&ctx.connection_id, room);
        self.core.unsubscribe(&ctx.connection_id, room);

        tracing::info!(conn = %ctx.connection_id, user = %user, room = %room, "left chat room");
        self.core.deliver(room, &left, QoS::Lossy).await;
        Ok(())
    }

    pub async fn send_message(
        &self,
        ctx: &SessionCtx,
        room: &RoomId,
        text: &str,
    ) -> Result<MessageRecord> {
        if text.trim().is_empty() {
            return Err(HuddleError::Validation("Message cannot be empty".into()));
        }
        let user = self.caller(ctx)?;
        self.registry.touch(&ctx.connection_id);
        if !self.registry.is_joined(&ctx.connection_id, room) {
            return Err(HuddleError::NotAMember);
        }

        let record = self.store.append_message(room, &user, text).await?;
        tracing::info!(conn = %ctx.connection_id, user = %user, room = %room, msg = %record.id, "message sent");

        self.core
            .publish_room(
                room,
                Outgoing::reliable(
                    ServerEvent::ReceiveMessage(record.clone()),
                    self.opts.message_timeout_ms,
                ),
            )
            .await?;
        Ok(record)
    }

    /// Most recent messages, oldest first. Never broadcast.
    pub async fn get_chat_history(
        &self,
        ctx: &SessionCtx,
        room: &RoomId,
        limit: Option<u32>,
    ) -> Result<Vec<MessageRecord>> {
        self.caller(ctx)?;
        self.registry.touch(&ctx.connection_id);
        if !self.registry.is_joined(&ctx.connection_id, room) {
            return Err(HuddleError::NotAMember);
        }
        let limit = self.opts.history.resolve(limit);
        self.store.fetch_history(room, limit).await
    }

    pub fn ping(&self, ctx: &SessionCtx) {
        self.registry.touch(&ctx.connection_id);
    }

    /// Caller-only delivery. Drops silently if the caller is gone or backed up.
    pub fn send_to_caller(&self, ctx: &SessionCtx, event: &ServerEvent) {
        match self.core.send_to_connection(&ctx.connection_id, event) {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(conn = %ctx.connection_id, event = event.name(), "caller unreachable")
            }
            Err(e) => tracing::error!(conn = %ctx.connection_id, error = %e, "event encode failed"),
        }
    }

    /// Log a failed command and tell the caller, and only the caller.
    pub fn report_error(&self, ctx: &SessionCtx, err: &HuddleError, seq: Option<u64>) {
        let code = err.client_code().as_str();
        self.metrics.command_errors.inc(&[("code", code)]);
        if err.is_transient() || matches!(err, HuddleError::Internal(_)) {
            tracing::error!(conn = %ctx.connection_id, user = %ctx.identity.user_id, error = %err, "command failed");
        } else {
            tracing::warn!(conn = %ctx.connection_id, user = %ctx.identity.user_id, error = %err, "command rejected");
        }
        self.send_to_caller(ctx, &ServerEvent::error(err, seq));
    }
}
