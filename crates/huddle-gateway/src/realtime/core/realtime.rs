use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message};
use dashmap::DashMap;
use futures_util::stream::FuturesUnordered;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};
use tokio_util::sync::CancellationToken;

use huddle_core::error::{HuddleError, Result};
use huddle_core::protocol::ServerEvent;
use huddle_core::{ConnectionId, RoomId};

use crate::obs::metrics::GatewayMetrics;
use crate::realtime::core::RoomGroups;
use crate::realtime::types::{Outgoing, PreparedMsg, QoS};

/// WebSocket close code sent on forced disconnects (policy violation).
pub const FORCED_CLOSE_CODE: u16 = 1008;

/// One connection's outbound queue plus its kill switch.
#[derive(Clone)]
pub struct Connection {
    pub tx: mpsc::Sender<Message>,
    pub kill: CancellationToken,
}

impl Connection {
    pub fn new(tx: mpsc::Sender<Message>) -> Self {
        Self {
            tx,
            kill: CancellationToken::new(),
        }
    }
}

/// Transport substrate: connection table, broadcast groups, and egress.
///
/// Group lookups copy the member list out of `RoomGroups` before sending, so a
/// slow member never holds a map lock while its queue is awaited.
pub struct RealtimeCore {
    connections: DashMap<ConnectionId, Connection>,
    groups: RoomGroups,
    metrics: Arc<GatewayMetrics>,
}

impl Default for RealtimeCore {
    fn default() -> Self {
        Self::new(Arc::new(GatewayMetrics::default()))
    }
}

impl RealtimeCore {
    pub fn new(metrics: Arc<GatewayMetrics>) -> Self {
        Self {
            connections: DashMap::new(),
            groups: RoomGroups::new(),
            metrics,
        }
    }

    /// Add a connection. `huddle_connections` counts table entries, so a
    /// replaced entry is not counted twice.
    pub fn register(&self, conn_id: ConnectionId, conn: Connection) {
        if self.connections.insert(conn_id.clone(), conn).is_some() {
            tracing::warn!(conn = %conn_id, "transport connection replaced");
        } else {
            self.metrics.connections.inc(&[]);
        }
    }

    /// Drop the connection and all of its group subscriptions.
    /// `None` if it was already gone; repeated calls are no-ops.
    pub fn unregister(&self, conn_id: &ConnectionId) -> Option<Vec<RoomId>> {
        self.connections.remove(conn_id)?;
        self.metrics.connections.dec(&[]);
        Some(self.groups.cleanup_connection(conn_id))
    }

    pub fn is_connected(&self, conn_id: &ConnectionId) -> bool {
        self.connections.contains_key(conn_id)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Add `conn_id` to the room's group.
    ///
    /// The connection entry stays read-locked until the group insert is done,
    /// so a concurrent `unregister` either fails this call or runs its group
    /// cleanup after the insert.
    pub fn subscribe(&self, conn_id: &ConnectionId, room: &RoomId) -> Result<()> {
        let Some(_entry) = self.connections.get(conn_id) else {
            return Err(HuddleError::Internal(format!(
                "subscribe: connection {conn_id} not registered"
            )));
        };
        self.groups.subscribe(room, conn_id);
        Ok(())
    }

    pub fn unsubscribe(&self, conn_id: &ConnectionId, room: &RoomId) -> bool {
        self.groups.unsubscribe(room, conn_id)
    }

    pub fn members(&self, room: &RoomId) -> Vec<ConnectionId> {
        self.groups.members(room)
    }

    pub fn is_subscribed(&self, conn_id: &ConnectionId, room: &RoomId) -> bool {
        self.groups.is_subscribed(room, conn_id)
    }

    /// Fire-and-forget send to a single connection.
    /// Returns false if the connection is gone or its queue is full.
    pub fn send_to_connection(&self, conn_id: &ConnectionId, event: &ServerEvent) -> Result<bool> {
        let prepared = PreparedMsg::prepare(event)?;
        Ok(self.send_prepared(conn_id, &prepared))
    }

    fn send_prepared(&self, conn_id: &ConnectionId, prepared: &PreparedMsg) -> bool {
        let Some(tx) = self.connections.get(conn_id).map(|c| c.tx.clone()) else {
            return false;
        };
        let sent = tx.try_send(prepared.to_ws_message()).is_ok();
        if !sent {
            self.metrics.egress_drops.inc(&[("event", prepared.name())]);
        }
        sent
    }

    /// Encode once, then deliver to every current member of `room`.
    /// Returns the number of members the event was handed to.
    pub async fn publish_room(&self, room: &RoomId, out: Outgoing) -> Result<usize> {
        let prepared = PreparedMsg::prepare(&out.event)?;
        Ok(self.deliver(room, &prepared, out.qos).await)
    }

    pub async fn deliver(&self, room: &RoomId, prepared: &PreparedMsg, qos: QoS) -> usize {
        self.metrics.broadcasts.inc(&[("event", prepared.name())]);
        match qos {
            QoS::Lossy => self.publish_room_lossy(room, prepared),
            QoS::Reliable { timeout_ms } => {
                self.publish_room_reliable(room, prepared, timeout_ms).await
            }
        }
    }

    /// Lossy broadcast: try_send only, drop if a member's queue is full.
    pub fn publish_room_lossy(&self, room: &RoomId, prepared: &PreparedMsg) -> usize {
        self.groups
            .members(room)
            .iter()
            .filter(|c| self.send_prepared(c, prepared))
            .count()
    }

    /// Reliable broadcast: await queue space for every member concurrently,
    /// each bounded by `timeout_ms`.
    pub async fn publish_room_reliable(
        &self,
        room: &RoomId,
        prepared: &PreparedMsg,
        timeout_ms: u64,
    ) -> usize {
        let senders: Vec<mpsc::Sender<Message>> = self
            .groups
            .members(room)
            .iter()
            .filter_map(|c| self.connections.get(c).map(|conn| conn.tx.clone()))
            .collect();

        let mut futs = FuturesUnordered::new();
        for tx in senders {
            let msg = prepared.to_ws_message();
            futs.push(async move {
                if timeout_ms > 0 {
                    matches!(
                        timeout(Duration::from_millis(timeout_ms), tx.send(msg)).await,
                        Ok(Ok(()))
                    )
                } else {
                    tx.send(msg).await.is_ok()
                }
            });
        }

        let mut delivered = 0;
        while let Some(ok) = futs.next().await {
            if ok {
                delivered += 1;
            } else {
                self.metrics.egress_drops.inc(&[("event", prepared.name())]);
            }
        }
        delivered
    }

    /// Tell one connection to go away and trip its kill switch.
    ///
    /// The `ForceDisconnect` event and the close frame are queued behind
    /// anything already pending; the session loop flushes the queue before
    /// closing. Returns false if the connection was already gone.
    pub fn force_disconnect(&self, conn_id: &ConnectionId, reason: &str) -> bool {
        let Some(conn) = self.connections.get(conn_id).map(|c| c.value().clone()) else {
            return false;
        };
        if let Ok(p) = PreparedMsg::prepare(&ServerEvent::ForceDisconnect {}) {
            let _ = conn.tx.try_send(p.to_ws_message());
        }
        let _ = conn.tx.try_send(Message::Close(Some(CloseFrame {
            code: FORCED_CLOSE_CODE,
            reason: reason.to_string().into(),
        })));
        conn.kill.cancel();
        true
    }
}
