//! Idle sweeper.
//!
//! Runs on its own fixed interval, independent of client traffic. Each sweep
//! snapshots the presence registry, picks sessions idle for longer than the
//! threshold, and evicts them: leave every room (persistence + `UserLeft`
//! broadcast + unsubscribe), `Kicked` to the connection, forced disconnect,
//! registry removal. Room-level failures are logged and skipped; the
//! connection-level eviction always completes unless the process is shutting
//! down.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use huddle_core::protocol::{ServerEvent, IDLE_KICK_MESSAGE, IDLE_REASON};
use huddle_core::RoomId;

use crate::collab::ChatStore;
use crate::config::SweeperSection;
use crate::obs::GatewayMetrics;
use crate::realtime::{Outgoing, PresenceRegistry, RealtimeCore, Session};

/// Outcome of one sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub evicted: usize,
    pub room_failures: usize,
    /// Shutdown interrupted the sweep before every idle session was handled.
    pub abandoned: bool,
}

pub struct IdleSweeper {
    registry: Arc<PresenceRegistry>,
    core: Arc<RealtimeCore>,
    store: Arc<dyn ChatStore>,
    metrics: Arc<GatewayMetrics>,
    interval: Duration,
    idle_threshold: Duration,
}

enum Eviction {
    Done { room_failures: usize },
    /// Session went away or became active after the snapshot.
    Skipped,
    Abandoned,
}

impl IdleSweeper {
    pub fn new(
        registry: Arc<PresenceRegistry>,
        core: Arc<RealtimeCore>,
        store: Arc<dyn ChatStore>,
        metrics: Arc<GatewayMetrics>,
        cfg: &SweeperSection,
    ) -> Self {
        Self {
            registry,
            core,
            store,
            metrics,
            interval: cfg.interval(),
            idle_threshold: cfg.idle_threshold(),
        }
    }

    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    /// Sweep every `interval` until `shutdown` fires.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut tick = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            interval_ms = self.interval.as_millis() as u64,
            idle_threshold_ms = self.idle_threshold.as_millis() as u64,
            "idle sweeper started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tick.tick() => {
                    let report = self.sweep_once(Instant::now(), &shutdown).await;
                    if report.evicted > 0 || report.room_failures > 0 {
                        tracing::info!(
                            scanned = report.scanned,
                            evicted = report.evicted,
                            room_failures = report.room_failures,
                            "idle sweep finished"
                        );
                    }
                    if report.abandoned {
                        break;
                    }
                }
            }
        }

        tracing::info!("idle sweeper stopped");
    }

    /// One sweep as of `now`.
    pub async fn sweep_once(&self, now: Instant, shutdown: &CancellationToken) -> SweepReport {
        let snapshot = self.registry.snapshot();
        let mut report = SweepReport {
            scanned: snapshot.len(),
            ..SweepReport::default()
        };
        self.metrics.sweeps.inc(&[]);

        let idle: Vec<Session> = snapshot
            .into_iter()
            .filter(|s| s.idle_for(now) > self.idle_threshold)
            .collect();

        for session in idle {
            if shutdown.is_cancelled() {
                report.abandoned = true;
                break;
            }
            match self.evict(&session, now, shutdown).await {
                Eviction::Done { room_failures } => {
                    report.evicted += 1;
                    report.room_failures += room_failures;
                }
                Eviction::Skipped => {}
                Eviction::Abandoned => {
                    report.abandoned = true;
                    break;
                }
            }
        }

        if report.abandoned {
            tracing::warn!(evicted = report.evicted, "idle sweep abandoned on shutdown");
        }
        report
    }

    async fn evict(&self, stale: &Session, now: Instant, shutdown: &CancellationToken) -> Eviction {
        let conn = &stale.connection_id;
        let user = &stale.user_id;

        // Re-read: the snapshot may be stale by now.
        let Some(current) = self.registry.get(conn) else {
            return Eviction::Skipped;
        };
        if current.idle_for(now) <= self.idle_threshold {
            tracing::debug!(conn = %conn, "session active again since snapshot; not evicting");
            return Eviction::Skipped;
        }

        tracing::info!(
            conn = %conn,
            user = %user,
            idle_ms = current.idle_for(now).as_millis() as u64,
            rooms = current.joined_rooms.len(),
            "kicking idle user"
        );

        let rooms: Vec<RoomId> = current.joined_rooms.iter().cloned().collect();
        let mut room_failures = 0;

        for room in rooms {
            let removed = tokio::select! {
                _ = shutdown.cancelled() => return Eviction::Abandoned,
                r = self.store.remove_member(&room, user) => r,
            };
            let username = match removed {
                Ok(name) => name,
                Err(e) => {
                    room_failures += 1;
                    self.metrics.eviction_room_failures.inc(&[]);
                    tracing::error!(conn = %conn, user = %user, room = %room, error = %e, "error removing idle user from chat room");
                    None
                }
            };

            let left = ServerEvent::UserLeft {
                room_id: room.clone(),
                user_id: user.clone(),
                username,
                reason: Some(IDLE_REASON.to_string()),
                message: IDLE_KICK_MESSAGE.to_string(),
            };
            if let Err(e) = self.core.publish_room(&room, Outgoing::lossy(left)).await {
                tracing::error!(room = %room, error = %e, "idle UserLeft broadcast failed");
            }

            self.core.unsubscribe(conn, &room);
            self.registry.leave_room(conn, &room);
        }

        if shutdown.is_cancelled() {
            return Eviction::Abandoned;
        }

        let kicked = ServerEvent::Kicked {
            reason: IDLE_KICK_MESSAGE.to_string(),
        };
        if let Err(e) = self.core.send_to_connection(conn, &kicked) {
            tracing::error!(conn = %conn, error = %e, "kick notice encode failed");
        }
        self.core.force_disconnect(conn, IDLE_KICK_MESSAGE);
        self.core.unregister(conn);
        self.registry.remove(conn);
        self.metrics.evictions.inc(&[]);

        Eviction::Done { room_failures }
    }
}
