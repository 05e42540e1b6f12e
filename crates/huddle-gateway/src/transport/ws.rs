//! WebSocket handler.
//!
//! Responsibilities:
//! - Verify `access_token` before upgrading (401 otherwise)
//! - Register the connection with the room gateway (presence + transport)
//! - Writer task draining the outbound queue, so a command that awaits room
//!   delivery never waits on its own socket
//! - Reader loop: decode once, dispatch, report failures to the caller only
//! - Lifecycle: heartbeat ping, forced disconnect, server shutdown

use std::time::Duration;

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::Instrument;

use huddle_core::protocol::Envelope;
use huddle_core::{ConnectionId, Identity};

use crate::app_state::AppState;
use crate::gateway::SessionCtx;
use crate::transport::codec::{decode, Inbound};

/// Close code sent to open connections when the server shuts down.
const GOING_AWAY: u16 = 1001;
/// Upper bound on flushing queued frames after the session ends.
const WRITER_DRAIN: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    #[serde(default)]
    pub access_token: String,
}

pub async fn ws_upgrade(
    State(app): State<AppState>,
    Query(q): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    if app.is_draining() {
        return (StatusCode::SERVICE_UNAVAILABLE, "draining").into_response();
    }

    let identity = match app.identity().verify(&q.access_token).await {
        Ok(identity) => identity,
        Err(e) => {
            app.metrics().auth_failures.inc(&[]);
            tracing::warn!(error = %e, "websocket auth rejected");
            return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
        }
    };

    let connection_id = ConnectionId::generate();
    let span = tracing::info_span!(
        "session",
        conn = %connection_id,
        user = %identity.user_id
    );

    ws.on_upgrade(move |socket| run_session(app, connection_id, identity, socket).instrument(span))
}

async fn run_session(app: AppState, connection_id: ConnectionId, identity: Identity, socket: WebSocket) {
    let gw = &app.cfg().gateway;
    let (out_tx, mut out_rx) = mpsc::channel::<Message>(gw.outbound_queue);
    let (mut ws_tx, mut ws_rx) = socket.split();

    let mut writer = tokio::spawn(
        async move {
            while let Some(m) = out_rx.recv().await {
                let closing = matches!(m, Message::Close(_));
                if ws_tx.send(m).await.is_err() || closing {
                    break;
                }
            }
            let _ = ws_tx.close().await;
        }
        .in_current_span(),
    );

    let gateway = app.gateway();
    let (ctx, conn) = gateway.connect(connection_id, identity, out_tx.clone());
    let shutdown = app.shutdown_token();

    let ping_every = Duration::from_millis(gw.ping_interval_ms);
    let mut ping_tick = tokio::time::interval_at(Instant::now() + ping_every, ping_every);
    ping_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = conn.kill.cancelled() => {
                tracing::info!("connection force-closed");
                break;
            }

            _ = shutdown.cancelled() => {
                let _ = out_tx.try_send(Message::Close(Some(CloseFrame {
                    code: GOING_AWAY,
                    reason: "server shutting down".into(),
                })));
                break;
            }

            // Transport heartbeat only; does not count as activity.
            _ = ping_tick.tick() => {
                let _ = out_tx.try_send(Message::Ping(Vec::new()));
            }

            incoming = ws_rx.next() => {
                let Some(Ok(msg)) = incoming else { break; };
                match decode(msg) {
                    Ok(Inbound::Text(env)) => handle_command(&app, &ctx, env).await,
                    Ok(Inbound::Ping(payload)) => {
                        let _ = out_tx.try_send(Message::Pong(payload));
                    }
                    Ok(Inbound::Pong) => {}
                    Ok(Inbound::Close) => break,
                    Err(e) => gateway.report_error(&ctx, &e, None),
                }
            }
        }
    }

    gateway.disconnect(&ctx);
    drop(conn);
    drop(out_tx);

    if tokio::time::timeout(WRITER_DRAIN, &mut writer).await.is_err() {
        tracing::debug!("writer did not drain in time");
        writer.abort();
    }
}

/// Dispatch one command. Only handled commands are labelled in metrics, so
/// arbitrary client `svc`/`type` strings never create new series.
async fn handle_command(app: &AppState, ctx: &SessionCtx, env: Envelope) {
    let svc = env.svc.clone();
    let msg_type = env.msg_type.clone();
    let seq = env.seq;
    let started = Instant::now();

    match app.dispatcher().dispatch_text(ctx, env).await {
        Ok(()) => {
            let labels = [("svc", svc.as_str()), ("type", msg_type.as_str())];
            app.metrics().commands.inc(&labels);
            app.metrics()
                .command_duration
                .observe(&labels, started.elapsed());
        }
        Err(e) => app.gateway().report_error(ctx, &e, seq),
    }
}
