//! HTTP-level checks for the `/v1/ws` upgrade and readiness endpoints,
//! served over a real listener so the upgrade extractor sees a live
//! hyper connection.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use huddle_gateway::{app_state::AppState, config, router};

const CONFIG: &str = r#"
version: 1
identities:
  - { token: "t-alice", user_id: "alice", display_name: "Alice" }
rooms:
  - id: "lobby"
    members: ["alice"]
"#;

async fn serve() -> (AppState, SocketAddr) {
    let state = AppState::new(config::load_from_str(CONFIG).unwrap()).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router::build_router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (state, addr)
}

/// Send one raw HTTP/1.1 request and return the status code plus the open
/// stream (an upgraded socket stays alive while the stream does).
async fn request(addr: SocketAddr, path: &str, upgrade: bool) -> (u16, TcpStream) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let mut req = format!("GET {path} HTTP/1.1\r\nHost: {addr}\r\n");
    if upgrade {
        req.push_str(
            "Connection: Upgrade\r\n\
             Upgrade: websocket\r\n\
             Sec-WebSocket-Version: 13\r\n\
             Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n",
        );
    }
    req.push_str("\r\n");
    stream.write_all(req.as_bytes()).await.unwrap();

    let mut head = Vec::new();
    let mut buf = [0u8; 512];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf))
            .await
            .expect("response head timed out")
            .unwrap();
        assert!(n > 0, "connection closed before the response head");
        head.extend_from_slice(&buf[..n]);
    }

    let head = String::from_utf8_lossy(&head);
    let status = head
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| panic!("malformed status line: {head}"));
    (status, stream)
}

#[tokio::test]
async fn unknown_token_is_refused_before_upgrade() {
    let (state, addr) = serve().await;

    let (status, _s) = request(addr, "/v1/ws?access_token=nope", true).await;
    assert_eq!(status, 401);
    assert_eq!(state.metrics().auth_failures.get(&[]), 1);
    assert!(state.registry().is_empty());
}

#[tokio::test]
async fn missing_token_is_a_client_error() {
    let (state, addr) = serve().await;

    let (status, _s) = request(addr, "/v1/ws", true).await;
    assert!((400..500).contains(&status), "got {status}");
    assert!(state.registry().is_empty());
}

#[tokio::test]
async fn valid_token_upgrades_and_registers_a_session() {
    let (state, addr) = serve().await;

    let (status, _socket) = request(addr, "/v1/ws?access_token=t-alice", true).await;
    assert_eq!(status, 101);
    assert_eq!(state.metrics().auth_failures.get(&[]), 0);

    let mut registered = false;
    for _ in 0..100 {
        if state.registry().len() == 1 {
            registered = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(registered, "session never reached the presence registry");
    assert_eq!(state.metrics().connections.get(&[]), 1);
}

#[tokio::test]
async fn draining_refuses_upgrades_and_flips_readiness() {
    let (state, addr) = serve().await;

    let (ready, _s) = request(addr, "/readyz", false).await;
    assert_eq!(ready, 200);

    state.begin_shutdown();

    let (status, _s) = request(addr, "/v1/ws?access_token=t-alice", true).await;
    assert_eq!(status, 503);
    let (ready, _s) = request(addr, "/readyz", false).await;
    assert_eq!(ready, 503);
    assert!(state.registry().is_empty());
    assert_eq!(state.metrics().auth_failures.get(&[]), 0);
}
