#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::time::Duration;

use huddle_gateway::config;

#[test]
fn deny_unknown_fields_nested() {
    let bad = r#"
version: 1
sweeper:
  interval_ms: 30000
  idle_treshold_ms: 120000 # typo should fail
"#;

    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.client_code().as_str(), "BAD_REQUEST");
}

#[test]
fn ok_minimal_config_uses_defaults() {
    let cfg = config::load_from_str("version: 1\n").expect("must parse");
    assert_eq!(cfg.version, 1);
    assert_eq!(cfg.gateway.listen, "0.0.0.0:8080");
    assert_eq!(cfg.sweeper.interval(), Duration::from_secs(30));
    assert_eq!(cfg.sweeper.idle_threshold(), Duration::from_secs(120));
    assert_eq!(cfg.gateway.history_limits().resolve(None), 50);
    assert_eq!(cfg.gateway.history_limits().resolve(Some(10_000)), 200);
    assert_eq!(cfg.gateway.history_limits().resolve(Some(0)), 1);
}

#[test]
fn wrong_version_is_rejected() {
    let err = config::load_from_str("version: 2\n").expect_err("must fail");
    assert_eq!(err.client_code().as_str(), "UNSUPPORTED_VERSION");
}

#[test]
fn threshold_must_exceed_interval() {
    let bad = r#"
version: 1
sweeper:
  interval_ms: 60000
  idle_threshold_ms: 60000
"#;
    assert!(config::load_from_str(bad).is_err());
}

#[test]
fn room_members_must_be_known_identities() {
    let bad = r#"
version: 1
identities:
  - { token: "t-alice", user_id: "alice", display_name: "Alice" }
rooms:
  - id: "lobby"
    members: ["alice", "mallory"]
"#;
    let err = config::load_from_str(bad).expect_err("must fail");
    assert!(err.to_string().contains("mallory"));
}

#[test]
fn duplicate_tokens_are_rejected() {
    let bad = r#"
version: 1
identities:
  - { token: "same", user_id: "alice", display_name: "Alice" }
  - { token: "same", user_id: "bob", display_name: "Bob" }
"#;
    assert!(config::load_from_str(bad).is_err());
}

#[test]
fn sample_config_loads() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../huddle.yaml");
    let cfg = config::load_from_file(path).expect("sample config must load");
    assert_eq!(cfg.identities.len(), 2);
    assert_eq!(cfg.rooms[0].id, "lobby");
}
