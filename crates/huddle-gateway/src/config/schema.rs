use std::collections::HashSet;
use std::time::Duration;

use serde::Deserialize;
use huddle_core::error::{HuddleError, Result};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    pub version: u32,

    #[serde(default)]
    pub gateway: GatewaySection,

    #[serde(default)]
    pub sweeper: SweeperSection,

    #[serde(default)]
    pub identities: Vec<IdentityConfig>,

    #[serde(default)]
    pub rooms: Vec<RoomConfig>,
}

impl GatewayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(HuddleError::UnsupportedVersion);
        }

        self.gateway.validate()?;
        self.sweeper.validate()?;

        let mut tokens = HashSet::new();
        let mut users = HashSet::new();
        for id in &self.identities {
            if id.token.is_empty() || id.user_id.is_empty() {
                return Err(HuddleError::BadRequest(
                    "identities: token and user_id must not be empty".into(),
                ));
            }
            if !tokens.insert(id.token.as_str()) {
                return Err(HuddleError::BadRequest(format!(
                    "identities: duplicate token for user {}",
                    id.user_id
                )));
            }
            if !users.insert(id.user_id.as_str()) {
                return Err(HuddleError::BadRequest(format!(
                    "identities: duplicate user_id {}",
                    id.user_id
                )));
            }
        }

        let mut room_ids = HashSet::new();
        for room in &self.rooms {
            if !room_ids.insert(room.id.as_str()) {
                return Err(HuddleError::BadRequest(format!("rooms: duplicate id {}", room.id)));
            }
            if let Some(unknown) = room.members.iter().find(|m| !users.contains(m.as_str())) {
                return Err(HuddleError::BadRequest(format!(
                    "rooms[{}]: member {unknown} is not a configured identity",
                    room.id
                )));
            }
        }

        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewaySection {
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,

    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,

    #[serde(default = "default_message_timeout_ms")]
    pub message_timeout_ms: u64,

    #[serde(default = "default_history_default_limit")]
    pub history_default_limit: u32,

    #[serde(default = "default_history_max_limit")]
    pub history_max_limit: u32,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            ping_interval_ms: default_ping_interval_ms(),
            outbound_queue: default_outbound_queue(),
            message_timeout_ms: default_message_timeout_ms(),
            history_default_limit: default_history_default_limit(),
            history_max_limit: default_history_max_limit(),
        }
    }
}

impl GatewaySection {
    pub fn validate(&self) -> Result<()> {
        if !(5000..=120000).contains(&self.ping_interval_ms) {
            return Err(HuddleError::BadRequest(
                "gateway.ping_interval_ms must be between 5000 and 120000".into(),
            ));
        }
        if !(16..=65536).contains(&self.outbound_queue) {
            return Err(HuddleError::BadRequest(
                "gateway.outbound_queue must be between 16 and 65536".into(),
            ));
        }
        if self.message_timeout_ms > 60000 {
            return Err(HuddleError::BadRequest(
                "gateway.message_timeout_ms must be at most 60000".into(),
            ));
        }
        if self.history_default_limit == 0 || self.history_max_limit == 0 {
            return Err(HuddleError::BadRequest(
                "gateway.history limits must be positive".into(),
            ));
        }
        if self.history_default_limit > self.history_max_limit {
            return Err(HuddleError::BadRequest(
                "gateway.history_default_limit must not exceed history_max_limit".into(),
            ));
        }
        Ok(())
    }

    pub fn history_limits(&self) -> HistoryLimits {
        HistoryLimits {
            default: self.history_default_limit,
            max: self.history_max_limit,
        }
    }
}

/// Default and ceiling applied to history requests.
#[derive(Debug, Clone, Copy)]
pub struct HistoryLimits {
    pub default: u32,
    pub max: u32,
}

impl HistoryLimits {
    /// Requested limit, defaulted and clamped into `1..=max`.
    pub fn resolve(&self, requested: Option<u32>) -> u32 {
        requested.unwrap_or(self.default).clamp(1, self.max)
    }
}

impl Default for HistoryLimits {
    fn default() -> Self {
        GatewaySection::default().history_limits()
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SweeperSection {
    #[serde(default = "default_sweep_interval_ms")]
    pub interval_ms: u64,

    #[serde(default = "default_idle_threshold_ms")]
    pub idle_threshold_ms: u64,
}

impl Default for SweeperSection {
    fn default() -> Self {
        Self {
            interval_ms: default_sweep_interval_ms(),
            idle_threshold_ms: default_idle_threshold_ms(),
        }
    }
}

impl SweeperSection {
    pub fn validate(&self) -> Result<()> {
        if !(1000..=600000).contains(&self.interval_ms) {
            return Err(HuddleError::BadRequest(
                "sweeper.interval_ms must be between 1000 and 600000".into(),
            ));
        }
        if !(10000..=3600000).contains(&self.idle_threshold_ms) {
            return Err(HuddleError::BadRequest(
                "sweeper.idle_threshold_ms must be between 10000 and 3600000".into(),
            ));
        }
        if self.idle_threshold_ms <= self.interval_ms {
            return Err(HuddleError::BadRequest(
                "sweeper.idle_threshold_ms must be greater than interval_ms".into(),
            ));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn idle_threshold(&self) -> Duration {
        Duration::from_millis(self.idle_threshold_ms)
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".into()
}
fn default_ping_interval_ms() -> u64 {
    20000
}
fn default_outbound_queue() -> usize {
    1024
}
fn default_message_timeout_ms() -> u64 {
    1500
}
fn default_history_default_limit() -> u32 {
    50
}
fn default_history_max_limit() -> u32 {
    200
}
fn default_sweep_interval_ms() -> u64 {
    30000
}
fn default_idle_threshold_ms() -> u64 {
    120000
}

/// One entry of the static identity table.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdentityConfig {
    pub token: String,
    pub user_id: String,
    pub display_name: String,
}

/// Room seeded into the in-memory store at boot.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoomConfig {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub members: Vec<String>,
}
