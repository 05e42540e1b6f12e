//! Gateway config loader (strict parsing).

pub mod schema;

use std::fs;

use huddle_core::error::{HuddleError, Result};

pub use schema::{
    GatewayConfig, GatewaySection, HistoryLimits, IdentityConfig, RoomConfig, SweeperSection,
};

/// Used when neither a CLI argument nor `HUDDLE_CONFIG` names a file.
pub const DEFAULT_CONFIG_PATH: &str = "huddle.yaml";

/// First CLI argument, then `HUDDLE_CONFIG`, then the default path.
pub fn resolve_path() -> String {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var("HUDDLE_CONFIG").ok())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
}

pub fn load_from_file(path: &str) -> Result<GatewayConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| HuddleError::Internal(format!("read config {path} failed: {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<GatewayConfig> {
    let cfg: GatewayConfig = serde_yaml::from_str(s)
        .map_err(|e| HuddleError::BadRequest(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
