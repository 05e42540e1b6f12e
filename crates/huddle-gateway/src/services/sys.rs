use std::sync::Arc;

use async_trait::async_trait;

use huddle_core::error::{HuddleError, Result};
use huddle_core::protocol::Envelope;

use crate::dispatch::TextService;
use crate::gateway::{RoomGateway, SessionCtx};

/// Heartbeat. Keeps `last_activity` fresh between real commands.
pub struct SysService {
    gateway: Arc<RoomGateway>,
}

impl SysService {
    pub fn new(gateway: Arc<RoomGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl TextService for SysService {
    fn svc(&self) -> &'static str {
        "sys"
    }

    async fn handle(&self, ctx: &SessionCtx, env: Envelope) -> Result<()> {
        match env.msg_type.as_str() {
            "ping" => {
                self.gateway.ping(ctx);
                Ok(())
            }
            other => Err(HuddleError::BadRequest(format!("unknown sys type: {other}"))),
        }
    }
}
