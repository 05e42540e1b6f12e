use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use huddle_core::error::{HuddleError, Result};
use huddle_core::protocol::{Envelope, ServerEvent};

use crate::dispatch::TextService;
use crate::gateway::{RoomGateway, SessionCtx};

pub struct ChatService {
    gateway: Arc<RoomGateway>,
}

impl ChatService {
    pub fn new(gateway: Arc<RoomGateway>) -> Self {
        Self { gateway }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SendReq {
    text: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct HistoryReq {
    #[serde(default)]
    limit: Option<u32>,
}

#[async_trait]
impl TextService for ChatService {
    fn svc(&self) -> &'static str {
        "chat"
    }

    async fn handle(&self, ctx: &SessionCtx, env: Envelope) -> Result<()> {
        let room = env.require_room()?;
        match env.msg_type.as_str() {
            "join" => self.gateway.join_chat_room(ctx, &room).await,
            "leave" => self.gateway.leave_chat_room(ctx, &room).await,
            "send" => {
                let req: SendReq = env.data_as()?;
                self.gateway.send_message(ctx, &room, &req.text).await?;
                Ok(())
            }
            "history" => {
                let req: HistoryReq = env.data_or_default()?;
                let messages = self.gateway.get_chat_history(ctx, &room, req.limit).await?;
                self.gateway.send_to_caller(
                    ctx,
                    &ServerEvent::ChatHistory {
                        room_id: room,
                        seq: env.seq,
                        messages,
                    },
                );
                Ok(())
            }
            other => Err(HuddleError::BadRequest(format!("unknown chat type: {other}"))),
        }
    }
}
