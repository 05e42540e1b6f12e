//! Decode-once codec for the transport layer.
//!
//! - Text frames => `Envelope` (lazy `RawValue` for data)
//! - Binary frames are rejected; the command protocol is JSON only
//! - Ping/Pong/Close are surfaced for lifecycle management

use axum::extract::ws::Message;

use huddle_core::error::{HuddleError, Result};
use huddle_core::protocol::Envelope;

#[derive(Debug)]
pub enum Inbound {
    Text(Envelope),
    Ping(Vec<u8>),
    Pong,
    Close,
}

pub fn decode(msg: Message) -> Result<Inbound> {
    match msg {
        Message::Text(s) => Envelope::parse(&s).map(Inbound::Text),
        Message::Binary(_) => Err(HuddleError::BadRequest(
            "binary frames are not supported".into(),
        )),
        Message::Ping(v) => Ok(Inbound::Ping(v)),
        Message::Pong(_) => Ok(Inbound::Pong),
        Message::Close(_) => Ok(Inbound::Close),
    }
}
