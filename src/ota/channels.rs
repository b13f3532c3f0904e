//! Inbound message hand-off from the transport callback to the dispatch
//! task.
//!
//! The MQTT client delivers messages on its own task.  Lifecycle and
//! session state must only change on one path, so the callback copies each
//! message into a static `embassy-sync` channel and the dispatch task
//! drains it into [`OtaAgent::route`](super::agent::OtaAgent::route).
//!
//! ```text
//! ┌──────────────┐  InboundMsg  ┌───────────────┐
//! │ MQTT callback│────────────▶│ dispatch task │──▶ OtaAgent::route
//! └──────────────┘              └───────────────┘
//! ```

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use heapless::{String, Vec};
use log::warn;

use crate::config::TOPIC_BUFFER_SIZE;

/// Largest inbound payload kept: a start-next reply with its job document,
/// or a base64 block of up to 1 KiB plus JSON framing.
pub const MAX_INBOUND_PAYLOAD: usize = 2048;

const INBOUND_DEPTH: usize = 4;

pub struct InboundMsg {
    pub topic: String<TOPIC_BUFFER_SIZE>,
    pub payload: Vec<u8, MAX_INBOUND_PAYLOAD>,
}

/// Transport callback → dispatch task.
pub static INBOUND_CHANNEL: Channel<CriticalSectionRawMutex, InboundMsg, INBOUND_DEPTH> =
    Channel::new();

/// Copy a message into the inbox.  Returns `false` (and drops it) if it
/// is too large or the inbox is full.
pub fn enqueue(topic: &str, payload: &[u8]) -> bool {
    let mut msg = InboundMsg {
        topic: String::new(),
        payload: Vec::new(),
    };
    if msg.topic.push_str(topic).is_err() || msg.payload.extend_from_slice(payload).is_err() {
        warn!(
            "INBOX: dropped oversized message ({} byte topic, {} byte payload)",
            topic.len(),
            payload.len()
        );
        return false;
    }
    if INBOUND_CHANNEL.try_send(msg).is_err() {
        warn!("INBOX: full, dropped message on '{}'", topic);
        return false;
    }
    true
}

/// Hand every queued message to `f`, in arrival order.  Returns how many
/// were processed.
pub fn drain(mut f: impl FnMut(&InboundMsg)) -> usize {
    let mut count = 0;
    while let Ok(msg) = INBOUND_CHANNEL.try_receive() {
        f(&msg);
        count += 1;
    }
    count
}
