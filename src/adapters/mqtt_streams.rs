//! Block transfer over MQTT streams, JSON encoding.
//!
//! ```text
//! request : $protocol/things/<D>/streams/<stream>/get/json
//!           {"c":"<token>","f":<fileId>,"l":<blockSize>,"o":<offset>,"n":<count>}
//! data    : $protocol/things/<D>/streams/<stream>/data/json
//!           {"f":<fileId>,"i":<blockId>,"l":<len>,"p":"<base64>"}
//! ```
//!
//! `o` is a block index, not a byte offset.

use core::fmt::Write;
use std::borrow::Cow;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use log::{debug, warn};
use serde::Deserialize;

use crate::app::ports::{BlockHeader, BlockRequest, BlockTransfer, Publisher};
use crate::config::{MAX_CLIENT_TOKEN_LEN, MAX_IMAGE_REF_LEN, TOPIC_BUFFER_SIZE};
use crate::identity::DeviceIdentity;
use crate::jobs::topics::{TOPIC_PREFIX, is_json_string_safe, is_topic_segment_safe};

/// Largest request body: token plus five maximal integers and framing.
const REQUEST_BODY_CAPACITY: usize = MAX_CLIENT_TOKEN_LEN + 96;

type Topic = heapless::String<TOPIC_BUFFER_SIZE>;

#[derive(Deserialize)]
struct StreamDataMessage<'a> {
    #[serde(rename = "f")]
    file_id: u8,
    #[serde(rename = "i")]
    block_id: u32,
    #[serde(rename = "l")]
    len: usize,
    /// Borrowed unless the encoder escaped characters (`\/`).
    #[serde(rename = "p", borrow)]
    payload: Cow<'a, str>,
}

pub struct MqttStreamsJson {
    client_token: heapless::String<MAX_CLIENT_TOKEN_LEN>,
    get_topic: Topic,
    data_topic: Topic,
}

impl MqttStreamsJson {
    /// `client_token` is echoed back by the stream service in every reply.
    pub fn new(client_token: &str) -> Self {
        let mut token = heapless::String::new();
        if !is_json_string_safe(client_token) || token.push_str(client_token).is_err() {
            warn!("STREAM: client token unusable, requests will be refused");
            token.clear();
        }
        Self {
            client_token: token,
            get_topic: Topic::new(),
            data_topic: Topic::new(),
        }
    }

    /// Topic to subscribe to for block data; `None` before [`init`](BlockTransfer::init).
    pub fn data_topic(&self) -> Option<&str> {
        (!self.data_topic.is_empty()).then_some(self.data_topic.as_str())
    }

    pub fn get_topic(&self) -> Option<&str> {
        (!self.get_topic.is_empty()).then_some(self.get_topic.as_str())
    }

    fn stream_topic(identity: &DeviceIdentity, stream: &str, suffix: &str) -> Option<Topic> {
        let mut topic = Topic::new();
        write!(topic, "{}{}/streams/{}/{}/json", TOPIC_PREFIX, identity, stream, suffix).ok()?;
        Some(topic)
    }
}

impl BlockTransfer for MqttStreamsJson {
    fn init(&mut self, identity: &DeviceIdentity, image_ref: &str) -> bool {
        self.get_topic.clear();
        self.data_topic.clear();
        if image_ref.len() > MAX_IMAGE_REF_LEN || !is_topic_segment_safe(image_ref) {
            warn!("STREAM: image reference unusable in a topic");
            return false;
        }
        let (Some(get), Some(data)) = (
            Self::stream_topic(identity, image_ref, "get"),
            Self::stream_topic(identity, image_ref, "data"),
        ) else {
            return false;
        };
        self.get_topic = get;
        self.data_topic = data;
        debug!("STREAM: data on '{}'", self.data_topic);
        true
    }

    fn request_block<P: Publisher>(&mut self, publisher: &mut P, request: &BlockRequest) -> bool {
        if self.get_topic.is_empty() || self.client_token.is_empty() {
            return false;
        }
        let mut body = heapless::String::<REQUEST_BODY_CAPACITY>::new();
        if write!(
            body,
            r#"{{"c":"{}","f":{},"l":{},"o":{},"n":{}}}"#,
            self.client_token, request.file_id, request.block_size, request.offset, request.count
        )
        .is_err()
        {
            return false;
        }
        publisher.publish(&self.get_topic, body.as_bytes())
    }

    fn is_block_topic(&self, topic: &str) -> bool {
        !self.data_topic.is_empty() && self.data_topic.as_str() == topic
    }

    fn decode_block(&self, payload: &[u8], out: &mut [u8]) -> Option<BlockHeader> {
        let msg: StreamDataMessage<'_> = serde_json::from_slice(payload).ok()?;
        let len = STANDARD.decode_slice(msg.payload.as_bytes(), out).ok()?;
        if len != msg.len {
            warn!(
                "STREAM: block {} declares {} bytes, carries {}",
                msg.block_id, msg.len, len
            );
            return None;
        }
        Some(BlockHeader {
            file_id: msg.file_id,
            block_id: msg.block_id,
            len,
        })
    }
}
