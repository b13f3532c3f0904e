//! Mock ports for integration tests.
//!
//! `MockBroker` records every publish; `serve_blocks` plays the stream
//! service by answering the agent's block requests from a byte image.

#![allow(dead_code)]

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use ota_jobs::adapters::json::SerdeJsonExtractor;
use ota_jobs::adapters::mqtt_streams::MqttStreamsJson;
use ota_jobs::app::events::OtaEvent;
use ota_jobs::app::ports::{EventSink, ImageSink, Publisher};
use ota_jobs::config::OtaConfig;
use ota_jobs::identity::DeviceIdentity;
use ota_jobs::ota::OtaAgent;

pub const THING: &str = "thingname";
pub const STREAM: &str = "stream-1";
pub const START_NEXT_TOPIC: &str = "$protocol/things/thingname/jobs/start-next";
pub const ACCEPTED_TOPIC: &str = "$protocol/things/thingname/jobs/start-next/accepted";
pub const GET_TOPIC: &str = "$protocol/things/thingname/streams/stream-1/get/json";
pub const DATA_TOPIC: &str = "$protocol/things/thingname/streams/stream-1/data/json";

pub type TestAgent<const N: usize> = OtaAgent<MqttStreamsJson, MemoryImageSink, SerdeJsonExtractor, N>;

// ── MockBroker ────────────────────────────────────────────────

pub struct MockBroker {
    pub connected: bool,
    pub published: Vec<(String, String)>,
}

impl MockBroker {
    pub fn new() -> Self {
        Self {
            connected: true,
            published: Vec::new(),
        }
    }

    pub fn on_topic(&self, topic: &str) -> Vec<&str> {
        self.published
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, p)| p.as_str())
            .collect()
    }

    /// Block offsets requested so far, in order.
    pub fn requested_offsets(&self) -> Vec<u32> {
        self.on_topic(GET_TOPIC)
            .iter()
            .map(|body| {
                let v: serde_json::Value = serde_json::from_str(body).unwrap();
                v["o"].as_u64().unwrap() as u32
            })
            .collect()
    }

    pub fn status_updates(&self, job_id: &str) -> Vec<String> {
        let topic = format!("$protocol/things/{THING}/jobs/{job_id}/update");
        self.on_topic(&topic).iter().map(|s| (*s).to_owned()).collect()
    }
}

impl Publisher for MockBroker {
    fn is_connected(&self) -> bool {
        self.connected
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> bool {
        if !self.connected {
            return false;
        }
        self.published
            .push((topic.to_owned(), String::from_utf8_lossy(payload).into_owned()));
        true
    }
}

// ── Sinks ─────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<OtaEvent>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, pred: impl Fn(&OtaEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &OtaEvent) {
        self.events.push(event.clone());
    }
}

pub struct MemoryImageSink {
    pub accept: bool,
    pub images: Vec<Vec<u8>>,
}

impl MemoryImageSink {
    pub fn new() -> Self {
        Self {
            accept: true,
            images: Vec::new(),
        }
    }
}

impl ImageSink for MemoryImageSink {
    fn on_transfer_complete(&mut self, image: &[u8]) -> bool {
        self.images.push(image.to_vec());
        self.accept
    }
}

// ── Message builders ──────────────────────────────────────────

pub fn accepted_message(job_id: &str, version: u32, file_size: u32) -> Vec<u8> {
    serde_json::json!({
        "clientToken": "clientToken",
        "timestamp": 1_700_000_000,
        "execution": {
            "jobId": job_id,
            "status": "IN_PROGRESS",
            "versionNumber": version,
            "jobDocument": {
                "afr_ota": {
                    "protocols": ["MQTT"],
                    "streamname": STREAM,
                    "files": [{
                        "filepath": "/firmware.bin",
                        "filesize": file_size,
                        "fileid": 0
                    }]
                }
            }
        }
    })
    .to_string()
    .into_bytes()
}

pub fn block_message(file_id: u8, block_id: u32, data: &[u8]) -> Vec<u8> {
    serde_json::json!({
        "c": "clientToken",
        "f": file_id,
        "i": block_id,
        "l": data.len(),
        "p": STANDARD.encode(data),
    })
    .to_string()
    .into_bytes()
}

pub fn update_result_topic(job_id: &str, result: &str) -> String {
    format!("$protocol/things/{THING}/jobs/{job_id}/update/{result}")
}

pub fn test_image(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 + i / 256) as u8).collect()
}

// ── Agent helpers ─────────────────────────────────────────────

pub fn make_agent<const N: usize>() -> TestAgent<N> {
    make_agent_with(OtaConfig::default())
}

pub fn make_agent_with<const N: usize>(config: OtaConfig) -> TestAgent<N> {
    OtaAgent::new(
        DeviceIdentity::new(THING).unwrap(),
        config,
        MqttStreamsJson::new("clientToken"),
        MemoryImageSink::new(),
        SerdeJsonExtractor,
    )
    .unwrap()
}

/// Answer every outstanding block request from `image` until the agent
/// stops asking.  Returns the number of blocks delivered.
pub fn serve_blocks<const N: usize>(
    agent: &mut TestAgent<N>,
    broker: &mut MockBroker,
    sink: &mut RecordingSink,
    image: &[u8],
) -> usize {
    let block_size = agent.config().block_size as usize;
    let mut served = 0;
    loop {
        let requested = broker.requested_offsets();
        if requested.len() <= served {
            return served;
        }
        let offset = requested[served] as usize;
        let start = offset * block_size;
        let end = (start + block_size).min(image.len());
        let msg = block_message(0, offset as u32, &image[start..end]);
        assert!(agent.route(DATA_TOPIC, &msg, 0, broker, sink));
        served += 1;
    }
}
