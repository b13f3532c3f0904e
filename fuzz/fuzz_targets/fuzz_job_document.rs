//! Fuzz target: start-next reply handling
//!
//! Feeds arbitrary bytes to the agent as a start-next reply.  The agent
//! must never panic, and at most one status update may be published.
//!
//! cargo fuzz run fuzz_job_document

#![no_main]

use libfuzzer_sys::fuzz_target;
use ota_jobs::adapters::json::SerdeJsonExtractor;
use ota_jobs::adapters::log_sink::{LogEventSink, LogImageSink};
use ota_jobs::adapters::mqtt_streams::MqttStreamsJson;
use ota_jobs::app::ports::Publisher;
use ota_jobs::config::OtaConfig;
use ota_jobs::identity::DeviceIdentity;
use ota_jobs::ota::OtaAgent;

#[derive(Default)]
struct Counter {
    updates: usize,
}

impl Publisher for Counter {
    fn is_connected(&self) -> bool {
        true
    }
    fn publish(&mut self, topic: &str, _payload: &[u8]) -> bool {
        if topic.ends_with("/update") {
            self.updates += 1;
        }
        true
    }
}

fuzz_target!(|data: &[u8]| {
    let Ok(identity) = DeviceIdentity::new("thingname") else {
        return;
    };
    let Ok(mut agent) = OtaAgent::<_, _, _, 4096>::new(
        identity,
        OtaConfig::default(),
        MqttStreamsJson::new("clientToken"),
        LogImageSink::default(),
        SerdeJsonExtractor,
    ) else {
        return;
    };
    let mut publisher = Counter::default();
    let mut sink = LogEventSink;

    agent.route(
        "$protocol/things/thingname/jobs/start-next/accepted",
        data,
        0,
        &mut publisher,
        &mut sink,
    );
    assert!(publisher.updates <= 1);
});
