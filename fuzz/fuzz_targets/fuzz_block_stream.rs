//! Fuzz target: block data messages
//!
//! Starts a download and then feeds arbitrary data messages, split on
//! newlines, into the agent.  The reassembly buffer must never exceed
//! the declared file size.
//!
//! cargo fuzz run fuzz_block_stream

#![no_main]

use libfuzzer_sys::fuzz_target;
use ota_jobs::adapters::json::SerdeJsonExtractor;
use ota_jobs::adapters::log_sink::{LogEventSink, LogImageSink};
use ota_jobs::adapters::mqtt_streams::MqttStreamsJson;
use ota_jobs::app::ports::Publisher;
use ota_jobs::config::OtaConfig;
use ota_jobs::identity::DeviceIdentity;
use ota_jobs::ota::OtaAgent;

const ACCEPTED: &[u8] = br#"{"clientToken":"clientToken","execution":{"jobId":"job-1","versionNumber":1,"jobDocument":{"afr_ota":{"streamname":"s","files":[{"fileid":0,"filesize":1000}]}}}}"#;
const DATA_TOPIC: &str = "$protocol/things/thingname/streams/s/data/json";

struct Up;

impl Publisher for Up {
    fn is_connected(&self) -> bool {
        true
    }
    fn publish(&mut self, _topic: &str, _payload: &[u8]) -> bool {
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
    let mut sink = LogEventSink;
    agent.route(
        "$protocol/things/thingname/jobs/start-next/accepted",
        ACCEPTED,
        0,
        &mut Up,
        &mut sink,
    );

    for (i, msg) in data.split(|&b| b == b'\n').enumerate() {
        agent.route(DATA_TOPIC, msg, i as u64, &mut Up, &mut sink);
        agent.tick(i as u64 * 1000, &mut Up, &mut sink);
        assert!(agent.session().bytes_received() <= 1000);
    }
});
