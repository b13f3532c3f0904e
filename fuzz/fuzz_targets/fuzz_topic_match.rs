//! Fuzz target: topic matchers
//!
//! Arbitrary topic strings must never panic the matchers, and a topic
//! that matches must be byte-identical to the one the builder produces.
//!
//! cargo fuzz run fuzz_topic_match

#![no_main]

use libfuzzer_sys::fuzz_target;
use ota_jobs::config::TOPIC_BUFFER_SIZE;
use ota_jobs::identity::DeviceIdentity;
use ota_jobs::jobs::JobUpdateStatus;
use ota_jobs::jobs::topics::{
    as_topic, build_start_next_accepted_topic, is_job_update_status, is_start_next_accepted,
};

fuzz_target!(|data: &[u8]| {
    let Ok(topic) = core::str::from_utf8(data) else {
        return;
    };
    let Ok(identity) = DeviceIdentity::new("thingname") else {
        return;
    };

    if is_start_next_accepted(&identity, topic) {
        let mut buf = [0u8; TOPIC_BUFFER_SIZE];
        let len = build_start_next_accepted_topic("thingname", &mut buf).unwrap();
        assert_eq!(as_topic(&buf, len), Some(topic));
    }
    for status in [JobUpdateStatus::Accepted, JobUpdateStatus::Rejected] {
        if is_job_update_status(&identity, topic, "job-1", status) {
            assert!(topic.ends_with(status.as_str()));
        }
    }
});
