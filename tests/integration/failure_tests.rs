//! Failure paths: unusable documents, bad blocks, request timeouts,
//! transport loss and a refused image.  Every one must end with exactly
//! one terminal status for the job.

use ota_jobs::adapters::json::SerdeJsonExtractor;
use ota_jobs::adapters::mqtt_streams::MqttStreamsJson;
use ota_jobs::app::events::OtaEvent;
use ota_jobs::config::OtaConfig;
use ota_jobs::identity::DeviceIdentity;
use ota_jobs::jobs::document::DocumentError;
use ota_jobs::jobs::{JobStatus, JobUpdateStatus};
use ota_jobs::ota::OtaAgent;
use ota_jobs::ota::session::{SessionError, SessionState};

use super::mock_ports::{
    ACCEPTED_TOPIC, DATA_TOPIC, MemoryImageSink, MockBroker, RecordingSink, THING, TestAgent,
    accepted_message, block_message, make_agent, make_agent_with, serve_blocks, test_image,
    update_result_topic,
};

fn failed_body(version: &str) -> String {
    format!(r#"{{"status":"FAILED","expectedVersion":"{version}"}}"#)
}

fn accept<const N: usize>(
    agent: &mut TestAgent<N>,
    broker: &mut MockBroker,
    sink: &mut RecordingSink,
    file_size: u32,
) {
    let msg = accepted_message("job-1", 2, file_size);
    assert!(agent.route(ACCEPTED_TOPIC, &msg, 0, broker, sink));
}

// ── Job documents ─────────────────────────────────────────────

#[test]
fn document_without_stream_is_reported_rejected() {
    let mut agent = make_agent::<4096>();
    let mut broker = MockBroker::new();
    let mut sink = RecordingSink::new();

    let msg = serde_json::json!({
        "clientToken": "clientToken",
        "execution": {
            "jobId": "job-1",
            "jobDocument": { "afr_ota": { "files": [{ "fileid": 0, "filesize": 10 }] } }
        }
    })
    .to_string();
    agent.route(ACCEPTED_TOPIC, msg.as_bytes(), 0, &mut broker, &mut sink);

    // No versionNumber: the configured default is used.
    assert_eq!(
        broker.status_updates("job-1"),
        vec![r#"{"status":"REJECTED","expectedVersion":"1"}"#.to_owned()]
    );
    assert_eq!(
        sink.count(|e| matches!(
            e,
            OtaEvent::DocumentRejected(DocumentError::MissingField("afr_ota.streamname"))
        )),
        1
    );
    assert_eq!(agent.session().state(), SessionState::Idle);
}

#[test]
fn file_larger_than_buffer_is_rejected() {
    let mut agent = make_agent::<4096>();
    let mut broker = MockBroker::new();
    let mut sink = RecordingSink::new();

    accept(&mut agent, &mut broker, &mut sink, 4097);
    assert_eq!(
        sink.count(|e| *e == OtaEvent::DocumentRejected(DocumentError::FileSize)),
        1
    );
    assert_eq!(
        broker.status_updates("job-1"),
        vec![r#"{"status":"REJECTED","expectedVersion":"2"}"#.to_owned()]
    );
}

#[test]
fn job_id_with_wildcard_is_never_recorded() {
    let mut agent = make_agent::<4096>();
    let mut broker = MockBroker::new();
    let mut sink = RecordingSink::new();

    agent.route(ACCEPTED_TOPIC, &accepted_message("job/+", 1, 10), 0, &mut broker, &mut sink);
    assert!(agent.is_idle());
    assert!(broker.published.is_empty());
    assert_eq!(
        sink.events,
        vec![OtaEvent::DocumentRejected(DocumentError::InvalidJobId)]
    );
}

// ── Blocks ────────────────────────────────────────────────────

#[test]
fn oversized_block_fails_the_job() {
    let mut agent = make_agent::<4096>();
    let mut broker = MockBroker::new();
    let mut sink = RecordingSink::new();
    accept(&mut agent, &mut broker, &mut sink, 1000);

    let msg = block_message(0, 0, &[0xAB; 300]);
    assert!(agent.route(DATA_TOPIC, &msg, 0, &mut broker, &mut sink));

    assert_eq!(
        sink.count(|e| *e == OtaEvent::TransferFailed(SessionError::ExceedsDeclaredSize)),
        1
    );
    assert_eq!(broker.status_updates("job-1"), vec![failed_body("2")]);
    assert_eq!(agent.session().bytes_received(), 0);
    assert!(agent.image_sink().images.is_empty());
}

#[test]
fn short_middle_block_fails_the_job() {
    let mut agent = make_agent::<4096>();
    let mut broker = MockBroker::new();
    let mut sink = RecordingSink::new();
    accept(&mut agent, &mut broker, &mut sink, 1000);

    agent.route(DATA_TOPIC, &block_message(0, 0, &[1; 100]), 0, &mut broker, &mut sink);
    assert_eq!(
        sink.count(|e| *e == OtaEvent::TransferFailed(SessionError::ShortBlock)),
        1
    );
    assert_eq!(broker.status_updates("job-1"), vec![failed_body("2")]);
}

#[test]
fn block_for_another_file_is_discarded() {
    let mut agent = make_agent::<4096>();
    let mut broker = MockBroker::new();
    let mut sink = RecordingSink::new();
    accept(&mut agent, &mut broker, &mut sink, 256);

    agent.route(DATA_TOPIC, &block_message(7, 0, &[1; 256]), 0, &mut broker, &mut sink);
    assert_eq!(agent.session().state(), SessionState::Receiving);
    assert!(broker.status_updates("job-1").is_empty());
}

#[test]
fn request_timeouts_retry_then_fail() {
    let mut agent = make_agent::<4096>();
    let mut broker = MockBroker::new();
    let mut sink = RecordingSink::new();
    accept(&mut agent, &mut broker, &mut sink, 1000);

    agent.tick(4_999, &mut broker, &mut sink);
    assert_eq!(broker.requested_offsets(), vec![0]);

    for (now, attempt) in [(5_000, 1), (10_000, 2), (15_000, 3)] {
        agent.tick(now, &mut broker, &mut sink);
        assert_eq!(sink.events.last(), Some(&OtaEvent::BlockRetry { block_id: 0, attempt }));
    }
    assert_eq!(broker.requested_offsets(), vec![0, 0, 0, 0]);

    agent.tick(20_000, &mut broker, &mut sink);
    assert_eq!(
        sink.count(|e| *e == OtaEvent::TransferFailed(SessionError::RetriesExhausted)),
        1
    );
    assert_eq!(broker.status_updates("job-1"), vec![failed_body("2")]);

    agent.tick(60_000, &mut broker, &mut sink);
    assert_eq!(broker.requested_offsets().len(), 4);
}

#[test]
fn custom_retry_policy_is_honoured() {
    let config = OtaConfig {
        request_timeout_ms: 100,
        max_request_retries: 0,
        ..OtaConfig::default()
    };
    let mut agent = make_agent_with::<4096>(config);
    let mut broker = MockBroker::new();
    let mut sink = RecordingSink::new();
    accept(&mut agent, &mut broker, &mut sink, 1000);

    agent.tick(100, &mut broker, &mut sink);
    assert_eq!(broker.status_updates("job-1"), vec![failed_body("2")]);
}

// ── Status delivery ───────────────────────────────────────────

#[test]
fn unsent_terminal_status_is_resent_on_tick() {
    let mut agent = make_agent::<4096>();
    let mut broker = MockBroker::new();
    let mut sink = RecordingSink::new();
    let image = test_image(300);
    accept(&mut agent, &mut broker, &mut sink, 300);

    agent.route(DATA_TOPIC, &block_message(0, 0, &image[..256]), 0, &mut broker, &mut sink);
    broker.connected = false;
    agent.route(DATA_TOPIC, &block_message(0, 1, &image[256..]), 0, &mut broker, &mut sink);

    assert_eq!(
        sink.events.last(),
        Some(&OtaEvent::StatusNotSent {
            status: JobStatus::Succeeded
        })
    );
    assert!(broker.status_updates("job-1").is_empty());

    for now in 1..20 {
        agent.tick(now, &mut broker, &mut sink);
    }
    assert!(broker.status_updates("job-1").is_empty());
    assert_eq!(sink.count(|e| matches!(e, OtaEvent::StatusNotSent { .. })), 1);

    broker.connected = true;
    agent.tick(2, &mut broker, &mut sink);
    assert_eq!(
        broker.status_updates("job-1"),
        vec![r#"{"status":"SUCCEEDED","expectedVersion":"2"}"#.to_owned()]
    );
    agent.tick(3, &mut broker, &mut sink);
    assert_eq!(broker.status_updates("job-1").len(), 1);
}

#[test]
fn lost_acknowledgement_resends_the_final_status() {
    let mut agent = make_agent::<4096>();
    let mut broker = MockBroker::new();
    let mut sink = RecordingSink::new();
    let image = test_image(300);
    accept(&mut agent, &mut broker, &mut sink, 300);
    serve_blocks(&mut agent, &mut broker, &mut sink, &image);
    let succeeded = r#"{"status":"SUCCEEDED","expectedVersion":"2"}"#.to_owned();
    assert_eq!(broker.status_updates("job-1"), vec![succeeded.clone()]);

    agent.tick(1_000, &mut broker, &mut sink);
    agent.tick(5_999, &mut broker, &mut sink);
    assert_eq!(broker.status_updates("job-1").len(), 1);

    agent.tick(6_000, &mut broker, &mut sink);
    assert_eq!(
        broker.status_updates("job-1"),
        vec![succeeded.clone(), succeeded]
    );

    assert!(agent.route(
        &update_result_topic("job-1", "accepted"),
        b"{}",
        6_100,
        &mut broker,
        &mut sink
    ));
    assert!(agent.is_idle());
    agent.tick(60_000, &mut broker, &mut sink);
    assert_eq!(broker.status_updates("job-1").len(), 2);
    assert!(agent.start(&mut broker, &mut sink));
}

#[test]
fn unacknowledged_status_is_dropped_after_retries() {
    let mut agent = make_agent::<4096>();
    let mut broker = MockBroker::new();
    let mut sink = RecordingSink::new();
    accept(&mut agent, &mut broker, &mut sink, 1000);
    agent.abandon(&mut broker, &mut sink);

    // One original publish plus three re-sends, five seconds apart.
    for now in (0..=20_000).step_by(1_000) {
        agent.tick(now, &mut broker, &mut sink);
    }
    assert_eq!(broker.status_updates("job-1").len(), 4);
    assert_eq!(
        sink.events.last(),
        Some(&OtaEvent::StatusAckLost {
            status: JobStatus::Failed
        })
    );
    assert!(agent.is_idle());
    assert!(agent.start(&mut broker, &mut sink));
}

#[test]
fn acknowledgement_wait_pauses_while_disconnected() {
    let mut agent = make_agent::<4096>();
    let mut broker = MockBroker::new();
    let mut sink = RecordingSink::new();
    accept(&mut agent, &mut broker, &mut sink, 1000);
    agent.abandon(&mut broker, &mut sink);

    broker.connected = false;
    for now in (0..=60_000).step_by(1_000) {
        agent.tick(now, &mut broker, &mut sink);
    }
    assert!(!agent.is_idle());
    assert_eq!(sink.count(|e| matches!(e, OtaEvent::StatusAckLost { .. })), 0);

    broker.connected = true;
    agent.tick(61_000, &mut broker, &mut sink);
    assert_eq!(broker.status_updates("job-1").len(), 2);
}

#[test]
fn rejected_final_update_clears_the_job() {
    let mut agent = make_agent::<4096>();
    let mut broker = MockBroker::new();
    let mut sink = RecordingSink::new();
    accept(&mut agent, &mut broker, &mut sink, 1000);
    agent.abandon(&mut broker, &mut sink);
    assert_eq!(broker.status_updates("job-1"), vec![failed_body("2")]);

    assert!(agent.route(
        &update_result_topic("job-1", "rejected"),
        b"{}",
        0,
        &mut broker,
        &mut sink
    ));
    assert_eq!(
        sink.events.last(),
        Some(&OtaEvent::UpdateResult {
            result: JobUpdateStatus::Rejected
        })
    );
    assert!(agent.is_idle());
    assert!(agent.start(&mut broker, &mut sink));
}

#[test]
fn update_result_for_another_job_is_ignored() {
    let mut agent = make_agent::<4096>();
    let mut broker = MockBroker::new();
    let mut sink = RecordingSink::new();
    accept(&mut agent, &mut broker, &mut sink, 1000);
    agent.abandon(&mut broker, &mut sink);

    assert!(!agent.route(
        &update_result_topic("job-9", "accepted"),
        b"{}",
        0,
        &mut broker,
        &mut sink
    ));
    assert_eq!(agent.lifecycle().active_job_id(), Some("job-1"));
}

#[test]
fn refused_image_fails_the_job() {
    let mut image_sink = MemoryImageSink::new();
    image_sink.accept = false;
    let mut agent: TestAgent<4096> = OtaAgent::new(
        DeviceIdentity::new(THING).unwrap(),
        OtaConfig::default(),
        MqttStreamsJson::new("clientToken"),
        image_sink,
        SerdeJsonExtractor,
    )
    .unwrap();
    let mut broker = MockBroker::new();
    let mut sink = RecordingSink::new();
    let image = test_image(512);
    accept(&mut agent, &mut broker, &mut sink, 512);

    serve_blocks(&mut agent, &mut broker, &mut sink, &image);
    assert_eq!(agent.image_sink().images, vec![image]);
    assert_eq!(sink.count(|e| *e == OtaEvent::ImageRejected), 1);
    assert_eq!(broker.status_updates("job-1"), vec![failed_body("2")]);
}

#[test]
fn invalid_config_is_refused() {
    let config = OtaConfig {
        block_size: 0,
        ..OtaConfig::default()
    };
    let agent = OtaAgent::<_, _, _, 4096>::new(
        DeviceIdentity::new(THING).unwrap(),
        config,
        MqttStreamsJson::new("clientToken"),
        MemoryImageSink::new(),
        SerdeJsonExtractor,
    );
    assert!(agent.is_err());
}
