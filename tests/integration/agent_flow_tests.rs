//! End-to-end job flows through `OtaAgent`: start-next, document
//! parsing, the block download and the final status report.

use ota_jobs::app::events::OtaEvent;
use ota_jobs::config::MAX_FILE_SIZE;
use ota_jobs::jobs::{JobId, JobStatus, JobUpdateStatus};
use ota_jobs::ota::lifecycle::LifecycleState;
use ota_jobs::ota::session::SessionState;

use super::mock_ports::{
    ACCEPTED_TOPIC, DATA_TOPIC, GET_TOPIC, MockBroker, RecordingSink, START_NEXT_TOPIC,
    accepted_message, make_agent, serve_blocks, test_image, update_result_topic,
};

// ── Start-next ────────────────────────────────────────────────

#[test]
fn start_publishes_start_next_with_client_token() {
    let mut agent = make_agent::<4096>();
    let mut broker = MockBroker::new();
    let mut sink = RecordingSink::new();

    assert!(agent.start(&mut broker, &mut sink));
    assert_eq!(
        broker.on_topic(START_NEXT_TOPIC),
        vec![r#"{"clientToken":"clientToken"}"#]
    );
    assert_eq!(sink.events, vec![OtaEvent::NextJobRequested]);
}

#[test]
fn start_while_disconnected_sends_nothing() {
    let mut agent = make_agent::<4096>();
    let mut broker = MockBroker::new();
    broker.connected = false;
    let mut sink = RecordingSink::new();

    assert!(!agent.start(&mut broker, &mut sink));
    assert!(broker.published.is_empty());
    assert!(sink.events.is_empty());
}

#[test]
fn empty_reply_means_no_pending_job() {
    let mut agent = make_agent::<4096>();
    let mut broker = MockBroker::new();
    let mut sink = RecordingSink::new();

    let reply = br#"{"clientToken":"clientToken","timestamp":1700000000}"#;
    assert!(agent.route(ACCEPTED_TOPIC, reply, 0, &mut broker, &mut sink));
    assert_eq!(sink.events, vec![OtaEvent::NoPendingJob]);
    assert!(agent.is_idle());
}

#[test]
fn non_json_reply_is_rejected_without_state_change() {
    let mut agent = make_agent::<4096>();
    let mut broker = MockBroker::new();
    let mut sink = RecordingSink::new();

    assert!(agent.route(ACCEPTED_TOPIC, b"clearlyNotJson", 0, &mut broker, &mut sink));
    assert!(agent.is_idle());
    assert!(broker.published.is_empty());
    assert_eq!(
        sink.count(|e| matches!(e, OtaEvent::DocumentRejected(_))),
        1
    );
}

#[test]
fn unrelated_topic_is_not_claimed() {
    let mut agent = make_agent::<4096>();
    let mut broker = MockBroker::new();
    let mut sink = RecordingSink::new();

    for topic in [
        "$protocol/things/differntThignName/jobs/start-next/accepted",
        "$protocol/things/thingname/jobs/start-next/rejected",
        "sensors/temperature",
        DATA_TOPIC,
    ] {
        assert!(!agent.route(topic, b"{}", 0, &mut broker, &mut sink), "{topic}");
    }
    assert!(sink.events.is_empty());
}

// ── Full download ─────────────────────────────────────────────

#[test]
fn happy_path_downloads_reports_and_closes() {
    let mut agent = make_agent::<4096>();
    let mut broker = MockBroker::new();
    let mut sink = RecordingSink::new();
    let image = test_image(1000);

    agent.start(&mut broker, &mut sink);
    assert!(agent.route(
        ACCEPTED_TOPIC,
        &accepted_message("job-1", 3, 1000),
        0,
        &mut broker,
        &mut sink
    ));
    assert_eq!(agent.lifecycle().active_job_id(), Some("job-1"));
    assert_eq!(agent.session().state(), SessionState::Receiving);
    assert_eq!(broker.requested_offsets(), vec![0]);

    let served = serve_blocks(&mut agent, &mut broker, &mut sink, &image);
    assert_eq!(served, 4);
    assert_eq!(broker.requested_offsets(), vec![0, 1, 2, 3]);

    assert_eq!(agent.image_sink().images, vec![image]);
    assert_eq!(
        broker.status_updates("job-1"),
        vec![r#"{"status":"SUCCEEDED","expectedVersion":"3"}"#.to_owned()]
    );
    assert!(matches!(
        agent.lifecycle().state(),
        LifecycleState::AwaitingAck(job) if job.status() == JobStatus::Succeeded
    ));
    assert_eq!(agent.session().state(), SessionState::Idle);

    assert!(agent.route(
        &update_result_topic("job-1", "accepted"),
        b"{}",
        0,
        &mut broker,
        &mut sink
    ));
    assert!(agent.is_idle());
    assert_eq!(
        sink.events.last(),
        Some(&OtaEvent::UpdateResult {
            result: JobUpdateStatus::Accepted
        })
    );
    assert_eq!(sink.count(|e| matches!(e, OtaEvent::TransferComplete { bytes: 1000 })), 1);
}

#[test]
fn max_size_image_in_full_blocks() {
    let mut agent = make_agent::<MAX_FILE_SIZE>();
    let mut broker = MockBroker::new();
    let mut sink = RecordingSink::new();
    let image = test_image(MAX_FILE_SIZE);

    agent.route(
        ACCEPTED_TOPIC,
        &accepted_message("big", 1, MAX_FILE_SIZE as u32),
        0,
        &mut broker,
        &mut sink,
    );
    assert_eq!(
        sink.count(|e| matches!(e, OtaEvent::DownloadStarted { blocks: 256, .. })),
        1
    );

    assert_eq!(serve_blocks(&mut agent, &mut broker, &mut sink, &image), 256);
    assert_eq!(broker.requested_offsets(), (0..256).collect::<Vec<u32>>());
    assert_eq!(sink.count(|e| matches!(e, OtaEvent::TransferComplete { .. })), 1);
    assert_eq!(agent.image_sink().images.len(), 1);
    assert_eq!(agent.image_sink().images[0], image);
}

#[test]
fn duplicate_accepted_reply_is_ignored_mid_download() {
    let mut agent = make_agent::<4096>();
    let mut broker = MockBroker::new();
    let mut sink = RecordingSink::new();

    let msg = accepted_message("job-1", 1, 600);
    agent.route(ACCEPTED_TOPIC, &msg, 0, &mut broker, &mut sink);
    agent.route(ACCEPTED_TOPIC, &accepted_message("job-2", 1, 600), 0, &mut broker, &mut sink);

    assert_eq!(agent.lifecycle().active_job_id(), Some("job-1"));
    assert_eq!(broker.requested_offsets(), vec![0]);
    let mut ignored = JobId::new();
    ignored.push_str("job-2").unwrap();
    assert_eq!(
        sink.events.last(),
        Some(&OtaEvent::DuplicateJobIgnored { job_id: ignored })
    );

    let image = test_image(600);
    assert_eq!(serve_blocks(&mut agent, &mut broker, &mut sink, &image), 3);
    assert_eq!(agent.image_sink().images, vec![image]);
}

#[test]
fn start_is_suppressed_while_a_job_is_open() {
    let mut agent = make_agent::<4096>();
    let mut broker = MockBroker::new();
    let mut sink = RecordingSink::new();

    agent.route(ACCEPTED_TOPIC, &accepted_message("job-1", 1, 10), 0, &mut broker, &mut sink);
    assert!(!agent.start(&mut broker, &mut sink));
    assert!(broker.on_topic(START_NEXT_TOPIC).is_empty());
}

#[test]
fn out_of_order_block_is_discarded_and_download_continues() {
    let mut agent = make_agent::<4096>();
    let mut broker = MockBroker::new();
    let mut sink = RecordingSink::new();
    let image = test_image(512);

    agent.route(ACCEPTED_TOPIC, &accepted_message("job-1", 1, 512), 0, &mut broker, &mut sink);
    let stray = super::mock_ports::block_message(0, 1, &image[256..]);
    assert!(agent.route(DATA_TOPIC, &stray, 0, &mut broker, &mut sink));
    assert_eq!(agent.session().bytes_received(), 0);
    assert_eq!(sink.count(|e| matches!(e, OtaEvent::BlockDiscarded { block_id: 1, .. })), 1);

    serve_blocks(&mut agent, &mut broker, &mut sink, &image);
    assert_eq!(agent.image_sink().images, vec![image]);
}

#[test]
fn get_requests_go_to_the_stream_named_in_the_document() {
    let mut agent = make_agent::<4096>();
    let mut broker = MockBroker::new();
    let mut sink = RecordingSink::new();

    agent.route(ACCEPTED_TOPIC, &accepted_message("job-1", 1, 10), 0, &mut broker, &mut sink);
    assert_eq!(
        broker.on_topic(GET_TOPIC),
        vec![r#"{"c":"clientToken","f":0,"l":256,"o":0,"n":1}"#]
    );
}
