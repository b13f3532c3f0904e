//! OTA agent: composes lifecycle, download session and router.
//!
//! ```text
//!  ┌────────────┐ route()  ┌────────┐
//!  │ MQTT inbox │────────▶│ router │──┬──▶ JobLifecycleManager ──▶ Publisher
//!  └────────────┘          └────────┘  │          ▲ status
//!                                      └──▶ BlockDownloadSession ──▶ BlockTransfer
//!        tick() ──▶ retry policy                   │ complete
//!                                                  ▼
//!                                              ImageSink
//! ```
//!
//! The agent is driven from a single task: [`route`](OtaAgent::route) for
//! every inbound message and [`tick`](OtaAgent::tick) periodically.  The
//! publisher and event sink are borrowed per call; the block transfer and
//! image sink are owned.

use log::{debug, warn};

use crate::app::events::OtaEvent;
use crate::app::ports::{BlockTransfer, EventSink, ImageSink, JsonExtractor, Publisher};
use crate::config::{MAX_BLOCK_SIZE, MAX_FILE_SIZE, OtaConfig};
use crate::error::Error;
use crate::identity::DeviceIdentity;
use crate::jobs::document::{
    DocumentError, JobDocumentFields, get_job_document, get_job_id, get_version_number,
    is_empty_reply, parse_job_document,
};
use crate::jobs::{JobStatus, JobVersion};

use super::lifecycle::{JobLifecycleManager, LifecycleState};
use super::router::{Route, classify};
use super::session::{ArrivedBlock, BlockDownloadSession, BlockOutcome, FileTransferDescriptor};

pub struct OtaAgent<T, H, J, const N: usize = MAX_FILE_SIZE>
where
    T: BlockTransfer,
    H: ImageSink,
    J: JsonExtractor,
{
    identity: DeviceIdentity,
    config: OtaConfig,
    lifecycle: JobLifecycleManager,
    session: BlockDownloadSession<N>,
    transfer: T,
    image: H,
    extractor: J,
    scratch: [u8; MAX_BLOCK_SIZE],
    /// Terminal status that could not be published yet.
    unsent_status: Option<JobStatus>,
    /// Wait for the service to acknowledge a published terminal status.
    ack_wait: Option<AckWait>,
}

#[derive(Debug, Clone, Copy)]
struct AckWait {
    since_ms: u64,
    resends: u8,
}

impl<T, H, J, const N: usize> OtaAgent<T, H, J, N>
where
    T: BlockTransfer,
    H: ImageSink,
    J: JsonExtractor,
{
    pub fn new(
        identity: DeviceIdentity,
        config: OtaConfig,
        transfer: T,
        image: H,
        extractor: J,
    ) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self {
            identity,
            config,
            lifecycle: JobLifecycleManager::new(),
            session: BlockDownloadSession::new(),
            transfer,
            image,
            extractor,
            scratch: [0u8; MAX_BLOCK_SIZE],
            unsent_status: None,
            ack_wait: None,
        })
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn config(&self) -> &OtaConfig {
        &self.config
    }

    pub fn lifecycle(&self) -> &JobLifecycleManager {
        &self.lifecycle
    }

    pub fn session(&self) -> &BlockDownloadSession<N> {
        &self.session
    }

    pub fn transfer(&self) -> &T {
        &self.transfer
    }

    pub fn image_sink(&self) -> &H {
        &self.image
    }

    /// No job is open; a start-next request would be sent.
    pub fn is_idle(&self) -> bool {
        self.lifecycle.active_job().is_none()
    }

    /// Ask the job service for work.
    pub fn start<P: Publisher, E: EventSink>(&mut self, publisher: &mut P, sink: &mut E) -> bool {
        let sent =
            self.lifecycle
                .request_next_job(&self.identity, &self.config.client_token, publisher);
        if sent {
            sink.emit(&OtaEvent::NextJobRequested);
        }
        sent
    }

    /// Dispatch one inbound message.  Returns `false` if no component
    /// claimed the topic.
    pub fn route<P: Publisher, E: EventSink>(
        &mut self,
        topic: &str,
        payload: &[u8],
        now_ms: u64,
        publisher: &mut P,
        sink: &mut E,
    ) -> bool {
        let route = classify(
            &self.identity,
            self.lifecycle.active_job_id(),
            topic,
            &self.transfer,
        );
        match route {
            Route::StartNextAccepted => {
                self.on_start_next_accepted(payload, now_ms, publisher, sink);
                true
            }
            Route::BlockData => {
                self.on_block_data(payload, now_ms, publisher, sink);
                true
            }
            Route::UpdateResult(_) => {
                if let Some(result) = self.lifecycle.on_update_result(&self.identity, topic) {
                    sink.emit(&OtaEvent::UpdateResult { result });
                    if self.lifecycle.active_job().is_none() {
                        self.session.reset();
                        self.unsent_status = None;
                        self.ack_wait = None;
                    }
                }
                true
            }
            Route::Unhandled => {
                debug!("OTA: unhandled topic '{}'", topic);
                false
            }
        }
    }

    /// Periodic work: re-send an unpublished or unacknowledged terminal
    /// status and apply the block request timeout policy.
    pub fn tick<P: Publisher, E: EventSink>(&mut self, now_ms: u64, publisher: &mut P, sink: &mut E) {
        if let Some(status) = self.unsent_status {
            if publisher.is_connected() {
                self.finish_job(status, publisher, sink);
            }
        }
        self.poll_status_ack(now_ms, publisher, sink);

        let policy = self.config.retry_policy();
        match self
            .session
            .poll_timeout(now_ms, policy, publisher, &mut self.transfer)
        {
            Ok(Some(attempt)) => sink.emit(&OtaEvent::BlockRetry {
                block_id: self.session.next_offset(),
                attempt,
            }),
            Ok(None) => {}
            Err(e) => {
                sink.emit(&OtaEvent::TransferFailed(e));
                self.finish_job(JobStatus::Failed, publisher, sink);
            }
        }
    }

    /// Abort an in-flight download and fail the active job.
    pub fn abandon<P: Publisher, E: EventSink>(&mut self, publisher: &mut P, sink: &mut E) {
        self.session.abort();
        if self.lifecycle.active_job().is_some() {
            self.finish_job(JobStatus::Failed, publisher, sink);
        }
    }

    /// Re-publish a terminal status whose acknowledgement has not arrived
    /// within the request timeout.  After `max_request_retries` re-sends the
    /// job is dropped locally so that the device asks for work again.
    fn poll_status_ack<P: Publisher, E: EventSink>(&mut self, now_ms: u64, publisher: &mut P, sink: &mut E) {
        let LifecycleState::AwaitingAck(job) = self.lifecycle.state() else {
            self.ack_wait = None;
            return;
        };
        let status = job.status();
        let mut version = JobVersion::new();
        let _ = version.push_str(job.expected_version());

        let wait = *self.ack_wait.get_or_insert(AckWait {
            since_ms: now_ms,
            resends: 0,
        });
        if now_ms.saturating_sub(wait.since_ms) < u64::from(self.config.request_timeout_ms)
            || !publisher.is_connected()
        {
            return;
        }
        if wait.resends >= self.config.max_request_retries {
            warn!("OTA: status {} never acknowledged, dropping job", status);
            self.lifecycle.forget_job();
            self.ack_wait = None;
            sink.emit(&OtaEvent::StatusAckLost { status });
            return;
        }

        if self
            .lifecycle
            .report_status(&self.identity, status, &version, publisher)
        {
            sink.emit(&OtaEvent::StatusReported { status });
        }
        self.ack_wait = Some(AckWait {
            since_ms: now_ms,
            resends: wait.resends + 1,
        });
    }

    // ── Route handlers ────────────────────────────────────────

    fn on_start_next_accepted<P: Publisher, E: EventSink>(
        &mut self,
        payload: &[u8],
        now_ms: u64,
        publisher: &mut P,
        sink: &mut E,
    ) {
        let Ok(message) = core::str::from_utf8(payload) else {
            sink.emit(&OtaEvent::DocumentRejected(DocumentError::MissingJobId));
            return;
        };
        if is_empty_reply(&self.extractor, message) {
            sink.emit(&OtaEvent::NoPendingJob);
            return;
        }
        let job_id = match get_job_id(&self.extractor, message) {
            Ok(id) => id,
            Err(e) => {
                warn!("OTA: start-next reply unusable: {}", e);
                sink.emit(&OtaEvent::DocumentRejected(e));
                return;
            }
        };
        let was_busy = self.lifecycle.active_job().is_some();
        let document = get_job_document(&self.extractor, message);
        let version = get_version_number(&self.extractor, message)
            .unwrap_or_else(|| self.config.default_expected_version.clone());

        let extractor = &self.extractor;
        let mut parsed: Option<Result<JobDocumentFields, DocumentError>> = None;
        self.lifecycle.on_start_next_accepted(
            &job_id,
            document.as_deref().unwrap_or_default(),
            &version,
            |_, doc| {
                let fields = match &document {
                    Ok(_) => parse_job_document(extractor, doc, N),
                    Err(e) => Err(*e),
                };
                let usable = fields.is_ok();
                parsed = Some(fields);
                usable
            },
        );

        if was_busy {
            sink.emit(&OtaEvent::DuplicateJobIgnored { job_id });
            return;
        }
        let Some(parsed) = parsed else {
            sink.emit(&OtaEvent::DocumentRejected(DocumentError::InvalidJobId));
            return;
        };
        sink.emit(&OtaEvent::JobAccepted { job_id });
        match parsed {
            Ok(fields) => self.begin_download(&fields, now_ms, publisher, sink),
            Err(e) => {
                warn!("OTA: job document rejected: {}", e);
                sink.emit(&OtaEvent::DocumentRejected(e));
                self.finish_job(JobStatus::Rejected, publisher, sink);
            }
        }
    }

    fn begin_download<P: Publisher, E: EventSink>(
        &mut self,
        fields: &JobDocumentFields,
        now_ms: u64,
        publisher: &mut P,
        sink: &mut E,
    ) {
        if !self.transfer.init(&self.identity, &fields.image_ref) {
            sink.emit(&OtaEvent::TransferInitFailed);
            self.finish_job(JobStatus::Failed, publisher, sink);
            return;
        }
        let descriptor = FileTransferDescriptor {
            file_id: fields.file_id,
            total_size: fields.file_size,
            block_size: self.config.block_size,
        };
        match self
            .session
            .begin(descriptor, now_ms, publisher, &mut self.transfer)
        {
            Ok(()) => sink.emit(&OtaEvent::DownloadStarted {
                file_id: descriptor.file_id,
                total_size: descriptor.total_size,
                blocks: descriptor.total_blocks(),
            }),
            Err(e) => {
                sink.emit(&OtaEvent::TransferFailed(e));
                self.finish_job(JobStatus::Failed, publisher, sink);
            }
        }
    }

    fn on_block_data<P: Publisher, E: EventSink>(
        &mut self,
        payload: &[u8],
        now_ms: u64,
        publisher: &mut P,
        sink: &mut E,
    ) {
        if !self.session.is_receiving() {
            debug!("OTA: block data with no download in progress");
            return;
        }
        let Some(header) = self.transfer.decode_block(payload, &mut self.scratch) else {
            warn!("OTA: undecodable block message ({} bytes)", payload.len());
            return;
        };
        let block = ArrivedBlock {
            file_id: header.file_id,
            block_id: header.block_id,
            data: self.scratch.get(..header.len).unwrap_or_default(),
        };

        match self
            .session
            .on_block_arrived(block, now_ms, publisher, &mut self.transfer)
        {
            Ok(BlockOutcome::Accepted {
                block_id,
                blocks_remaining,
            }) => sink.emit(&OtaEvent::BlockAccepted {
                block_id,
                blocks_remaining,
            }),
            Ok(BlockOutcome::Discarded { block_id, reason }) => {
                sink.emit(&OtaEvent::BlockDiscarded { block_id, reason });
            }
            Ok(BlockOutcome::Complete { bytes }) => {
                sink.emit(&OtaEvent::TransferComplete { bytes });
                let image = &mut self.image;
                let consumed = self
                    .session
                    .image()
                    .is_some_and(|img| image.on_transfer_complete(img));
                if !consumed {
                    sink.emit(&OtaEvent::ImageRejected);
                }
                let status = if consumed {
                    JobStatus::Succeeded
                } else {
                    JobStatus::Failed
                };
                self.finish_job(status, publisher, sink);
            }
            Err(e) => {
                sink.emit(&OtaEvent::TransferFailed(e));
                self.finish_job(JobStatus::Failed, publisher, sink);
            }
        }
    }

    /// Drop the download and publish a terminal status for the active job.
    /// An unpublished status is kept and re-sent from [`tick`](Self::tick).
    fn finish_job<P: Publisher, E: EventSink>(&mut self, status: JobStatus, publisher: &mut P, sink: &mut E) {
        self.session.reset();
        let Some(job) = self.lifecycle.active_job() else {
            self.unsent_status = None;
            return;
        };
        let mut version = JobVersion::new();
        let _ = version.push_str(job.expected_version());

        if self
            .lifecycle
            .report_status(&self.identity, status, &version, publisher)
        {
            self.unsent_status = None;
            self.ack_wait = None;
            sink.emit(&OtaEvent::StatusReported { status });
        } else {
            self.unsent_status = Some(status);
            sink.emit(&OtaEvent::StatusNotSent { status });
        }
    }
}
