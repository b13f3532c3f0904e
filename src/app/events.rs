//! Outbound engine events.
//!
//! The [`OtaAgent`](crate::ota::agent::OtaAgent) emits these through the
//! [`EventSink`](super::ports::EventSink) port.  Adapters on the other
//! side decide what to do with them: log to serial, publish telemetry, etc.

use crate::jobs::document::DocumentError;
use crate::jobs::{JobId, JobStatus, JobUpdateStatus};
use crate::ota::session::{DiscardReason, SessionError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OtaEvent {
    /// A start-next request went out.
    NextJobRequested,
    /// The service answered start-next without a job.
    NoPendingJob,
    JobAccepted { job_id: JobId },
    /// A job arrived while another one is still open.
    DuplicateJobIgnored { job_id: JobId },
    /// A start-next reply or job document could not be used.
    DocumentRejected(DocumentError),
    /// The block transfer could not be prepared for the job's stream.
    TransferInitFailed,
    DownloadStarted {
        file_id: u8,
        total_size: u32,
        blocks: u32,
    },
    BlockAccepted { block_id: u32, blocks_remaining: u32 },
    BlockDiscarded { block_id: u32, reason: DiscardReason },
    BlockRetry { block_id: u32, attempt: u8 },
    TransferComplete { bytes: usize },
    TransferFailed(SessionError),
    /// The image sink refused the completed download.
    ImageRejected,
    StatusReported { status: JobStatus },
    StatusNotSent { status: JobStatus },
    /// A terminal status was re-sent until the retries ran out and the job
    /// was dropped locally.
    StatusAckLost { status: JobStatus },
    UpdateResult { result: JobUpdateStatus },
}
