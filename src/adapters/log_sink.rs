//! Log-based sink adapters.
//!
//! [`LogEventSink`] writes structured engine events to the logger (UART /
//! USB-CDC in production).  [`LogImageSink`] stands in for flashing: it
//! accepts the downloaded image and logs a summary of it.

use log::{info, warn};

use crate::app::events::OtaEvent;
use crate::app::ports::{EventSink, ImageSink};

/// Adapter that logs every [`OtaEvent`].
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LogEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &OtaEvent) {
        match event {
            OtaEvent::NextJobRequested => info!("JOB   | start-next requested"),
            OtaEvent::NoPendingJob => info!("JOB   | nothing queued"),
            OtaEvent::JobAccepted { job_id } => info!("JOB   | accepted id={}", job_id),
            OtaEvent::DuplicateJobIgnored { job_id } => {
                warn!("JOB   | ignored id={} (another job open)", job_id);
            }
            OtaEvent::DocumentRejected(e) => warn!("JOB   | document rejected: {}", e),
            OtaEvent::TransferInitFailed => warn!("XFER  | stream setup failed"),
            OtaEvent::DownloadStarted {
                file_id,
                total_size,
                blocks,
            } => info!(
                "XFER  | start file={} size={}B blocks={}",
                file_id, total_size, blocks
            ),
            OtaEvent::BlockAccepted {
                block_id,
                blocks_remaining,
            } => info!("XFER  | block {} ok, {} left", block_id, blocks_remaining),
            OtaEvent::BlockDiscarded { block_id, reason } => {
                warn!("XFER  | block {} discarded ({:?})", block_id, reason);
            }
            OtaEvent::BlockRetry { block_id, attempt } => {
                warn!("XFER  | block {} re-requested (attempt {})", block_id, attempt);
            }
            OtaEvent::TransferComplete { bytes } => info!("XFER  | complete {}B", bytes),
            OtaEvent::TransferFailed(e) => warn!("XFER  | failed: {}", e),
            OtaEvent::ImageRejected => warn!("IMAGE | rejected by sink"),
            OtaEvent::StatusReported { status } => info!("JOB   | status {} sent", status),
            OtaEvent::StatusNotSent { status } => warn!("JOB   | status {} not sent", status),
            OtaEvent::StatusAckLost { status } => {
                warn!("JOB   | status {} never acknowledged, job dropped", status);
            }
            OtaEvent::UpdateResult { result } => info!("JOB   | update {}", result),
        }
    }
}

/// Image sink that only reports what it received.
#[derive(Debug, Default)]
pub struct LogImageSink {
    images: u32,
    last_len: usize,
}

impl LogImageSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Images received so far.
    pub fn images(&self) -> u32 {
        self.images
    }

    pub fn last_len(&self) -> usize {
        self.last_len
    }
}

impl ImageSink for LogImageSink {
    fn on_transfer_complete(&mut self, image: &[u8]) -> bool {
        self.images = self.images.wrapping_add(1);
        self.last_len = image.len();
        let checksum = image
            .iter()
            .fold(0u32, |acc, &b| acc.rotate_left(5) ^ u32::from(b));
        let head = &image[..image.len().min(16)];
        info!(
            "IMAGE | {} bytes, checksum=0x{:08x}, head={:02x?}",
            image.len(),
            checksum,
            head
        );
        true
    }
}
