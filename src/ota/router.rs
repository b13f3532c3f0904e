//! Inbound message classification.
//!
//! ```text
//!  (topic, payload)
//!        │
//!        ├─ start-next accepted for this device ──▶ lifecycle
//!        ├─ block-transfer data topic ────────────▶ session
//!        ├─ update result for the active job ─────▶ lifecycle
//!        └─ anything else ────────────────────────▶ unhandled
//! ```
//!
//! Classification looks at the topic only; the payload is decoded by the
//! component that owns the route.

use crate::app::ports::BlockTransfer;
use crate::identity::DeviceIdentity;
use crate::jobs::JobUpdateStatus;
use crate::jobs::topics::{is_job_update_status, is_start_next_accepted};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    StartNextAccepted,
    BlockData,
    UpdateResult(JobUpdateStatus),
    Unhandled,
}

/// Decide which component owns an inbound topic.  Start-next is checked
/// first, then block data, then update results for `active_job_id`.
pub fn classify<T: BlockTransfer>(
    identity: &DeviceIdentity,
    active_job_id: Option<&str>,
    topic: &str,
    transfer: &T,
) -> Route {
    if is_start_next_accepted(identity, topic) {
        return Route::StartNextAccepted;
    }
    if transfer.is_block_topic(topic) {
        return Route::BlockData;
    }
    if let Some(job_id) = active_job_id {
        for status in [JobUpdateStatus::Accepted, JobUpdateStatus::Rejected] {
            if is_job_update_status(identity, topic, job_id, status) {
                return Route::UpdateResult(status);
            }
        }
    }
    Route::Unhandled
}
