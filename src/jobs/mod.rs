//! Jobs protocol: topic grammar, status values and job-document fields.
//!
//! Everything here is stateless.  The stateful parts (which job is active,
//! how far the download got) live in [`crate::ota`].

pub mod document;
pub mod status;
pub mod topics;

pub use status::{JobStatus, JobUpdateStatus};

/// Stored job id.
pub type JobId = heapless::String<{ crate::config::MAX_JOB_ID_LEN }>;

/// Stored expected version.
pub type JobVersion = heapless::String<{ crate::config::MAX_VERSION_LEN }>;
