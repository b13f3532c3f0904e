//! Job execution status values and update-result kinds.

use core::fmt;

/// Execution status of a job as reported to the job service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    InProgress,
    Failed,
    Succeeded,
    Rejected,
}

impl JobStatus {
    /// Wire representation used in the `status` field.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::InProgress => "IN_PROGRESS",
            Self::Failed => "FAILED",
            Self::Succeeded => "SUCCEEDED",
            Self::Rejected => "REJECTED",
        }
    }

    /// Terminal statuses end the job; no further updates follow.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Succeeded | Self::Rejected)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a status update, encoded as the last topic segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobUpdateStatus {
    Accepted,
    Rejected,
}

impl JobUpdateStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for JobUpdateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
