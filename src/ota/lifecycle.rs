//! Job lifecycle: owns the single active job.
//!
//! ```text
//!               start-next accepted            terminal status published
//!  NoActiveJob ─────────────────────▶ JobActive ─────────────────────────▶ AwaitingAck
//!       ▲                                                                      │
//!       └──────────────── update accepted / rejected for the stored id ────────┘
//! ```
//!
//! The stored job id doubles as the "already busy" sentinel: a second
//! job-accepted message is ignored until the first job has been closed.

use log::{info, warn};

use crate::app::ports::Publisher;
use crate::config::{START_NEXT_MSG_CAPACITY, TOPIC_BUFFER_SIZE, UPDATE_MSG_CAPACITY};
use crate::identity::DeviceIdentity;
use crate::jobs::topics::{
    as_topic, build_start_next_message, build_start_next_topic, build_update_message,
    build_update_topic, is_job_update_status,
};
use crate::jobs::{JobId, JobStatus, JobUpdateStatus, JobVersion};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobExecution {
    job_id: JobId,
    status: JobStatus,
    expected_version: JobVersion,
}

impl JobExecution {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Last status successfully published (IN_PROGRESS once accepted).
    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn expected_version(&self) -> &str {
        &self.expected_version
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleState {
    NoActiveJob,
    JobActive(JobExecution),
    /// A terminal status was published; waiting for the service's reply.
    AwaitingAck(JobExecution),
}

pub struct JobLifecycleManager {
    state: LifecycleState,
}

impl Default for JobLifecycleManager {
    fn default() -> Self {
        Self::new()
    }
}

impl JobLifecycleManager {
    pub const fn new() -> Self {
        Self {
            state: LifecycleState::NoActiveJob,
        }
    }

    pub fn state(&self) -> &LifecycleState {
        &self.state
    }

    pub fn active_job(&self) -> Option<&JobExecution> {
        match &self.state {
            LifecycleState::JobActive(job) | LifecycleState::AwaitingAck(job) => Some(job),
            LifecycleState::NoActiveJob => None,
        }
    }

    pub fn active_job_id(&self) -> Option<&str> {
        self.active_job().map(JobExecution::job_id)
    }

    /// Ask the job service for the next pending job.
    ///
    /// Returns `false` without publishing when the transport is down or a
    /// job is already active.
    pub fn request_next_job<P: Publisher>(
        &mut self,
        identity: &DeviceIdentity,
        client_token: &str,
        publisher: &mut P,
    ) -> bool {
        if !publisher.is_connected() {
            warn!("JOBS: transport down, start-next not sent");
            return false;
        }
        if let Some(job) = self.active_job() {
            warn!("JOBS: job {} still active, start-next suppressed", job.job_id);
            return false;
        }

        let mut topic = [0u8; TOPIC_BUFFER_SIZE];
        let mut body = [0u8; START_NEXT_MSG_CAPACITY];
        let (Some(topic_len), Some(body_len)) = (
            build_start_next_topic(identity.as_str(), &mut topic),
            build_start_next_message(client_token, &mut body),
        ) else {
            warn!("JOBS: start-next request could not be built");
            return false;
        };
        let Some(topic) = as_topic(&topic, topic_len) else {
            return false;
        };

        let sent = publisher.publish(topic, &body[..body_len]);
        if sent {
            info!("JOBS: start-next requested");
        }
        sent
    }

    /// Record a job handed out by the service and pass its document to
    /// `init` (download initialisation).
    ///
    /// Ignored (`false`) while another job is recorded.  Otherwise the job
    /// is recorded and `init`'s verdict is returned; a job whose document
    /// `init` refused stays recorded so that it can be reported.
    pub fn on_start_next_accepted<F>(
        &mut self,
        job_id: &str,
        job_document: &str,
        expected_version: &str,
        init: F,
    ) -> bool
    where
        F: FnOnce(&str, &str) -> bool,
    {
        if let Some(active) = self.active_job() {
            warn!(
                "JOBS: job {} accepted while {} is active, ignored",
                job_id, active.job_id
            );
            return false;
        }

        let mut stored_id = JobId::new();
        let mut stored_version = JobVersion::new();
        if job_id.is_empty()
            || stored_id.push_str(job_id).is_err()
            || stored_version.push_str(expected_version).is_err()
        {
            warn!("JOBS: accepted job id or version unusable, ignored");
            return false;
        }

        info!("JOBS: job {} accepted (version {})", job_id, expected_version);
        self.state = LifecycleState::JobActive(JobExecution {
            job_id: stored_id,
            status: JobStatus::InProgress,
            expected_version: stored_version,
        });
        init(job_id, job_document)
    }

    /// Publish a status update for the active job.
    ///
    /// No-op returning `false` when no job is active.  A terminal status
    /// moves the job to `AwaitingAck`.
    pub fn report_status<P: Publisher>(
        &mut self,
        identity: &DeviceIdentity,
        status: JobStatus,
        expected_version: &str,
        publisher: &mut P,
    ) -> bool {
        let Some(job) = self.active_job() else {
            warn!("JOBS: no active job, {} not reported", status);
            return false;
        };

        let mut topic = [0u8; TOPIC_BUFFER_SIZE];
        let mut body = [0u8; UPDATE_MSG_CAPACITY];
        let (Some(topic_len), Some(body_len)) = (
            build_update_topic(identity.as_str(), &job.job_id, &mut topic),
            build_update_message(status, expected_version, &mut body),
        ) else {
            warn!("JOBS: status update for {} could not be built", job.job_id);
            return false;
        };
        let Some(topic) = as_topic(&topic, topic_len) else {
            return false;
        };
        if !publisher.publish(topic, &body[..body_len]) {
            warn!("JOBS: status {} for {} not published", status, job.job_id);
            return false;
        }
        info!("JOBS: job {} -> {}", job.job_id, status);

        let mut job = job.clone();
        job.status = status;
        self.state = if status.is_terminal() {
            LifecycleState::AwaitingAck(job)
        } else {
            LifecycleState::JobActive(job)
        };
        true
    }

    /// Drop the recorded job without a reply from the service.
    pub fn forget_job(&mut self) {
        if let Some(job) = self.active_job() {
            warn!("JOBS: job {} dropped locally", job.job_id);
        }
        self.state = LifecycleState::NoActiveJob;
    }

    /// Consume an update-result message for the active job.
    ///
    /// Returns `None` if `topic` is not an update result for the stored
    /// job.  Any reply to a terminal update closes the job locally: a
    /// rejected terminal transition is not retried.
    pub fn on_update_result(
        &mut self,
        identity: &DeviceIdentity,
        topic: &str,
    ) -> Option<JobUpdateStatus> {
        let (job_id, terminal) = match &self.state {
            LifecycleState::JobActive(job) => (job.job_id.as_str(), false),
            LifecycleState::AwaitingAck(job) => (job.job_id.as_str(), true),
            LifecycleState::NoActiveJob => return None,
        };
        let result = [JobUpdateStatus::Accepted, JobUpdateStatus::Rejected]
            .into_iter()
            .find(|&s| is_job_update_status(identity, topic, job_id, s))?;

        match (result, terminal) {
            (JobUpdateStatus::Accepted, true) => info!("JOBS: job {} closed", job_id),
            (JobUpdateStatus::Rejected, true) => {
                warn!("JOBS: final update for {} rejected, dropping job", job_id);
            }
            (JobUpdateStatus::Rejected, false) => warn!("JOBS: update for {} rejected", job_id),
            (JobUpdateStatus::Accepted, false) => {}
        }
        if terminal {
            self.state = LifecycleState::NoActiveJob;
        }
        Some(result)
    }
}
