//! Job polling
//!
//! Storage jobs move `waiting → processing → success | error`. Polling backs
//! off between checks and has no attempt limit; a job runs until the backend
//! reports a terminal state. A status the client does not know ends polling
//! with an error.

use super::api::{JobInfo, JobStatus, StorageApi};
use crate::error::{Error, Result};
use crate::http::backoff_delay;
use crate::types::BackoffType;
use std::time::Duration;
use tracing::debug;

/// Polling cadence for backend jobs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    /// Delay before the second status check
    pub initial_interval: Duration,
    /// Upper bound for the delay between checks
    pub max_interval: Duration,
    pub backoff: BackoffType,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(20),
            backoff: BackoffType::Exponential,
        }
    }
}

impl PollConfig {
    /// Constant interval polling
    pub fn constant(interval: Duration) -> Self {
        Self {
            initial_interval: interval,
            max_interval: interval,
            backoff: BackoffType::Constant,
        }
    }

    /// Delay after poll number `attempt`
    pub fn delay(&self, attempt: u32) -> Duration {
        backoff_delay(
            self.backoff,
            self.initial_interval,
            self.max_interval,
            attempt,
        )
    }
}

/// Poll a job until it reaches a terminal state
///
/// The returned job may be in `Error`; the caller decides how to report it.
pub async fn wait_for_job(api: &dyn StorageApi, job_id: &str, poll: &PollConfig) -> Result<JobInfo> {
    let mut attempt = 0;
    loop {
        let job = api.get_job(job_id).await?;
        if job.status == JobStatus::Unknown {
            return Err(Error::job(job.id, "Job reported an unrecognised status"));
        }
        if job.status.is_terminal() {
            debug!(job_id, status = ?job.status, "Job finished");
            return Ok(job);
        }
        let delay = poll.delay(attempt);
        debug!(job_id, status = ?job.status, ?delay, "Job not finished yet");
        tokio::time::sleep(delay).await;
        attempt = attempt.saturating_add(1);
    }
}

/// Poll a job and turn a backend failure into [`Error::Job`]
pub async fn wait_for_job_success(
    api: &dyn StorageApi,
    job_id: &str,
    poll: &PollConfig,
) -> Result<JobInfo> {
    let job = wait_for_job(api, job_id, poll).await?;
    match job.status {
        JobStatus::Success => Ok(job),
        _ => Err(Error::job(
            job.id,
            job.error.unwrap_or_else(|| "Job failed without a message".to_string()),
        )),
    }
}
