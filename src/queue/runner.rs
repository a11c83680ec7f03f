//! Load queue
//!
//! Submits every task's import job in order, then walks the tasks in the same
//! order waiting for each job and running its metadata continuations.

use super::types::{LoadTableTask, TaskState};
use crate::error::{Error, Result};
use crate::storage::{wait_for_job, JobStatus, PollConfig, StorageApi};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Ordered collection of deferred table loads
pub struct LoadTableQueue {
    api: Arc<dyn StorageApi>,
    poll: PollConfig,
    tasks: Vec<LoadTableTask>,
}

impl LoadTableQueue {
    pub fn new(api: Arc<dyn StorageApi>, poll: PollConfig, tasks: Vec<LoadTableTask>) -> Self {
        Self { api, poll, tasks }
    }

    pub fn tasks(&self) -> &[LoadTableTask] {
        &self.tasks
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Submit the import job of every pending task, in order
    ///
    /// Stops at the first submission error; tasks submitted before it keep
    /// running on the backend.
    pub async fn start(&mut self) -> Result<()> {
        for task in self.tasks.iter_mut() {
            if task.state != TaskState::Pending {
                continue;
            }

            match self
                .api
                .queue_table_import(task.table_id(), task.request())
                .await
            {
                Ok(job_id) => {
                    info!(table = %task.table_id(), job_id = %job_id, "Table load submitted");
                    task.mark_submitted(job_id);
                }
                Err(e) => {
                    let error =
                        e.into_invalid_output(&format!("Failed to load table \"{}\": ", task.table_id()));
                    task.mark_failed(&error);
                    return Err(error);
                }
            }
        }
        Ok(())
    }

    /// Wait for every submitted job and run continuations of the successful ones
    ///
    /// Returns job ids in submission order, or the first failure once every
    /// task has reached a terminal state.
    pub async fn wait_for_all(&mut self) -> Result<Vec<String>> {
        let mut job_ids = Vec::with_capacity(self.tasks.len());
        let mut first_failure: Option<Error> = None;

        for task in self.tasks.iter_mut() {
            let job_id = match &task.state {
                TaskState::Submitted { job_id } => job_id.clone(),
                TaskState::Succeeded { job_id } => {
                    job_ids.push(job_id.clone());
                    continue;
                }
                TaskState::Failed { message, code } => {
                    first_failure.get_or_insert_with(|| Error::InvalidOutput {
                        message: message.clone(),
                        code: *code,
                    });
                    continue;
                }
                TaskState::Pending => {
                    let error = Error::output_operation(format!(
                        "Load of table \"{}\" was never started",
                        task.table_id()
                    ));
                    first_failure.get_or_insert(error);
                    continue;
                }
            };

            match Self::finish(self.api.as_ref(), &self.poll, task, &job_id).await {
                Ok(()) => {
                    task.mark_succeeded(job_id.clone());
                    job_ids.push(job_id);
                }
                Err(error) => {
                    warn!(table = %task.table_id(), job_id = %job_id, error = %error, "Table load failed");
                    task.mark_failed(&error);
                    first_failure.get_or_insert(error);
                }
            }
        }

        match first_failure {
            Some(error) => Err(error),
            None => Ok(job_ids),
        }
    }

    async fn finish(
        api: &dyn StorageApi,
        poll: &PollConfig,
        task: &LoadTableTask,
        job_id: &str,
    ) -> Result<()> {
        let table_id = task.table_id();
        let job = wait_for_job(api, job_id, poll)
            .await
            .map_err(|e| e.into_invalid_output(&format!("Failed to load table \"{table_id}\": ")))?;

        if job.status != JobStatus::Success {
            let reason = job
                .error
                .unwrap_or_else(|| "Job failed without a message".to_string());
            return Err(Error::invalid_output(format!(
                "Failed to load table \"{table_id}\": {reason}"
            )));
        }
        info!(table = %table_id, job_id, "Table loaded");

        for definition in task.continuations() {
            debug!(table = %table_id, provider = definition.provider(), "Writing metadata");
            definition.apply(api).await.map_err(|e| {
                e.into_invalid_output(&format!(
                    "Failed to write metadata for table \"{table_id}\": "
                ))
            })?;
        }
        Ok(())
    }
}

impl fmt::Debug for LoadTableQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadTableQueue")
            .field("poll", &self.poll)
            .field("tasks", &self.tasks)
            .finish_non_exhaustive()
    }
}
