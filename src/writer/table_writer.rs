//! Table writer entry point

use super::reconcile::{PlannedTable, Reconciler};
use super::system::SystemMetadata;
use super::uploader::TableUploader;
use crate::error::{Error, Result};
use crate::mapping::{rewrite_destination, ManifestFormat, OutputConfig};
use crate::queue::{LoadTableQueue, MetadataDefinition};
use crate::staging::StagingStrategy;
use crate::storage::{BackendSession, PollConfig};
use tracing::info;

/// Writes the tables of an output directory into storage
#[derive(Debug, Clone)]
pub struct TableWriter {
    session: BackendSession,
    format: ManifestFormat,
    poll: PollConfig,
}

impl TableWriter {
    pub fn new(session: BackendSession) -> Self {
        Self {
            session,
            format: ManifestFormat::default(),
            poll: PollConfig::default(),
        }
    }

    /// Format of the table manifests
    #[must_use]
    pub fn with_manifest_format(mut self, format: ManifestFormat) -> Self {
        self.format = format;
        self
    }

    /// Polling cadence of the returned queue
    #[must_use]
    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    pub fn session(&self) -> &BackendSession {
        &self.session
    }

    /// Reconcile, prepare and start loading every table under `source`
    ///
    /// `source` is the output directory relative to the strategy roots. All
    /// sources are validated before the first backend call. The returned queue
    /// is already started; call [`LoadTableQueue::wait_for_all`] on it.
    pub async fn upload_tables(
        &self,
        source: &str,
        config: &OutputConfig,
        system: &SystemMetadata,
        strategy: &StagingStrategy,
    ) -> Result<LoadTableQueue> {
        system.validate()?;
        self.check_branch(config)?;

        let mut plans = self
            .plan(source, config, strategy)
            .map_err(|e| user_facing(e, String::new))?;
        for plan in &mut plans {
            plan.manifest.destination =
                rewrite_destination(&plan.manifest.destination, self.session.branch_id())
                    .map_err(|e| user_facing(e, String::new))?;
        }
        info!(source, tables = plans.len(), mode = %strategy.mode(), "Uploading tables");

        let uploader = TableUploader::new(&self.session, system);
        let mut tasks = Vec::with_capacity(plans.len());
        for plan in &plans {
            let destination = plan.manifest.destination.as_str();
            let mut task = uploader
                .upload_table(strategy, source, plan)
                .await
                .map_err(|e| {
                    user_facing(e, || {
                        format!(
                            "Cannot upload file '{}' to table '{destination}' in Storage API: ",
                            plan.source_name
                        )
                    })
                })?;

            if !plan.manifest.metadata.is_empty() {
                task.add_metadata(MetadataDefinition::table(
                    destination,
                    &system.component_id,
                    plan.manifest.metadata.clone(),
                ));
            }
            if !plan.manifest.column_metadata.is_empty() {
                task.add_metadata(MetadataDefinition::columns(
                    destination,
                    &system.component_id,
                    plan.manifest.column_metadata.clone(),
                ));
            }
            tasks.push(task);
        }

        let mut queue = LoadTableQueue::new(self.session.api().clone(), self.poll.clone(), tasks);
        queue.start().await?;
        Ok(queue)
    }

    fn plan(
        &self,
        source: &str,
        config: &OutputConfig,
        strategy: &StagingStrategy,
    ) -> Result<Vec<PlannedTable>> {
        let reconciler = Reconciler::new(config, self.format);
        let metadata_dir = strategy.metadata_root().join(source);
        if strategy.is_local() {
            reconciler.reconcile_local(&strategy.data_root().join(source), &metadata_dir)
        } else {
            reconciler.reconcile_workspace(&metadata_dir)
        }
    }

    /// A configuration written for a branch only runs in that branch
    fn check_branch(&self, config: &OutputConfig) -> Result<()> {
        let Some(expected) = config.branch_id.as_deref() else {
            return Ok(());
        };
        match self.session.branch_id() {
            Some(actual) if actual == expected => Ok(()),
            actual => Err(Error::output_operation(format!(
                "Configuration is bound to branch \"{expected}\" but the storage session uses {}",
                actual.map_or_else(|| "the default branch".to_string(), |id| format!("branch \"{id}\""))
            ))),
        }
    }
}

/// Errors leaving the writer are `InvalidOutput` or `OutputOperation`; anything
/// else is wrapped with `prefix`, keeping its status code
fn user_facing(error: Error, prefix: impl FnOnce() -> String) -> Error {
    match error {
        Error::InvalidOutput { .. } | Error::OutputOperation { .. } => error,
        other => other.into_invalid_output(&prefix()),
    }
}
