//! Table load planner
//!
//! For one planned table: make sure the bucket and table exist, adjust the
//! primary key or delete rows on existing tables, stage the data and return
//! the deferred load task.

use super::reconcile::PlannedTable;
use super::system::{
    SystemMetadata, CREATED_BY_BRANCH_ID, LAST_UPDATED_BY_BRANCH_ID, SYSTEM_PROVIDER,
};
use crate::error::{Error, Result};
use crate::mapping::{
    modify_primary_key, normalize_key_array, should_modify_primary_key,
    validate_primary_key_against_table, TableManifest,
};
use crate::queue::{LoadTableTask, MetadataDefinition};
use crate::staging::{LoadOptions, SourceObject, StagingStrategy};
use crate::storage::{BackendSession, CreateTableOptions, DeleteRowsOptions, StorageApi};
use crate::types::TableId;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Prepares tables in the backend and builds their load tasks
#[derive(Debug, Clone, Copy)]
pub struct TableUploader<'a> {
    session: &'a BackendSession,
    system: &'a SystemMetadata,
}

impl<'a> TableUploader<'a> {
    pub fn new(session: &'a BackendSession, system: &'a SystemMetadata) -> Self {
        Self { session, system }
    }

    fn api(&self) -> &dyn StorageApi {
        self.session.api().as_ref()
    }

    /// Set up the destination of `plan` and return its load task
    ///
    /// The task carries the `lastUpdatedBy` metadata continuation.
    pub async fn upload_table(
        &self,
        strategy: &StagingStrategy,
        source_dir: &str,
        plan: &PlannedTable,
    ) -> Result<LoadTableTask> {
        let manifest = &plan.manifest;
        let table_id = TableId::parse(&manifest.destination)?;
        let destination = manifest.destination.as_str();
        let bucket_id = table_id.bucket_id();

        if self.api().bucket_exists(&bucket_id).await? {
            self.check_dev_bucket_metadata(&bucket_id).await?;
        } else {
            self.create_bucket(&table_id).await?;
        }

        if self.api().table_exists(destination).await? {
            self.prepare_existing_table(manifest).await?;
        } else {
            let header_path = header_path(strategy, source_dir, &plan.source);
            self.create_table(&table_id, manifest, &header_path).await?;
        }

        let options = LoadOptions {
            delimiter: manifest.delimiter.clone(),
            enclosure: manifest.enclosure.clone(),
            columns: manifest.columns.clone(),
            incremental: manifest.incremental,
        };
        let request = strategy
            .build_import(self.api(), source_dir, &plan.source, options)
            .await?;

        let mut task = LoadTableTask::new(destination, request);
        task.add_metadata(MetadataDefinition::table(
            destination,
            SYSTEM_PROVIDER,
            self.system.updated_metadata(),
        ));
        Ok(task)
    }

    async fn create_bucket(&self, table_id: &TableId) -> Result<()> {
        let bucket_id = self
            .api()
            .create_bucket(table_id.bucket_name(), table_id.stage())
            .await?;
        info!(bucket = %bucket_id, "Bucket created");
        self.api()
            .post_bucket_metadata(&bucket_id, SYSTEM_PROVIDER, &self.system.created_metadata())
            .await
    }

    /// In a branch session, an existing bucket must belong to that branch
    async fn check_dev_bucket_metadata(&self, bucket_id: &str) -> Result<()> {
        let Some(branch) = self.session.branch() else {
            return Ok(());
        };

        let metadata = match self.api().list_bucket_metadata(bucket_id).await {
            Ok(metadata) => metadata,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        };

        let owner = metadata
            .iter()
            .find(|m| m.key == LAST_UPDATED_BY_BRANCH_ID || m.key == CREATED_BY_BRANCH_ID);
        match owner {
            Some(entry) if entry.value == branch.id => Ok(()),
            Some(entry) => Err(Error::invalid_output(format!(
                "Trying to create a table in the development bucket \"{bucket_id}\" on branch \"{}\" \
                 (ID \"{}\"). The bucket metadata marks it as assigned to branch with ID \"{}\".",
                branch.name, branch.id, entry.value
            ))),
            None => Err(Error::invalid_output(format!(
                "Trying to create a table in the development bucket \"{bucket_id}\" on branch \"{}\" \
                 (ID \"{}\"), but the bucket is not assigned to any development branch.",
                branch.name, branch.id
            ))),
        }
    }

    async fn prepare_existing_table(&self, manifest: &TableManifest) -> Result<()> {
        let destination = manifest.destination.as_str();
        let table = self.api().get_table(destination).await?;

        validate_primary_key_against_table(&table, manifest);
        if should_modify_primary_key(&table, manifest) {
            let declared = normalize_key_array(&manifest.primary_key);
            modify_primary_key(self.api(), destination, &table.primary_key, &declared).await;
        }

        if let Some(delete_where) = &manifest.delete_where {
            debug!(table = %destination, column = %delete_where.column, "Deleting rows");
            let options = DeleteRowsOptions {
                where_column: delete_where.column.clone(),
                where_operator: delete_where.operator,
                where_values: delete_where.values.clone(),
            };
            self.api().delete_table_rows(destination, &options).await?;
        }
        Ok(())
    }

    async fn create_table(
        &self,
        table_id: &TableId,
        manifest: &TableManifest,
        header_path: &Path,
    ) -> Result<()> {
        let columns = if manifest.columns.is_empty() {
            read_header(header_path, &manifest.delimiter, &manifest.enclosure)?
        } else {
            manifest.columns.clone()
        };

        let options = CreateTableOptions {
            columns,
            primary_key: normalize_key_array(&manifest.primary_key),
            distribution_key: normalize_key_array(&manifest.distribution_key),
        };
        let created = self
            .api()
            .create_table_async(&table_id.bucket_id(), table_id.table_name(), &options)
            .await?;
        info!(table = %created, "Table created");

        self.api()
            .post_table_metadata(&manifest.destination, SYSTEM_PROVIDER, &self.system.created_metadata())
            .await
    }
}

/// File to read the header from when no columns are declared
fn header_path(strategy: &StagingStrategy, source_dir: &str, source: &SourceObject) -> PathBuf {
    match source.path() {
        Some(path) => path.clone(),
        None => strategy.data_root().join(source_dir).join(source.name()),
    }
}

fn single_byte(value: &str) -> Option<u8> {
    match value.as_bytes() {
        [byte] => Some(*byte),
        _ => None,
    }
}

/// First row of a CSV file
fn read_header(path: &Path, delimiter: &str, enclosure: &str) -> Result<Vec<String>> {
    let fail = |reason: String| {
        Error::invalid_output(format!("Failed to read file {} {reason}", path.display()))
    };

    let mut builder = csv::ReaderBuilder::new();
    builder.has_headers(false).flexible(true);
    builder.delimiter(
        single_byte(delimiter)
            .ok_or_else(|| fail(format!("Delimiter \"{delimiter}\" is not a single byte")))?,
    );
    if enclosure.is_empty() {
        builder.quoting(false);
    } else {
        builder.quote(
            single_byte(enclosure)
                .ok_or_else(|| fail(format!("Enclosure \"{enclosure}\" is not a single byte")))?,
        );
    }

    let mut reader = builder.from_path(path).map_err(|e| fail(e.to_string()))?;
    let mut record = csv::StringRecord::new();
    match reader.read_record(&mut record) {
        Ok(true) => Ok(record.iter().map(str::to_string).collect()),
        Ok(false) => Err(fail("File is empty".to_string())),
        Err(e) => Err(fail(e.to_string())),
    }
}
