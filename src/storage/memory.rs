//! In-process storage backend
//!
//! A complete [`StorageApi`] kept in memory: buckets, tables with rows, uploaded
//! files, workspace objects, jobs and metadata. Failures can be injected per
//! table or metadata target, and jobs can be held in `processing` for a number
//! of polls.

use super::api::{
    CreateTableOptions, DataReference, DeleteRowsOptions, FileUploadOptions, ImportRequest,
    JobInfo, JobStatus, MetadataApi, MetadataEntry, StorageApi, TableInfo,
};
use crate::error::{Error, Result};
use crate::types::{DeleteWhereOperator, MetadataItem, Stage};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
struct BucketRecord {
    metadata: Vec<MetadataEntry>,
}

#[derive(Debug, Clone)]
struct TableRecord {
    name: String,
    columns: Vec<String>,
    primary_key: Vec<String>,
    rows: Vec<Vec<String>>,
    metadata: Vec<MetadataEntry>,
}

#[derive(Debug, Clone)]
struct StoredFile {
    content: Vec<u8>,
}

#[derive(Debug, Clone)]
struct JobRecord {
    remaining_polls: u32,
    outcome: std::result::Result<Option<Value>, String>,
}

#[derive(Debug, Default)]
struct State {
    buckets: BTreeMap<String, BucketRecord>,
    tables: BTreeMap<String, TableRecord>,
    columns: BTreeMap<String, Vec<MetadataEntry>>,
    files: BTreeMap<String, StoredFile>,
    jobs: BTreeMap<String, JobRecord>,
    workspaces: HashMap<(String, String), Vec<u8>>,
    next_id: u64,
    calls: Vec<String>,
    import_failures: HashMap<String, String>,
    metadata_failures: HashMap<String, String>,
    job_polls: u32,
}

impl State {
    fn next_id(&mut self) -> String {
        self.next_id += 1;
        self.next_id.to_string()
    }

    fn record(&mut self, call: String) {
        self.calls.push(call);
    }

    fn table(&self, table_id: &str) -> Result<&TableRecord> {
        self.tables
            .get(table_id)
            .ok_or_else(|| Error::http_status(404, format!("The table \"{table_id}\" was not found.")))
    }

    fn table_mut(&mut self, table_id: &str) -> Result<&mut TableRecord> {
        self.tables
            .get_mut(table_id)
            .ok_or_else(|| Error::http_status(404, format!("The table \"{table_id}\" was not found.")))
    }

    fn check_metadata_failure(&self, target: &str) -> Result<()> {
        match self.metadata_failures.get(target) {
            Some(message) => Err(Error::http_status(400, message.clone())),
            None => Ok(()),
        }
    }

    fn finished_job(&mut self, outcome: std::result::Result<Option<Value>, String>) -> String {
        let id = self.next_id();
        self.jobs.insert(
            id.clone(),
            JobRecord {
                remaining_polls: self.job_polls,
                outcome,
            },
        );
        id
    }

    fn upsert_metadata(
        &mut self,
        entries: &mut Vec<MetadataEntry>,
        provider: &str,
        items: &[MetadataItem],
    ) {
        let timestamp = Utc::now().to_rfc3339();
        for item in items {
            if let Some(existing) = entries
                .iter_mut()
                .find(|e| e.provider == provider && e.key == item.key)
            {
                existing.value.clone_from(&item.value);
                existing.timestamp = Some(timestamp.clone());
            } else {
                let id = self.next_id();
                entries.push(MetadataEntry {
                    id,
                    key: item.key.clone(),
                    value: item.value.clone(),
                    provider: provider.to_string(),
                    timestamp: Some(timestamp.clone()),
                });
            }
        }
    }

    fn import(&mut self, table_id: &str, request: &ImportRequest) -> std::result::Result<Option<Value>, String> {
        if let Some(message) = self.import_failures.get(table_id) {
            return Err(message.clone());
        }

        let content = match &request.data {
            DataReference::File { data_file_id } => self
                .files
                .get(data_file_id)
                .map(|f| f.content.clone())
                .ok_or_else(|| format!("File {data_file_id} not found"))?,
            DataReference::Workspace {
                data_workspace_id,
                data_object,
            } => self
                .workspaces
                .get(&(data_workspace_id.clone(), data_object.clone()))
                .cloned()
                .ok_or_else(|| {
                    format!("Object \"{data_object}\" not found in workspace {data_workspace_id}")
                })?,
        };

        let mut records = parse_csv(&content, &request.delimiter, &request.enclosure)
            .map_err(|e| e.to_string())?;

        let table = self
            .tables
            .get_mut(table_id)
            .ok_or_else(|| format!("The table \"{table_id}\" was not found."))?;

        if !request.without_headers() && !records.is_empty() {
            let header = records.remove(0);
            let missing: Vec<&String> = table
                .columns
                .iter()
                .filter(|c| !header.contains(*c))
                .collect();
            if !missing.is_empty() || header.len() != table.columns.len() {
                return Err(format!(
                    "Columns in the import {header:?} do not match table columns {:?}",
                    table.columns
                ));
            }
        }

        if records.iter().any(|r| r.len() != table.columns.len()) {
            return Err(format!(
                "Row width does not match the {} columns of table \"{table_id}\"",
                table.columns.len()
            ));
        }

        let imported = records.len();
        if request.incremental {
            let key: Vec<usize> = table
                .primary_key
                .iter()
                .filter_map(|k| table.columns.iter().position(|c| c == k))
                .collect();
            for record in records {
                let existing = (!key.is_empty())
                    .then(|| {
                        table
                            .rows
                            .iter()
                            .position(|row| key.iter().all(|&i| row[i] == record[i]))
                    })
                    .flatten();
                match existing {
                    Some(idx) => table.rows[idx] = record,
                    None => table.rows.push(record),
                }
            }
        } else {
            table.rows = records;
        }

        Ok(Some(json!({ "importedRowsCount": imported })))
    }
}

fn parse_csv(content: &[u8], delimiter: &str, enclosure: &str) -> Result<Vec<Vec<String>>> {
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(false)
        .delimiter(delimiter.bytes().next().unwrap_or(b','));
    match enclosure.bytes().next() {
        Some(quote) => builder.quote(quote),
        None => builder.quoting(false),
    };

    let mut rows = Vec::new();
    for record in builder.from_reader(content).records() {
        rows.push(record?.iter().map(String::from).collect());
    }
    Ok(rows)
}

/// In-memory storage backend
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    state: Mutex<State>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------------
    // Fixtures
    // ------------------------------------------------------------------------

    /// Create a bucket directly, e.g. `out.c-main`
    pub async fn add_bucket(&self, bucket_id: &str) {
        let mut state = self.state.lock().await;
        state.buckets.insert(
            bucket_id.to_string(),
            BucketRecord {
                metadata: Vec::new(),
            },
        );
    }

    /// Create a table directly, creating its bucket when missing
    pub async fn add_table(&self, table_id: &str, columns: &[&str], primary_key: &[&str]) {
        let mut state = self.state.lock().await;
        let (bucket_id, name) = table_id.rsplit_once('.').unwrap_or(("", table_id));
        state
            .buckets
            .entry(bucket_id.to_string())
            .or_insert_with(|| BucketRecord {
                metadata: Vec::new(),
            });
        state.tables.insert(
            table_id.to_string(),
            TableRecord {
                name: name.to_string(),
                columns: columns.iter().map(|c| c.to_string()).collect(),
                primary_key: primary_key.iter().map(|c| c.to_string()).collect(),
                rows: Vec::new(),
                metadata: Vec::new(),
            },
        );
    }

    /// Store an object in a workspace as CSV text
    pub async fn put_workspace_object(&self, workspace_id: &str, name: &str, content: &str) {
        let mut state = self.state.lock().await;
        state.workspaces.insert(
            (workspace_id.to_string(), name.to_string()),
            content.as_bytes().to_vec(),
        );
    }

    /// Make every import into `table_id` end in a failed job
    pub async fn fail_import(&self, table_id: &str, message: &str) {
        let mut state = self.state.lock().await;
        state
            .import_failures
            .insert(table_id.to_string(), message.to_string());
    }

    /// Make metadata writes to a bucket, table or column id fail
    pub async fn fail_metadata(&self, target_id: &str, message: &str) {
        let mut state = self.state.lock().await;
        state
            .metadata_failures
            .insert(target_id.to_string(), message.to_string());
    }

    /// Number of polls new jobs report `processing` before finishing
    pub async fn set_job_polls(&self, polls: u32) {
        self.state.lock().await.job_polls = polls;
    }

    // ------------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------------

    /// Rows currently stored in a table
    pub async fn table_rows(&self, table_id: &str) -> Option<Vec<Vec<String>>> {
        let state = self.state.lock().await;
        state.tables.get(table_id).map(|t| t.rows.clone())
    }

    /// Metadata stored for a column of a table
    pub async fn column_metadata(&self, table_id: &str, column: &str) -> Vec<MetadataEntry> {
        let state = self.state.lock().await;
        state
            .columns
            .get(&format!("{table_id}.{column}"))
            .cloned()
            .unwrap_or_default()
    }

    /// Raw content of an uploaded file
    pub async fn file_content(&self, file_id: &str) -> Option<Vec<u8>> {
        let state = self.state.lock().await;
        state.files.get(file_id).map(|f| f.content.clone())
    }

    /// Mutating and lookup calls in the order they were made
    pub async fn calls(&self) -> Vec<String> {
        self.state.lock().await.calls.clone()
    }

    /// Calls whose operation name is `operation`
    pub async fn calls_to(&self, operation: &str) -> Vec<String> {
        self.calls()
            .await
            .into_iter()
            .filter(|c| c.split(' ').next() == Some(operation))
            .collect()
    }
}

#[async_trait]
impl MetadataApi for InMemoryStorage {
    async fn list_bucket_metadata(&self, bucket_id: &str) -> Result<Vec<MetadataEntry>> {
        let mut state = self.state.lock().await;
        state.record(format!("list_bucket_metadata {bucket_id}"));
        state
            .buckets
            .get(bucket_id)
            .map(|b| b.metadata.clone())
            .ok_or_else(|| Error::http_status(404, format!("Bucket {bucket_id} not found")))
    }

    async fn list_table_metadata(&self, table_id: &str) -> Result<Vec<MetadataEntry>> {
        let mut state = self.state.lock().await;
        state.record(format!("list_table_metadata {table_id}"));
        Ok(state.table(table_id)?.metadata.clone())
    }

    async fn post_bucket_metadata(
        &self,
        bucket_id: &str,
        provider: &str,
        items: &[MetadataItem],
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record(format!("post_bucket_metadata {bucket_id}"));
        state.check_metadata_failure(bucket_id)?;
        let mut entries = state
            .buckets
            .get(bucket_id)
            .map(|b| b.metadata.clone())
            .ok_or_else(|| Error::http_status(404, format!("Bucket {bucket_id} not found")))?;
        state.upsert_metadata(&mut entries, provider, items);
        if let Some(bucket) = state.buckets.get_mut(bucket_id) {
            bucket.metadata = entries;
        }
        Ok(())
    }

    async fn post_table_metadata(
        &self,
        table_id: &str,
        provider: &str,
        items: &[MetadataItem],
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record(format!("post_table_metadata {table_id}"));
        state.check_metadata_failure(table_id)?;
        let mut entries = state.table(table_id)?.metadata.clone();
        state.upsert_metadata(&mut entries, provider, items);
        state.table_mut(table_id)?.metadata = entries;
        Ok(())
    }

    async fn post_column_metadata(
        &self,
        column_id: &str,
        provider: &str,
        items: &[MetadataItem],
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record(format!("post_column_metadata {column_id}"));
        state.check_metadata_failure(column_id)?;
        let (table_id, column) = column_id
            .rsplit_once('.')
            .ok_or_else(|| Error::http_status(400, format!("Invalid column id {column_id}")))?;
        if !state.table(table_id)?.columns.iter().any(|c| c == column) {
            return Err(Error::http_status(
                404,
                format!("Column \"{column}\" not found in table \"{table_id}\""),
            ));
        }
        let mut entries = state.columns.get(column_id).cloned().unwrap_or_default();
        state.upsert_metadata(&mut entries, provider, items);
        state.columns.insert(column_id.to_string(), entries);
        Ok(())
    }
}

#[async_trait]
impl StorageApi for InMemoryStorage {
    async fn bucket_exists(&self, bucket_id: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        state.record(format!("bucket_exists {bucket_id}"));
        Ok(state.buckets.contains_key(bucket_id))
    }

    async fn create_bucket(&self, name: &str, stage: Stage) -> Result<String> {
        let mut state = self.state.lock().await;
        let bucket_id = format!("{stage}.c-{name}");
        state.record(format!("create_bucket {bucket_id}"));
        if state.buckets.contains_key(&bucket_id) {
            return Err(Error::http_status(
                400,
                format!("The bucket \"{bucket_id}\" already exists."),
            ));
        }
        state.buckets.insert(
            bucket_id.clone(),
            BucketRecord {
                metadata: Vec::new(),
            },
        );
        Ok(bucket_id)
    }

    async fn table_exists(&self, table_id: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        state.record(format!("table_exists {table_id}"));
        Ok(state.tables.contains_key(table_id))
    }

    async fn get_table(&self, table_id: &str) -> Result<TableInfo> {
        let mut state = self.state.lock().await;
        state.record(format!("get_table {table_id}"));
        let table = state.table(table_id)?;
        Ok(TableInfo {
            id: table_id.to_string(),
            name: table.name.clone(),
            columns: table.columns.clone(),
            primary_key: table.primary_key.clone(),
            rows_count: Some(table.rows.len() as u64),
        })
    }

    async fn create_table_async(
        &self,
        bucket_id: &str,
        name: &str,
        options: &CreateTableOptions,
    ) -> Result<String> {
        let mut state = self.state.lock().await;
        let table_id = format!("{bucket_id}.{name}");
        state.record(format!("create_table {table_id}"));
        if !state.buckets.contains_key(bucket_id) {
            return Err(Error::http_status(
                404,
                format!("Bucket {bucket_id} not found"),
            ));
        }
        if state.tables.contains_key(&table_id) {
            return Err(Error::http_status(
                400,
                format!("The table \"{name}\" already exists."),
            ));
        }
        if let Some(missing) = options
            .primary_key
            .iter()
            .chain(&options.distribution_key)
            .find(|k| !options.columns.contains(*k))
        {
            return Err(Error::http_status(
                400,
                format!("Key column \"{missing}\" is not among the table columns"),
            ));
        }
        state.tables.insert(
            table_id.clone(),
            TableRecord {
                name: name.to_string(),
                columns: options.columns.clone(),
                primary_key: options.primary_key.clone(),
                rows: Vec::new(),
                metadata: Vec::new(),
            },
        );
        Ok(table_id)
    }

    async fn delete_table_rows(&self, table_id: &str, options: &DeleteRowsOptions) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record(format!("delete_table_rows {table_id}"));
        let table = state.table_mut(table_id)?;
        let idx = table
            .columns
            .iter()
            .position(|c| *c == options.where_column)
            .ok_or_else(|| {
                Error::http_status(
                    400,
                    format!("Column \"{}\" not found in table", options.where_column),
                )
            })?;
        let matches = |row: &Vec<String>| options.where_values.contains(&row[idx]);
        match options.where_operator {
            DeleteWhereOperator::Eq => table.rows.retain(|row| !matches(row)),
            DeleteWhereOperator::Ne => table.rows.retain(matches),
        }
        Ok(())
    }

    async fn remove_table_primary_key(&self, table_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record(format!("remove_table_primary_key {table_id}"));
        state.table_mut(table_id)?.primary_key.clear();
        Ok(())
    }

    async fn create_table_primary_key(&self, table_id: &str, columns: &[String]) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record(format!("create_table_primary_key {table_id}"));
        let table = state.table_mut(table_id)?;
        if !table.primary_key.is_empty() {
            return Err(Error::http_status(
                400,
                format!("Table \"{table_id}\" already has a primary key"),
            ));
        }
        if let Some(missing) = columns.iter().find(|c| !table.columns.contains(*c)) {
            return Err(Error::http_status(
                400,
                format!("Primary key column \"{missing}\" not found in table"),
            ));
        }
        table.primary_key = columns.to_vec();
        Ok(())
    }

    async fn upload_file(&self, path: &Path, _options: &FileUploadOptions) -> Result<String> {
        let content = tokio::fs::read(path).await?;
        let mut state = self.state.lock().await;
        state.record(format!("upload_file {}", path.display()));
        let id = state.next_id();
        state.files.insert(id.clone(), StoredFile { content });
        Ok(id)
    }

    async fn upload_sliced_file(
        &self,
        slices: &[PathBuf],
        options: &FileUploadOptions,
    ) -> Result<String> {
        let mut content = Vec::new();
        for slice in slices {
            content.extend(tokio::fs::read(slice).await?);
        }
        let mut state = self.state.lock().await;
        state.record(format!(
            "upload_sliced_file {}",
            options.file_name.as_deref().unwrap_or_default()
        ));
        let id = state.next_id();
        state.files.insert(id.clone(), StoredFile { content });
        Ok(id)
    }

    async fn queue_table_import(&self, table_id: &str, request: &ImportRequest) -> Result<String> {
        let mut state = self.state.lock().await;
        state.record(format!("queue_table_import {table_id}"));
        state.table(table_id)?;
        let outcome = state.import(table_id, request);
        Ok(state.finished_job(outcome))
    }

    async fn get_job(&self, job_id: &str) -> Result<JobInfo> {
        let mut state = self.state.lock().await;
        let job = state
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| Error::http_status(404, format!("Job {job_id} not found")))?;

        if job.remaining_polls > 0 {
            job.remaining_polls -= 1;
            return Ok(JobInfo {
                id: job_id.to_string(),
                status: JobStatus::Processing,
                error: None,
                results: None,
            });
        }

        Ok(match &job.outcome {
            Ok(results) => JobInfo {
                id: job_id.to_string(),
                status: JobStatus::Success,
                error: None,
                results: results.clone(),
            },
            Err(message) => JobInfo {
                id: job_id.to_string(),
                status: JobStatus::Error,
                error: Some(message.clone()),
                results: None,
            },
        })
    }
}
