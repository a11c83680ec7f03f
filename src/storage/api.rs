//! Storage backend contracts
//!
//! The writer talks to the storage platform only through these traits, so the
//! REST client and the in-memory backend are interchangeable.

use crate::error::Result;
use crate::types::{DeleteWhereOperator, MetadataItem, Stage};
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};

// ============================================================================
// Wire Types
// ============================================================================

/// Table detail as reported by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub rows_count: Option<u64>,
}

/// Stored metadata entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataEntry {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub key: String,
    #[serde(deserialize_with = "string_or_number")]
    pub value: String,
    pub provider: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Options for creating a table from a header
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateTableOptions {
    pub columns: Vec<String>,
    pub primary_key: Vec<String>,
    /// Omitted from the request when empty
    pub distribution_key: Vec<String>,
}

/// Predicate row deletion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteRowsOptions {
    pub where_column: String,
    pub where_operator: DeleteWhereOperator,
    pub where_values: Vec<String>,
}

/// File upload options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileUploadOptions {
    /// Gzip the payload before upload
    pub compress: bool,
    pub is_sliced: bool,
    /// Name of the uploaded file; defaults to the local file name
    pub file_name: Option<String>,
}

/// Where an import job reads its data from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum DataReference {
    /// Previously uploaded file
    #[serde(rename_all = "camelCase")]
    File { data_file_id: String },
    /// Object living in a workspace
    #[serde(rename_all = "camelCase")]
    Workspace {
        data_workspace_id: String,
        data_object: String,
    },
}

/// Asynchronous import request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRequest {
    pub data: DataReference,
    pub delimiter: String,
    pub enclosure: String,
    /// Declared columns; the data then carries no header row
    pub columns: Vec<String>,
    pub incremental: bool,
}

impl ImportRequest {
    /// Whether the data has a header row to skip
    pub fn without_headers(&self) -> bool {
        !self.columns.is_empty()
    }
}

/// Backend job state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Waiting,
    Processing,
    Success,
    Error,
    #[serde(other)]
    Unknown,
}

impl JobStatus {
    /// Check if job is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }
}

/// Backend job as seen when polling
#[derive(Debug, Clone, PartialEq)]
pub struct JobInfo {
    pub id: String,
    pub status: JobStatus,
    /// Failure message for jobs in `Error`
    pub error: Option<String>,
    /// Operation specific results (e.g. created table id)
    pub results: Option<serde_json::Value>,
}

// ============================================================================
// Traits
// ============================================================================

/// Metadata annotation service
#[async_trait]
pub trait MetadataApi: Send + Sync {
    async fn list_bucket_metadata(&self, bucket_id: &str) -> Result<Vec<MetadataEntry>>;

    async fn list_table_metadata(&self, table_id: &str) -> Result<Vec<MetadataEntry>>;

    async fn post_bucket_metadata(
        &self,
        bucket_id: &str,
        provider: &str,
        items: &[MetadataItem],
    ) -> Result<()>;

    async fn post_table_metadata(
        &self,
        table_id: &str,
        provider: &str,
        items: &[MetadataItem],
    ) -> Result<()>;

    /// `column_id` is `{table_id}.{column}`
    async fn post_column_metadata(
        &self,
        column_id: &str,
        provider: &str,
        items: &[MetadataItem],
    ) -> Result<()>;
}

/// Storage backend operations used by the writer
///
/// Every method may fail with a transport error carrying an HTTP-like status;
/// 404 means the object does not exist.
#[async_trait]
pub trait StorageApi: MetadataApi {
    async fn bucket_exists(&self, bucket_id: &str) -> Result<bool>;

    /// Create a bucket and return its id
    async fn create_bucket(&self, name: &str, stage: Stage) -> Result<String>;

    async fn table_exists(&self, table_id: &str) -> Result<bool>;

    async fn get_table(&self, table_id: &str) -> Result<TableInfo>;

    /// Create a table and wait for it; returns the table id
    async fn create_table_async(
        &self,
        bucket_id: &str,
        name: &str,
        options: &CreateTableOptions,
    ) -> Result<String>;

    async fn delete_table_rows(&self, table_id: &str, options: &DeleteRowsOptions) -> Result<()>;

    async fn remove_table_primary_key(&self, table_id: &str) -> Result<()>;

    async fn create_table_primary_key(&self, table_id: &str, columns: &[String]) -> Result<()>;

    /// Upload a single file and return its file id
    async fn upload_file(&self, path: &Path, options: &FileUploadOptions) -> Result<String>;

    /// Upload slices as one sliced file and return its file id
    async fn upload_sliced_file(
        &self,
        slices: &[PathBuf],
        options: &FileUploadOptions,
    ) -> Result<String>;

    /// Submit an import job without waiting; returns the job id
    async fn queue_table_import(&self, table_id: &str, request: &ImportRequest) -> Result<String>;

    async fn get_job(&self, job_id: &str) -> Result<JobInfo>;
}

/// Accepts ids and values sent either as JSON strings or numbers
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Int(i64),
        Float(f64),
        Bool(bool),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Str(s) => s,
        Raw::Int(i) => i.to_string(),
        Raw::Float(f) => f.to_string(),
        Raw::Bool(b) => b.to_string(),
    })
}
