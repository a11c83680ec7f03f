//! Storage API REST client
//!
//! Implements [`StorageApi`] and [`MetadataApi`] over the Storage API v2 REST
//! surface. Branch sessions address `/v2/storage/branch/{id}`; jobs are always
//! polled at `/v2/storage/jobs/{id}`.

use super::api::{
    string_or_number, CreateTableOptions, DeleteRowsOptions, FileUploadOptions, ImportRequest,
    JobInfo, JobStatus, MetadataApi, MetadataEntry, StorageApi, TableInfo,
};
use super::job::{wait_for_job_success, PollConfig};
use crate::error::{Error, Result};
use crate::http::{HttpClient, HttpClientConfig, RequestConfig};
use crate::types::{MetadataItem, Stage};
use async_trait::async_trait;
use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use url::Url;

const TOKEN_HEADER: &str = "X-StorageApi-Token";

// ============================================================================
// Configuration
// ============================================================================

/// Connection settings for [`StorageClient`]
#[derive(Debug, Clone)]
pub struct StorageClientConfig {
    /// Stack URL, e.g. `https://connection.keboola.com`
    pub url: String,
    pub token: String,
    /// Development branch to address
    pub branch_id: Option<String>,
    pub http: HttpClientConfig,
    pub poll: PollConfig,
}

impl StorageClientConfig {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            branch_id: None,
            http: HttpClientConfig::default(),
            poll: PollConfig::default(),
        }
    }

    /// Read `STORAGE_API_URL`, `STORAGE_API_TOKEN` and optional `STORAGE_API_BRANCH_ID`
    pub fn from_env() -> Result<Self> {
        let url = required_env("STORAGE_API_URL")?;
        let token = required_env("STORAGE_API_TOKEN")?;
        let mut config = Self::new(url, token);
        config.branch_id = std::env::var("STORAGE_API_BRANCH_ID")
            .ok()
            .filter(|id| !id.is_empty());
        Ok(config)
    }

    #[must_use]
    pub fn with_branch(mut self, branch_id: impl Into<String>) -> Self {
        self.branch_id = Some(branch_id.into());
        self
    }

    #[must_use]
    pub fn with_http(mut self, http: HttpClientConfig) -> Self {
        self.http = http;
        self
    }

    #[must_use]
    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }
}

fn required_env(name: &str) -> Result<String> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::config(format!("Environment variable {name} must be set")))
}

// ============================================================================
// Response Shapes
// ============================================================================

#[derive(Debug, Deserialize)]
struct IdResponse {
    #[serde(deserialize_with = "string_or_number")]
    id: String,
}

#[derive(Debug, Deserialize)]
struct RawJob {
    #[serde(deserialize_with = "string_or_number")]
    id: String,
    status: JobStatus,
    #[serde(default)]
    error: Option<RawJobError>,
    #[serde(default)]
    results: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawJobError {
    #[serde(default)]
    message: String,
}

impl From<RawJob> for JobInfo {
    fn from(raw: RawJob) -> Self {
        Self {
            id: raw.id,
            status: raw.status,
            error: raw.error.map(|e| e.message),
            results: raw.results,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PreparedFile {
    #[serde(deserialize_with = "string_or_number")]
    id: String,
    upload_params: UploadParams,
}

#[derive(Debug, Deserialize)]
struct UploadParams {
    /// Signed URL; for sliced files the prefix slices and the manifest go under
    url: String,
}

// ============================================================================
// Client
// ============================================================================

/// Storage API client
#[derive(Debug, Clone)]
pub struct StorageClient {
    http: HttpClient,
    prefix: String,
    poll: PollConfig,
}

impl StorageClient {
    pub fn new(config: StorageClientConfig) -> Result<Self> {
        Url::parse(&config.url)?;

        let mut http = config.http;
        http.base_url = Some(config.url);
        http.default_headers.insert(TOKEN_HEADER.to_string(), config.token);

        let prefix = match config.branch_id {
            Some(id) => format!("/v2/storage/branch/{id}"),
            None => "/v2/storage".to_string(),
        };

        Ok(Self {
            http: HttpClient::with_config(http)?,
            prefix,
            poll: config.poll,
        })
    }

    fn path(&self, rest: &str) -> String {
        format!("{}/{}", self.prefix, rest)
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        match self
            .http
            .request(Method::GET, path, RequestConfig::new())
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Run a request that answers with a job and wait for it
    async fn run_job(&self, method: Method, path: &str, config: RequestConfig) -> Result<JobInfo> {
        let job: IdResponse = self.http.request_json(method, path, config).await?;
        wait_for_job_success(self, &job.id, &self.poll).await
    }

    async fn post_metadata(&self, path: &str, provider: &str, items: &[MetadataItem]) -> Result<()> {
        self.http
            .request(
                Method::POST,
                path,
                RequestConfig::new().json(json!({
                    "provider": provider,
                    "metadata": items,
                })),
            )
            .await?;
        Ok(())
    }

    async fn prepare_file(&self, name: &str, size: u64, is_sliced: bool) -> Result<PreparedFile> {
        self.http
            .post_json(
                &self.path("files/prepare"),
                json!({
                    "name": name,
                    "sizeBytes": size,
                    "isSliced": is_sliced,
                }),
            )
            .await
    }

    async fn put_object(&self, url: &str, body: Bytes) -> Result<()> {
        self.http
            .request(
                Method::PUT,
                url,
                RequestConfig::new().bytes(body).without_default_headers(),
            )
            .await?;
        Ok(())
    }

    async fn upload_bytes(&self, name: &str, body: Bytes) -> Result<String> {
        let prepared = self.prepare_file(name, body.len() as u64, false).await?;
        self.put_object(&prepared.upload_params.url, body).await?;
        Ok(prepared.id)
    }
}

#[async_trait]
impl MetadataApi for StorageClient {
    async fn list_bucket_metadata(&self, bucket_id: &str) -> Result<Vec<MetadataEntry>> {
        self.http
            .get_json(&self.path(&format!("buckets/{bucket_id}/metadata")))
            .await
    }

    async fn list_table_metadata(&self, table_id: &str) -> Result<Vec<MetadataEntry>> {
        self.http
            .get_json(&self.path(&format!("tables/{table_id}/metadata")))
            .await
    }

    async fn post_bucket_metadata(
        &self,
        bucket_id: &str,
        provider: &str,
        items: &[MetadataItem],
    ) -> Result<()> {
        self.post_metadata(&self.path(&format!("buckets/{bucket_id}/metadata")), provider, items)
            .await
    }

    async fn post_table_metadata(
        &self,
        table_id: &str,
        provider: &str,
        items: &[MetadataItem],
    ) -> Result<()> {
        self.post_metadata(&self.path(&format!("tables/{table_id}/metadata")), provider, items)
            .await
    }

    async fn post_column_metadata(
        &self,
        column_id: &str,
        provider: &str,
        items: &[MetadataItem],
    ) -> Result<()> {
        self.post_metadata(&self.path(&format!("columns/{column_id}/metadata")), provider, items)
            .await
    }
}

#[async_trait]
impl StorageApi for StorageClient {
    async fn bucket_exists(&self, bucket_id: &str) -> Result<bool> {
        self.exists(&self.path(&format!("buckets/{bucket_id}")))
            .await
    }

    async fn create_bucket(&self, name: &str, stage: Stage) -> Result<String> {
        info!(bucket = name, %stage, "Creating bucket");
        let created: IdResponse = self
            .http
            .post_json(
                &self.path("buckets"),
                json!({"name": name, "stage": stage.as_str()}),
            )
            .await?;
        Ok(created.id)
    }

    async fn table_exists(&self, table_id: &str) -> Result<bool> {
        self.exists(&self.path(&format!("tables/{table_id}")))
            .await
    }

    async fn get_table(&self, table_id: &str) -> Result<TableInfo> {
        self.http
            .get_json(&self.path(&format!("tables/{table_id}")))
            .await
    }

    async fn create_table_async(
        &self,
        bucket_id: &str,
        name: &str,
        options: &CreateTableOptions,
    ) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&options.columns)?;
        let header = writer.into_inner().map_err(|e| Error::Io(e.into_error()))?;
        let file_id = self
            .upload_bytes(&format!("{name}.header.csv"), Bytes::from(header))
            .await?;

        let mut body = json!({
            "name": name,
            "dataFileId": file_id,
            "primaryKey": options.primary_key.join(","),
        });
        if !options.distribution_key.is_empty() {
            body["distributionKey"] = json!(options.distribution_key.join(","));
        }

        info!(bucket = bucket_id, table = name, "Creating table");
        let job = self
            .run_job(
                Method::POST,
                &self.path(&format!("buckets/{bucket_id}/tables-async")),
                RequestConfig::new().json(body),
            )
            .await?;

        Ok(job
            .results
            .as_ref()
            .and_then(|r| r.get("id"))
            .and_then(Value::as_str)
            .map_or_else(|| format!("{bucket_id}.{name}"), String::from))
    }

    async fn delete_table_rows(&self, table_id: &str, options: &DeleteRowsOptions) -> Result<()> {
        let mut request = RequestConfig::new()
            .query("whereColumn", &options.where_column)
            .query("whereOperator", options.where_operator.as_str());
        for value in &options.where_values {
            request = request.query("whereValues[]", value);
        }
        debug!(table = table_id, column = %options.where_column, "Deleting rows");
        self.run_job(
            Method::DELETE,
            &self.path(&format!("tables/{table_id}/rows")),
            request,
        )
        .await?;
        Ok(())
    }

    async fn remove_table_primary_key(&self, table_id: &str) -> Result<()> {
        self.run_job(
            Method::DELETE,
            &self.path(&format!("tables/{table_id}/primary-key")),
            RequestConfig::new(),
        )
        .await?;
        Ok(())
    }

    async fn create_table_primary_key(&self, table_id: &str, columns: &[String]) -> Result<()> {
        self.run_job(
            Method::POST,
            &self.path(&format!("tables/{table_id}/primary-key")),
            RequestConfig::new().json(json!({ "columns": columns })),
        )
        .await?;
        Ok(())
    }

    async fn upload_file(&self, path: &Path, options: &FileUploadOptions) -> Result<String> {
        let name = upload_name(path, options.file_name.as_deref(), options.compress);
        let body = read_payload(path, options.compress).await?;
        debug!(file = %path.display(), name = %name, "Uploading file");
        self.upload_bytes(&name, body).await
    }

    async fn upload_sliced_file(
        &self,
        slices: &[PathBuf],
        options: &FileUploadOptions,
    ) -> Result<String> {
        let name = options
            .file_name
            .clone()
            .unwrap_or_else(|| "sliced".to_string());

        let mut size = 0;
        for slice in slices {
            size += tokio::fs::metadata(slice).await?.len();
        }
        let prepared = self.prepare_file(&name, size, true).await?;

        let mut entries = Vec::with_capacity(slices.len());
        for slice in slices {
            let slice_name = upload_name(slice, None, options.compress);
            let url = child_url(&prepared.upload_params.url, &slice_name)?;
            let body = read_payload(slice, options.compress).await?;
            self.put_object(&url, body).await?;
            entries.push(json!({ "url": without_query(&url)? }));
        }

        let manifest = serde_json::to_vec(&json!({ "entries": entries }))?;
        let manifest_url = child_url(&prepared.upload_params.url, "manifest")?;
        self.put_object(&manifest_url, Bytes::from(manifest)).await?;

        info!(file_id = %prepared.id, slices = slices.len(), "Uploaded sliced file");
        Ok(prepared.id)
    }

    async fn queue_table_import(&self, table_id: &str, request: &ImportRequest) -> Result<String> {
        let mut body = serde_json::to_value(&request.data)?;
        body["delimiter"] = json!(request.delimiter);
        body["enclosure"] = json!(request.enclosure);
        body["incremental"] = json!(request.incremental);
        if !request.columns.is_empty() {
            body["columns"] = json!(request.columns);
            body["withoutHeaders"] = json!(true);
        }

        let job: IdResponse = self
            .http
            .post_json(&self.path(&format!("tables/{table_id}/import-async")), body)
            .await?;
        debug!(table = table_id, job_id = %job.id, "Import job queued");
        Ok(job.id)
    }

    async fn get_job(&self, job_id: &str) -> Result<JobInfo> {
        let raw: RawJob = self
            .http
            .get_json(&format!("/v2/storage/jobs/{job_id}"))
            .await?;
        Ok(raw.into())
    }
}

// ============================================================================
// Upload Helpers
// ============================================================================

fn upload_name(path: &Path, name: Option<&str>, compress: bool) -> String {
    let base = name.map(String::from).unwrap_or_else(|| {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    });
    if compress {
        format!("{base}.gz")
    } else {
        base
    }
}

async fn read_payload(path: &Path, compress: bool) -> Result<Bytes> {
    let data = tokio::fs::read(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::FileNotFound {
                path: path.display().to_string(),
            }
        } else {
            Error::Io(e)
        }
    })?;
    if !compress {
        return Ok(Bytes::from(data));
    }
    let compressed = tokio::task::spawn_blocking(move || gzip(&data))
        .await
        .map_err(|e| Error::Other(format!("Compression task failed: {e}")))??;
    Ok(Bytes::from(compressed))
}

pub(crate) fn gzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Append `name` to the path of a signed URL, keeping its query
fn child_url(base: &str, name: &str) -> Result<String> {
    let mut url = Url::parse(base)?;
    let path = format!("{}{}", url.path(), name);
    url.set_path(&path);
    Ok(url.to_string())
}

fn without_query(url: &str) -> Result<String> {
    let mut url = Url::parse(url)?;
    url.set_query(None);
    Ok(url.to_string())
}
