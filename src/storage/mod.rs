//! Storage backend module
//!
//! Everything the writer needs from the storage platform:
//!
//! - [`StorageApi`] / [`MetadataApi`]: backend operations and metadata annotation
//! - [`BackendSession`]: client handle plus the optional development branch
//! - [`StorageClient`]: REST implementation over the Storage API v2
//! - [`InMemoryStorage`]: in-process implementation with failure injection
//! - [`BlobLister`]: container listing for ABS workspaces
//! - [`wait_for_job`]: job polling with backoff

mod api;
mod blob;
mod client;
mod job;
mod memory;
mod session;

pub use api::{
    CreateTableOptions, DataReference, DeleteRowsOptions, FileUploadOptions, ImportRequest,
    JobInfo, JobStatus, MetadataApi, MetadataEntry, StorageApi, TableInfo,
};
pub use blob::{AbsCredentials, BlobLister, ObjectStoreBlobLister};
pub use client::{StorageClient, StorageClientConfig};
pub use job::{wait_for_job, wait_for_job_success, PollConfig};
pub use memory::InMemoryStorage;
pub use session::{BackendSession, BranchContext};

#[cfg(test)]
mod tests;
