// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::needless_pass_by_value)]

//! # Output Mapping
//!
//! Loads the tables a data-processing job leaves in its output directory into
//! storage, following a declarative output mapping.
//!
//! ## Features
//!
//! - **Reconciliation**: pairs data files with mapping entries and `.manifest` sidecars
//! - **Config Merging**: mapping entries override manifests field by field
//! - **Table Setup**: creates buckets and tables, adjusts primary keys, deletes rows
//! - **Staging**: local files (single or sliced) and workspace objects (incl. ABS)
//! - **Load Queue**: ordered asynchronous import jobs with post-load metadata
//! - **Branches**: destinations rewritten into development-branch buckets
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use output_mapping::{
//!     BackendSession, OutputConfig, StagingStrategy, StorageClient, StorageClientConfig,
//!     SystemMetadata, TableWriter,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> output_mapping::Result<()> {
//!     let client = StorageClient::new(StorageClientConfig::from_env()?)?;
//!     let writer = TableWriter::new(BackendSession::new(Arc::new(client)));
//!
//!     let config = OutputConfig::from_file("config.json")?;
//!     let system = SystemMetadata::new("keboola.ex-db").with_configuration_id("123");
//!     let strategy = StagingStrategy::local("/data/out");
//!
//!     let mut queue = writer.upload_tables("tables", &config, &system, &strategy).await?;
//!     let job_ids = queue.wait_for_all().await?;
//!     println!("loaded {} tables", job_ids.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         TableWriter                             │
//! │  upload_tables(source, config, system, strategy) → LoadQueue    │
//! └─────────────────────────────────────────────────────────────────┘
//!                                │
//! ┌───────────┬──────────┬───────┴───────┬───────────┬─────────────┐
//! │ Reconcile │ Mapping  │   Uploader    │  Staging  │    Queue    │
//! ├───────────┼──────────┼───────────────┼───────────┼─────────────┤
//! │ Sources   │ Merge    │ Buckets       │ Local     │ Submit      │
//! │ Manifests │ Resolve  │ Tables        │ Sliced    │ Poll        │
//! │ Fan-out   │ Rewrite  │ Primary key   │ Workspace │ Metadata    │
//! │           │ Validate │ Delete rows   │ ABS       │             │
//! └───────────┴──────────┴───────────────┴───────────┴─────────────┘
//!                                │
//!                   StorageApi (REST client / in-memory)
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types
pub mod error;

/// Common types and type aliases
pub mod types;

/// HTTP client with retry and rate limiting
pub mod http;

/// Storage backend contracts and clients
pub mod storage;

/// Mapping configuration, merging and destinations
pub mod mapping;

/// Data staging for imports
pub mod staging;

/// Deferred table loads
pub mod queue;

/// Reconciliation and table setup
pub mod writer;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, Result};
pub use types::*;

pub use mapping::{ManifestFormat, MappingEntry, OutputConfig, TableConfig, TableManifest};
pub use queue::{LoadTableQueue, LoadTableTask, MetadataDefinition, TaskState};
pub use staging::{SourceObject, StagingKind, StagingMode, StagingStrategy, WorkspaceBackend};
pub use storage::{
    BackendSession, BranchContext, InMemoryStorage, ObjectStoreBlobLister, PollConfig,
    StorageApi, StorageClient, StorageClientConfig,
};
pub use writer::{SystemMetadata, TableWriter};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
