//! Load task types

use crate::error::{Error, Result};
use crate::mapping::ColumnMetadata;
use crate::storage::{ImportRequest, StorageApi};
use crate::types::MetadataItem;
use chrono::{DateTime, Utc};
use std::fmt;

// ============================================================================
// Metadata Continuations
// ============================================================================

/// Metadata write to run once a load job has succeeded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataDefinition {
    /// Items posted on the table itself
    Table {
        table_id: String,
        provider: String,
        items: Vec<MetadataItem>,
    },
    /// Items posted per column, on `{table_id}.{column}`
    Columns {
        table_id: String,
        provider: String,
        columns: ColumnMetadata,
    },
}

impl MetadataDefinition {
    pub fn table(
        table_id: impl Into<String>,
        provider: impl Into<String>,
        items: Vec<MetadataItem>,
    ) -> Self {
        MetadataDefinition::Table {
            table_id: table_id.into(),
            provider: provider.into(),
            items,
        }
    }

    pub fn columns(
        table_id: impl Into<String>,
        provider: impl Into<String>,
        columns: ColumnMetadata,
    ) -> Self {
        MetadataDefinition::Columns {
            table_id: table_id.into(),
            provider: provider.into(),
            columns,
        }
    }

    pub fn provider(&self) -> &str {
        match self {
            MetadataDefinition::Table { provider, .. }
            | MetadataDefinition::Columns { provider, .. } => provider,
        }
    }

    /// Post the metadata; empty item lists are skipped
    pub async fn apply(&self, api: &dyn StorageApi) -> Result<()> {
        match self {
            MetadataDefinition::Table {
                table_id,
                provider,
                items,
            } => {
                if !items.is_empty() {
                    api.post_table_metadata(table_id, provider, items).await?;
                }
            }
            MetadataDefinition::Columns {
                table_id,
                provider,
                columns,
            } => {
                for (column, items) in columns {
                    if items.is_empty() {
                        continue;
                    }
                    let column_id = format!("{table_id}.{column}");
                    api.post_column_metadata(&column_id, provider, items).await?;
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// Load Table Task
// ============================================================================

/// Lifecycle of a load task
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TaskState {
    #[default]
    Pending,
    Submitted { job_id: String },
    Succeeded { job_id: String },
    /// `code` keeps the backend status of the failure, when there was one
    Failed { message: String, code: Option<u16> },
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Succeeded { .. } | TaskState::Failed { .. })
    }

    pub fn job_id(&self) -> Option<&str> {
        match self {
            TaskState::Submitted { job_id } | TaskState::Succeeded { job_id } => Some(job_id),
            _ => None,
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Pending => f.write_str("pending"),
            TaskState::Submitted { job_id } => write!(f, "submitted ({job_id})"),
            TaskState::Succeeded { job_id } => write!(f, "succeeded ({job_id})"),
            TaskState::Failed { message, .. } => write!(f, "failed: {message}"),
        }
    }
}

/// Deferred load of one table
#[derive(Debug, Clone)]
pub struct LoadTableTask {
    table_id: String,
    request: ImportRequest,
    continuations: Vec<MetadataDefinition>,
    pub(super) state: TaskState,
    pub(super) submitted_at: Option<DateTime<Utc>>,
    pub(super) finished_at: Option<DateTime<Utc>>,
    /// Job id kept after a failure, for inspection
    pub(super) job_id: Option<String>,
}

impl LoadTableTask {
    pub fn new(table_id: impl Into<String>, request: ImportRequest) -> Self {
        Self {
            table_id: table_id.into(),
            request,
            continuations: Vec::new(),
            state: TaskState::Pending,
            submitted_at: None,
            finished_at: None,
            job_id: None,
        }
    }

    /// Register a metadata write to run after the load succeeds
    pub fn add_metadata(&mut self, definition: MetadataDefinition) {
        self.continuations.push(definition);
    }

    pub fn table_id(&self) -> &str {
        &self.table_id
    }

    pub fn request(&self) -> &ImportRequest {
        &self.request
    }

    pub fn continuations(&self) -> &[MetadataDefinition] {
        &self.continuations
    }

    pub fn state(&self) -> &TaskState {
        &self.state
    }

    /// Backend job id, once submitted
    pub fn job_id(&self) -> Option<&str> {
        self.job_id.as_deref()
    }

    pub fn submitted_at(&self) -> Option<DateTime<Utc>> {
        self.submitted_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub(super) fn mark_submitted(&mut self, job_id: String) {
        self.job_id = Some(job_id.clone());
        self.state = TaskState::Submitted { job_id };
        self.submitted_at = Some(Utc::now());
    }

    pub(super) fn mark_succeeded(&mut self, job_id: String) {
        self.state = TaskState::Succeeded { job_id };
        self.finished_at = Some(Utc::now());
    }

    pub(super) fn mark_failed(&mut self, error: &Error) {
        self.state = TaskState::Failed {
            message: error.to_string(),
            code: error.status(),
        };
        self.finished_at = Some(Utc::now());
    }
}
