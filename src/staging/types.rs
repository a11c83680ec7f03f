//! Staging types

use crate::error::{Error, Result};
use std::fmt;
use std::path::PathBuf;

/// Warehouse behind a generic workspace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceBackend {
    Snowflake,
    Redshift,
    Synapse,
}

/// Staging mode as named in job configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagingMode {
    Local,
    Workspace(WorkspaceBackend),
    WorkspaceAbs,
}

impl StagingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StagingMode::Local => "local",
            StagingMode::Workspace(WorkspaceBackend::Snowflake) => "workspace-snowflake",
            StagingMode::Workspace(WorkspaceBackend::Redshift) => "workspace-redshift",
            StagingMode::Workspace(WorkspaceBackend::Synapse) => "workspace-synapse",
            StagingMode::WorkspaceAbs => "workspace-abs",
        }
    }
}

impl fmt::Display for StagingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StagingMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "local" => Ok(StagingMode::Local),
            "workspace-snowflake" => Ok(StagingMode::Workspace(WorkspaceBackend::Snowflake)),
            "workspace-redshift" => Ok(StagingMode::Workspace(WorkspaceBackend::Redshift)),
            "workspace-synapse" => Ok(StagingMode::Workspace(WorkspaceBackend::Synapse)),
            "workspace-abs" => Ok(StagingMode::WorkspaceAbs),
            other => Err(Error::config(format!(
                "Staging storage \"{other}\" is not supported for table output"
            ))),
        }
    }
}

/// A physical data object to load
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceObject {
    /// Single local CSV file
    File { name: String, path: PathBuf },
    /// Local directory of headerless slices
    Sliced { name: String, path: PathBuf },
    /// Object in a remote workspace
    Workspace { name: String },
}

impl SourceObject {
    pub fn name(&self) -> &str {
        match self {
            SourceObject::File { name, .. }
            | SourceObject::Sliced { name, .. }
            | SourceObject::Workspace { name } => name,
        }
    }

    pub fn is_sliced(&self) -> bool {
        matches!(self, SourceObject::Sliced { .. })
    }

    /// Local path, if the object lives on disk
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            SourceObject::File { path, .. } | SourceObject::Sliced { path, .. } => Some(path),
            SourceObject::Workspace { .. } => None,
        }
    }
}

/// How the backend should parse the loaded data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOptions {
    pub delimiter: String,
    pub enclosure: String,
    /// Declared columns, empty when the data carries its header
    pub columns: Vec<String>,
    pub incremental: bool,
}
