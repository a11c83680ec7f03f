//! Upload/stage adapter
//!
//! Turns a source object into something an import job can read: an uploaded
//! file id for local staging, or a workspace object reference.

use super::types::{LoadOptions, SourceObject, StagingMode, WorkspaceBackend};
use crate::error::{Error, Result, ResultExt};
use crate::storage::{BlobLister, DataReference, FileUploadOptions, ImportRequest, StorageApi};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Where output data is staged
#[derive(Clone)]
pub enum StagingKind {
    /// Files on the local disk
    Local,
    /// Tables in a warehouse workspace
    Workspace {
        workspace_id: String,
        backend: WorkspaceBackend,
    },
    /// Blobs in an Azure Blob Storage workspace
    WorkspaceAbs {
        workspace_id: String,
        container: String,
        blobs: Arc<dyn BlobLister>,
    },
}

impl StagingKind {
    pub fn mode(&self) -> StagingMode {
        match self {
            StagingKind::Local => StagingMode::Local,
            StagingKind::Workspace { backend, .. } => StagingMode::Workspace(*backend),
            StagingKind::WorkspaceAbs { .. } => StagingMode::WorkspaceAbs,
        }
    }
}

impl fmt::Debug for StagingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StagingKind::Local => f.write_str("Local"),
            StagingKind::Workspace {
                workspace_id,
                backend,
            } => f
                .debug_struct("Workspace")
                .field("workspace_id", workspace_id)
                .field("backend", backend)
                .finish(),
            StagingKind::WorkspaceAbs {
                workspace_id,
                container,
                ..
            } => f
                .debug_struct("WorkspaceAbs")
                .field("workspace_id", workspace_id)
                .field("container", container)
                .finish_non_exhaustive(),
        }
    }
}

/// Staging strategy: the staging kind plus where data and manifests live
#[derive(Debug, Clone)]
pub struct StagingStrategy {
    kind: StagingKind,
    data_root: PathBuf,
    metadata_root: PathBuf,
}

impl StagingStrategy {
    pub fn new(kind: StagingKind, data_root: impl Into<PathBuf>, metadata_root: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            data_root: data_root.into(),
            metadata_root: metadata_root.into(),
        }
    }

    /// Local staging with data and manifests in the same directory tree
    pub fn local(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self::new(StagingKind::Local, root.clone(), root)
    }

    /// Generic workspace staging; manifests are read from `metadata_root`
    pub fn workspace(
        workspace_id: impl Into<String>,
        backend: WorkspaceBackend,
        metadata_root: impl Into<PathBuf>,
    ) -> Self {
        let metadata_root = metadata_root.into();
        Self::new(
            StagingKind::Workspace {
                workspace_id: workspace_id.into(),
                backend,
            },
            metadata_root.clone(),
            metadata_root,
        )
    }

    /// ABS workspace staging
    pub fn workspace_abs(
        workspace_id: impl Into<String>,
        container: impl Into<String>,
        blobs: Arc<dyn BlobLister>,
        metadata_root: impl Into<PathBuf>,
    ) -> Self {
        let metadata_root = metadata_root.into();
        Self::new(
            StagingKind::WorkspaceAbs {
                workspace_id: workspace_id.into(),
                container: container.into(),
                blobs,
            },
            metadata_root.clone(),
            metadata_root,
        )
    }

    pub fn kind(&self) -> &StagingKind {
        &self.kind
    }

    pub fn mode(&self) -> StagingMode {
        self.kind.mode()
    }

    pub fn is_local(&self) -> bool {
        matches!(self.kind, StagingKind::Local)
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    pub fn metadata_root(&self) -> &Path {
        &self.metadata_root
    }

    /// Stage one source object and return the reference an import reads from
    ///
    /// `source_dir` is the output directory the sources were discovered in.
    pub async fn materialize(
        &self,
        api: &dyn StorageApi,
        source_dir: &str,
        source: &SourceObject,
    ) -> Result<DataReference> {
        match (&self.kind, source) {
            (StagingKind::Local, SourceObject::File { path, .. }) => {
                let options = FileUploadOptions {
                    compress: true,
                    ..FileUploadOptions::default()
                };
                let data_file_id = api.upload_file(path, &options).await?;
                Ok(DataReference::File { data_file_id })
            }
            (StagingKind::Local, SourceObject::Sliced { name, path }) => {
                let slices = list_slices(path)?;
                let options = FileUploadOptions {
                    compress: true,
                    is_sliced: true,
                    file_name: Some(name.clone()),
                };
                let data_file_id = api.upload_sliced_file(&slices, &options).await?;
                Ok(DataReference::File { data_file_id })
            }
            (StagingKind::Local, SourceObject::Workspace { name }) => Err(Error::output_operation(
                format!("Source \"{name}\" is not a local file"),
            )),
            (StagingKind::Workspace { workspace_id, .. }, source) => Ok(DataReference::Workspace {
                data_workspace_id: workspace_id.clone(),
                data_object: source.name().to_string(),
            }),
            (
                StagingKind::WorkspaceAbs {
                    workspace_id,
                    container,
                    blobs,
                },
                source,
            ) => {
                let data_object =
                    abs_object_path(blobs.as_ref(), container, source_dir, source.name()).await?;
                Ok(DataReference::Workspace {
                    data_workspace_id: workspace_id.clone(),
                    data_object,
                })
            }
        }
    }

    /// Stage a source and build the import request for it
    pub async fn build_import(
        &self,
        api: &dyn StorageApi,
        source_dir: &str,
        source: &SourceObject,
        options: LoadOptions,
    ) -> Result<ImportRequest> {
        let data = self.materialize(api, source_dir, source).await?;
        Ok(ImportRequest {
            data,
            delimiter: options.delimiter,
            enclosure: options.enclosure,
            columns: options.columns,
            incremental: options.incremental,
        })
    }
}

/// Files directly inside a slice directory, sorted by name
pub(crate) fn list_slices(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut slices = Vec::new();
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("Failed to list slices in {}", dir.display()))?
    {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            slices.push(entry.path());
        }
    }
    slices.sort();
    Ok(slices)
}

/// Blob path of an object; a trailing `/` marks it as sliced
async fn abs_object_path(
    blobs: &dyn BlobLister,
    container: &str,
    source_dir: &str,
    name: &str,
) -> Result<String> {
    let mut path = format!("{}/{}", source_dir.trim_end_matches(['/', '\\']), name);
    let listed = blobs
        .list_blobs(container, &path)
        .await
        .map_err(|e| Error::invalid_output(format!("Failed to list blobs {e}")))?;

    let directory = format!("{path}/");
    if listed.iter().any(|blob| blob.starts_with(&directory)) {
        debug!(path = %path, "Blob object is sliced");
        path.push('/');
    }
    Ok(path)
}
