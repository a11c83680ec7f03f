//! Staging module
//!
//! Output data is staged either on the local disk or in a remote workspace.
//! [`StagingStrategy`] dispatches over [`StagingKind`] to produce the data
//! reference an import job reads from.

mod strategy;
mod types;

pub use strategy::{StagingKind, StagingStrategy};
pub use types::{LoadOptions, SourceObject, StagingMode, WorkspaceBackend};
