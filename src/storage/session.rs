//! Backend session
//!
//! Explicit handle passed to every component that talks to storage: the
//! backend client plus the development branch the run is scoped to, if any.

use super::api::StorageApi;
use std::fmt;
use std::sync::Arc;

/// Development branch the session writes into
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchContext {
    pub id: String,
    pub name: String,
}

impl BranchContext {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Immutable storage session
#[derive(Clone)]
pub struct BackendSession {
    api: Arc<dyn StorageApi>,
    branch: Option<BranchContext>,
}

impl BackendSession {
    /// Session on the default branch
    pub fn new(api: Arc<dyn StorageApi>) -> Self {
        Self { api, branch: None }
    }

    /// Session scoped to a development branch
    pub fn with_branch(api: Arc<dyn StorageApi>, branch: BranchContext) -> Self {
        Self {
            api,
            branch: Some(branch),
        }
    }

    pub fn api(&self) -> &Arc<dyn StorageApi> {
        &self.api
    }

    pub fn branch(&self) -> Option<&BranchContext> {
        self.branch.as_ref()
    }

    pub fn branch_id(&self) -> Option<&str> {
        self.branch.as_ref().map(|b| b.id.as_str())
    }

    pub fn has_branch(&self) -> bool {
        self.branch.is_some()
    }
}

impl fmt::Debug for BackendSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendSession")
            .field("branch", &self.branch)
            .finish_non_exhaustive()
    }
}
