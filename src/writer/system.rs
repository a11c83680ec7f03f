//! System provenance metadata

use crate::error::{Error, Result};
use crate::types::MetadataItem;
use serde::Deserialize;

/// Provider name of system-stamped metadata
pub const SYSTEM_PROVIDER: &str = "system";

pub const CREATED_BY_COMPONENT_ID: &str = "KBC.createdBy.component.id";
pub const CREATED_BY_CONFIGURATION_ID: &str = "KBC.createdBy.configuration.id";
pub const CREATED_BY_CONFIGURATION_ROW_ID: &str = "KBC.createdBy.configurationRow.id";
pub const CREATED_BY_BRANCH_ID: &str = "KBC.createdBy.branch.id";
pub const LAST_UPDATED_BY_COMPONENT_ID: &str = "KBC.lastUpdatedBy.component.id";
pub const LAST_UPDATED_BY_CONFIGURATION_ID: &str = "KBC.lastUpdatedBy.configuration.id";
pub const LAST_UPDATED_BY_CONFIGURATION_ROW_ID: &str = "KBC.lastUpdatedBy.configurationRow.id";
pub const LAST_UPDATED_BY_BRANCH_ID: &str = "KBC.lastUpdatedBy.branch.id";

/// Facts about the job writing the output
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMetadata {
    #[serde(default)]
    pub component_id: String,
    #[serde(default)]
    pub configuration_id: Option<String>,
    #[serde(default)]
    pub configuration_row_id: Option<String>,
    #[serde(default)]
    pub branch_id: Option<String>,
}

impl SystemMetadata {
    pub fn new(component_id: impl Into<String>) -> Self {
        Self {
            component_id: component_id.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_configuration_id(mut self, id: impl Into<String>) -> Self {
        self.configuration_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_configuration_row_id(mut self, id: impl Into<String>) -> Self {
        self.configuration_row_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_branch_id(mut self, id: impl Into<String>) -> Self {
        self.branch_id = Some(id.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.component_id.is_empty() {
            return Err(Error::output_operation("Component Id must be set"));
        }
        Ok(())
    }

    /// `KBC.createdBy.*` items
    pub fn created_metadata(&self) -> Vec<MetadataItem> {
        self.items([
            CREATED_BY_COMPONENT_ID,
            CREATED_BY_CONFIGURATION_ID,
            CREATED_BY_CONFIGURATION_ROW_ID,
            CREATED_BY_BRANCH_ID,
        ])
    }

    /// `KBC.lastUpdatedBy.*` items
    pub fn updated_metadata(&self) -> Vec<MetadataItem> {
        self.items([
            LAST_UPDATED_BY_COMPONENT_ID,
            LAST_UPDATED_BY_CONFIGURATION_ID,
            LAST_UPDATED_BY_CONFIGURATION_ROW_ID,
            LAST_UPDATED_BY_BRANCH_ID,
        ])
    }

    // keys in order: component, configuration, configuration row, branch
    fn items(&self, keys: [&str; 4]) -> Vec<MetadataItem> {
        let values = [
            Some(self.component_id.as_str()),
            self.configuration_id.as_deref(),
            self.configuration_row_id.as_deref(),
            self.branch_id.as_deref(),
        ];
        keys.into_iter()
            .zip(values)
            .filter_map(|(key, value)| match value {
                Some(value) if !value.is_empty() => Some(MetadataItem::new(key, value)),
                _ => None,
            })
            .collect()
    }
}
