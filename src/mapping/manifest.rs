//! Manifest format adapter
//!
//! Table manifests are sidecar files named `{source}.manifest`, serialized as
//! JSON or YAML.

use super::types::TableConfig;
use crate::error::{Error, Result};
use std::path::Path;

/// Suffix identifying manifest files
pub const MANIFEST_SUFFIX: &str = ".manifest";

/// Serialization format of manifest files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ManifestFormat {
    #[default]
    Json,
    Yaml,
}

impl ManifestFormat {
    pub fn deserialize(&self, content: &str) -> Result<TableConfig> {
        Ok(match self {
            ManifestFormat::Json => serde_json::from_str(content)?,
            ManifestFormat::Yaml => serde_yaml::from_str(content)?,
        })
    }

    pub fn serialize(&self, config: &TableConfig) -> Result<String> {
        Ok(match self {
            ManifestFormat::Json => serde_json::to_string_pretty(config)?,
            ManifestFormat::Yaml => serde_yaml::to_string(config)?,
        })
    }
}

impl std::str::FromStr for ManifestFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "json" => Ok(ManifestFormat::Json),
            "yaml" | "yml" => Ok(ManifestFormat::Yaml),
            other => Err(Error::config(format!("Unknown manifest format '{other}'"))),
        }
    }
}

/// Source name implied by a manifest file name
pub fn manifest_source_name(file_name: &str) -> Option<&str> {
    file_name.strip_suffix(MANIFEST_SUFFIX)
}

/// Read and deserialize a table manifest
pub fn read_table_manifest(path: &Path, format: ManifestFormat) -> Result<TableConfig> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let content = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::invalid_output(format!("File '{}' not found.", path.display()))
        } else {
            Error::invalid_output(format!(
                "Failed to read table manifest from file {file_name} {e}"
            ))
        }
    })?;

    format.deserialize(&content).map_err(|e| {
        Error::invalid_output(format!(
            "Failed to read table manifest from file {file_name} {e}"
        ))
    })
}
