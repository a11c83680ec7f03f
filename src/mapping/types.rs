//! Mapping types
//!
//! Declarative table output configuration: the raw per-source [`TableConfig`]
//! shared by mapping entries and manifests, the job-level [`OutputConfig`], and
//! the validated [`TableManifest`] every load is planned from.

use crate::error::{Error, Result};
use crate::types::{DeleteWhereOperator, MetadataItem};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// Column name → metadata items
pub type ColumnMetadata = BTreeMap<String, Vec<MetadataItem>>;

// ============================================================================
// Table Config
// ============================================================================

/// Table configuration as declared in a mapping entry or a manifest
///
/// Every field is optional; an absent field lets the other side of a merge, or
/// the defaults, decide.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableConfig {
    /// Fully-qualified destination `stage.bucket.table`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distribution_key: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incremental: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_where_column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_where_operator: Option<DeleteWhereOperator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_where_values: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enclosure: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Vec<MetadataItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_metadata: Option<ColumnMetadata>,
}

impl TableConfig {
    #[must_use]
    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    #[must_use]
    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn with_primary_key<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn with_incremental(mut self, incremental: bool) -> Self {
        self.incremental = Some(incremental);
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, items: Vec<MetadataItem>) -> Self {
        self.metadata = Some(items);
        self
    }

    /// Whether a non-empty destination is declared
    pub fn has_destination(&self) -> bool {
        self.destination.as_deref().is_some_and(|d| !d.is_empty())
    }
}

// ============================================================================
// Mapping Entry
// ============================================================================

/// One declared output mapping: a source name and its table configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MappingEntry {
    pub source: String,
    #[serde(flatten)]
    pub config: TableConfig,
}

impl MappingEntry {
    pub fn new(source: impl Into<String>, config: TableConfig) -> Self {
        Self {
            source: source.into(),
            config,
        }
    }
}

impl<'de> Deserialize<'de> for MappingEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let mut map = serde_json::Map::<String, Value>::deserialize(deserializer)?;
        let source = match map.remove("source") {
            Some(Value::String(source)) if !source.is_empty() => source,
            Some(_) => {
                return Err(D::Error::custom(
                    "mapping \"source\" must be a non-empty string",
                ))
            }
            None => return Err(D::Error::missing_field("source")),
        };
        let config = TableConfig::deserialize(Value::Object(map)).map_err(D::Error::custom)?;
        Ok(Self { source, config })
    }
}

// ============================================================================
// Output Config
// ============================================================================

/// Job-level output configuration `{ mapping, bucket, branchId }`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub mapping: Option<Vec<MappingEntry>>,
    /// Default bucket, e.g. `out.c-main`
    #[serde(default)]
    pub bucket: Option<String>,
    /// Branch the configuration was written for
    #[serde(default, alias = "branchId")]
    pub branch_id: Option<String>,
}

impl OutputConfig {
    /// Parse from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file; `.yml`/`.yaml` are YAML, anything else JSON
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::FileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                Error::Io(e)
            }
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yml" | "yaml") => Self::from_yaml(&content),
            _ => Self::from_json(&content),
        }
    }

    #[must_use]
    pub fn with_mapping(mut self, mapping: Vec<MappingEntry>) -> Self {
        self.mapping = Some(mapping);
        self
    }

    #[must_use]
    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    /// Declared mapping entries, empty when none
    pub fn entries(&self) -> &[MappingEntry] {
        self.mapping.as_deref().unwrap_or_default()
    }

    /// Mapping entries for one source, in declaration order
    pub fn entries_for<'a>(&'a self, source: &'a str) -> impl Iterator<Item = &'a MappingEntry> {
        self.entries().iter().filter(move |e| e.source == source)
    }

    fn validate(&self) -> Result<()> {
        if let Some(bucket) = &self.bucket {
            if bucket.is_empty() {
                return Err(Error::config("Output bucket cannot be empty"));
            }
        }
        if matches!(&self.branch_id, Some(id) if id.is_empty()) {
            return Err(Error::config("Output branchId cannot be empty"));
        }
        Ok(())
    }
}

// ============================================================================
// Table Manifest
// ============================================================================

/// Predicate for deleting rows before a load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteWhere {
    pub column: String,
    pub operator: DeleteWhereOperator,
    pub values: Vec<String>,
}

/// Validated table configuration with defaults applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableManifest {
    pub destination: String,
    pub columns: Vec<String>,
    pub primary_key: Vec<String>,
    pub distribution_key: Vec<String>,
    pub incremental: bool,
    pub delete_where: Option<DeleteWhere>,
    pub delimiter: String,
    pub enclosure: String,
    pub metadata: Vec<MetadataItem>,
    pub column_metadata: ColumnMetadata,
}

impl TableManifest {
    /// Validate a merged configuration and fill in defaults
    pub fn from_config(config: TableConfig) -> Result<Self> {
        let destination = config
            .destination
            .filter(|d| !d.is_empty())
            .ok_or_else(|| Error::config("The \"destination\" option must be set"))?;

        let delimiter = config.delimiter.unwrap_or_else(|| ",".to_string());
        if delimiter.chars().count() != 1 {
            return Err(Error::config(format!(
                "The \"delimiter\" option must be a single character, got \"{delimiter}\""
            )));
        }

        let enclosure = config.enclosure.unwrap_or_else(|| "\"".to_string());
        if enclosure.chars().count() > 1 {
            return Err(Error::config(format!(
                "The \"enclosure\" option must be empty or a single character, got \"{enclosure}\""
            )));
        }

        let metadata = config.metadata.unwrap_or_default();
        validate_metadata("metadata", &metadata)?;

        let column_metadata = config.column_metadata.unwrap_or_default();
        for (column, items) in &column_metadata {
            if column.is_empty() {
                return Err(Error::config("Column metadata names an empty column"));
            }
            validate_metadata(&format!("column_metadata.{column}"), items)?;
        }

        let delete_where = config
            .delete_where_column
            .filter(|c| !c.is_empty())
            .map(|column| DeleteWhere {
                column,
                operator: config.delete_where_operator.unwrap_or_default(),
                values: config.delete_where_values.unwrap_or_default(),
            });

        Ok(Self {
            destination,
            columns: config.columns.unwrap_or_default(),
            primary_key: config.primary_key.unwrap_or_default(),
            distribution_key: config.distribution_key.unwrap_or_default(),
            incremental: config.incremental.unwrap_or(false),
            delete_where,
            delimiter,
            enclosure,
            metadata,
            column_metadata,
        })
    }
}

fn validate_metadata(path: &str, items: &[MetadataItem]) -> Result<()> {
    if items.iter().any(|item| item.key.is_empty()) {
        return Err(Error::config(format!(
            "The \"{path}\" option contains an item with an empty key"
        )));
    }
    Ok(())
}
