//! Common types used throughout output mapping
//!
//! Table identifiers, bucket stages and retry/backoff settings shared by the
//! storage client and the writer.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Backoff Type
// ============================================================================

/// Backoff strategy for retries and job polling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffType {
    /// Same delay every attempt
    Constant,
    /// Delay grows linearly
    Linear,
    /// Delay doubles every attempt
    #[default]
    Exponential,
}

// ============================================================================
// Stage
// ============================================================================

/// Lifecycle partition of a bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Input stage (`in`)
    In,
    /// Output stage (`out`)
    Out,
}

impl Stage {
    /// Wire name of the stage
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::In => "in",
            Stage::Out => "out",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Stage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "in" => Ok(Stage::In),
            "out" => Ok(Stage::Out),
            other => Err(Error::config(format!("Unknown bucket stage '{other}'"))),
        }
    }
}

// ============================================================================
// Metadata
// ============================================================================

/// One key/value metadata pair as declared in configuration or posted to storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataItem {
    pub key: String,
    pub value: String,
}

impl MetadataItem {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

// ============================================================================
// Row Deletion
// ============================================================================

/// Comparison used by predicate row deletion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeleteWhereOperator {
    #[default]
    Eq,
    Ne,
}

impl DeleteWhereOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeleteWhereOperator::Eq => "eq",
            DeleteWhereOperator::Ne => "ne",
        }
    }
}

// ============================================================================
// Table Identifier
// ============================================================================

/// Fully-qualified table identifier `stage.bucket.table`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableId {
    stage: Stage,
    bucket: String,
    table: String,
}

impl TableId {
    /// Parse a destination string; exactly three non-empty dot-separated parts
    pub fn parse(id: &str) -> Result<Self> {
        let parts: Vec<&str> = id.split('.').collect();
        if parts.len() != 3 || parts.iter().any(|p| p.is_empty()) {
            return Err(Error::config(format!(
                "'{id}' is not a valid table identifier (expected stage.bucket.table)"
            )));
        }
        Ok(Self {
            stage: parts[0].parse()?,
            bucket: parts[1].to_string(),
            table: parts[2].to_string(),
        })
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Bucket segment as written, e.g. `c-main`
    pub fn bucket_segment(&self) -> &str {
        &self.bucket
    }

    /// Bucket name used when creating it (segment without the `c-` prefix)
    pub fn bucket_name(&self) -> &str {
        self.bucket.strip_prefix("c-").unwrap_or(&self.bucket)
    }

    /// Bucket id, e.g. `out.c-main`
    pub fn bucket_id(&self) -> String {
        format!("{}.{}", self.stage, self.bucket)
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Copy of this id with another bucket segment
    #[must_use]
    pub fn with_bucket_segment(&self, bucket: impl Into<String>) -> Self {
        Self {
            stage: self.stage,
            bucket: bucket.into(),
            table: self.table.clone(),
        }
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.stage, self.bucket, self.table)
    }
}
