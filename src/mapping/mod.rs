//! Output mapping configuration
//!
//! # Overview
//!
//! - `TableConfig` / `MappingEntry` / `OutputConfig` - declared configuration
//! - `TableManifest` - validated configuration with defaults
//! - `merge` - mapping-over-manifest precedence
//! - `resolve` / `rewrite_destination` - destination naming
//! - Manifest (de)serialization and primary key helpers

mod destination;
mod manifest;
mod merge;
mod primary_key;
mod types;

pub use destination::{resolve, rewrite_destination};
pub use manifest::{manifest_source_name, read_table_manifest, ManifestFormat, MANIFEST_SUFFIX};
pub use merge::{merge, merge_items};
pub use primary_key::{
    modify_primary_key, normalize_key_array, should_modify_primary_key,
    validate_primary_key_against_table,
};
pub use types::{
    ColumnMetadata, DeleteWhere, MappingEntry, OutputConfig, TableConfig, TableManifest,
};

#[cfg(test)]
mod tests;
