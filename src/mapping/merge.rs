//! Config merger
//!
//! Mapping entries take precedence over manifests field by field; metadata
//! lists merge by key.

use super::types::{ColumnMetadata, TableConfig};
use crate::types::MetadataItem;

/// Combine a manifest-derived and a mapping-derived configuration
///
/// Fields set in `mapping` win, fields only set in `manifest` pass through.
/// Neither input is modified.
pub fn merge(manifest: &TableConfig, mapping: &TableConfig) -> TableConfig {
    TableConfig {
        destination: pick(&manifest.destination, &mapping.destination),
        columns: pick(&manifest.columns, &mapping.columns),
        primary_key: pick(&manifest.primary_key, &mapping.primary_key),
        distribution_key: pick(&manifest.distribution_key, &mapping.distribution_key),
        incremental: pick(&manifest.incremental, &mapping.incremental),
        delete_where_column: pick(&manifest.delete_where_column, &mapping.delete_where_column),
        delete_where_operator: pick(
            &manifest.delete_where_operator,
            &mapping.delete_where_operator,
        ),
        delete_where_values: pick(&manifest.delete_where_values, &mapping.delete_where_values),
        delimiter: pick(&manifest.delimiter, &mapping.delimiter),
        enclosure: pick(&manifest.enclosure, &mapping.enclosure),
        metadata: merge_items(manifest.metadata.as_deref(), mapping.metadata.as_deref()),
        column_metadata: merge_column_metadata(
            manifest.column_metadata.as_ref(),
            mapping.column_metadata.as_ref(),
        ),
    }
}

fn pick<T: Clone>(base: &Option<T>, over: &Option<T>) -> Option<T> {
    over.clone().or_else(|| base.clone())
}

/// Merge two metadata lists; `over` replaces values of matching keys in place
/// and appends new keys in its own order
pub fn merge_items(
    base: Option<&[MetadataItem]>,
    over: Option<&[MetadataItem]>,
) -> Option<Vec<MetadataItem>> {
    match (base, over) {
        (None, None) => None,
        (Some(base), None) => Some(base.to_vec()),
        (None, Some(over)) => Some(over.to_vec()),
        (Some(base), Some(over)) => {
            let mut merged = base.to_vec();
            for item in over {
                match merged.iter_mut().find(|m| m.key == item.key) {
                    Some(existing) => existing.value.clone_from(&item.value),
                    None => merged.push(item.clone()),
                }
            }
            Some(merged)
        }
    }
}

fn merge_column_metadata(
    base: Option<&ColumnMetadata>,
    over: Option<&ColumnMetadata>,
) -> Option<ColumnMetadata> {
    match (base, over) {
        (None, None) => None,
        (Some(base), None) => Some(base.clone()),
        (None, Some(over)) => Some(over.clone()),
        (Some(base), Some(over)) => {
            let mut merged = base.clone();
            for (column, items) in over {
                let combined = merge_items(
                    merged.get(column).map(Vec::as_slice),
                    Some(items.as_slice()),
                )
                .unwrap_or_default();
                merged.insert(column.clone(), combined);
            }
            Some(merged)
        }
    }
}
