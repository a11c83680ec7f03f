//! Primary key handling for existing tables

use super::types::TableManifest;
use crate::storage::{StorageApi, TableInfo};
use std::collections::BTreeSet;
use tracing::warn;

/// Trim key names, drop empty ones, deduplicate keeping the first occurrence
pub fn normalize_key_array(keys: &[String]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut normalized = Vec::with_capacity(keys.len());
    for key in keys {
        let key = key.trim();
        if key.is_empty() {
            warn!("Found empty column name in key array.");
            continue;
        }
        if seen.insert(key.to_string()) {
            normalized.push(key.to_string());
        }
    }
    normalized
}

fn same_columns(a: &[String], b: &[String]) -> bool {
    let a: BTreeSet<&str> = a.iter().map(String::as_str).collect();
    let b: BTreeSet<&str> = b.iter().map(String::as_str).collect();
    a == b
}

/// Warn when the declared key differs from the table's key
pub fn validate_primary_key_against_table(table: &TableInfo, manifest: &TableManifest) {
    let declared = normalize_key_array(&manifest.primary_key);
    if !same_columns(&declared, &table.primary_key) {
        warn!(
            "Output mapping does not match destination table: primary key '{}' does not match '{}' in '{}'.",
            declared.join(", "),
            table.primary_key.join(", "),
            manifest.destination
        );
    }
}

/// Whether the table's key should be replaced by the declared one
///
/// An empty declared key keeps whatever key the table has.
pub fn should_modify_primary_key(table: &TableInfo, manifest: &TableManifest) -> bool {
    let declared = normalize_key_array(&manifest.primary_key);
    !declared.is_empty() && !same_columns(&declared, &table.primary_key)
}

/// Replace a table's primary key, restoring the old one if that fails
///
/// Failures are logged, never returned: the load proceeds with whatever key
/// the table ends up with.
pub async fn modify_primary_key(
    api: &dyn StorageApi,
    table_id: &str,
    current: &[String],
    declared: &[String],
) {
    warn!(
        "Modifying primary key of table \"{table_id}\" from \"{}\" to \"{}\".",
        current.join(", "),
        declared.join(", ")
    );

    if !current.is_empty() {
        if let Err(e) = api.remove_table_primary_key(table_id).await {
            warn!("Error deleting primary key of table {table_id}: {e}");
            return;
        }
    }

    if let Err(e) = api.create_table_primary_key(table_id, declared).await {
        warn!("Error changing primary key of table {table_id}: {e}");
        if current.is_empty() {
            return;
        }
        if let Err(e) = api.create_table_primary_key(table_id, current).await {
            warn!("Error restoring primary key of table {table_id}: {e}");
            warn!("The table {table_id} was left without primary key.");
        }
    }
}
