//! Tests for the mapping module

use super::*;
use crate::error::Error;
use crate::storage::{InMemoryStorage, StorageApi, TableInfo};
use crate::types::{DeleteWhereOperator, MetadataItem};
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use tempfile::TempDir;
use test_case::test_case;

fn item(key: &str, value: &str) -> MetadataItem {
    MetadataItem::new(key, value)
}

fn manifest_with_key(destination: &str, key: &[&str]) -> TableManifest {
    TableManifest::from_config(
        TableConfig::default()
            .with_destination(destination)
            .with_primary_key(key.iter().copied()),
    )
    .unwrap()
}

fn table_with_key(key: &[&str]) -> TableInfo {
    TableInfo {
        id: "out.c-main.orders".to_string(),
        name: "orders".to_string(),
        columns: vec!["id".to_string(), "name".to_string()],
        primary_key: key.iter().map(|k| k.to_string()).collect(),
        rows_count: None,
    }
}

// ============================================================================
// Parsing
// ============================================================================

#[test]
fn test_output_config_from_json() {
    let config = OutputConfig::from_json(
        r#"{
            "bucket": "out.c-main",
            "branchId": "123",
            "mapping": [
                {"source": "a.csv", "destination": "out.c-main.a", "primary_key": ["id"]},
                {"source": "a.csv", "destination": "out.c-main.a2", "incremental": true}
            ]
        }"#,
    )
    .unwrap();

    assert_eq!(config.bucket.as_deref(), Some("out.c-main"));
    assert_eq!(config.branch_id.as_deref(), Some("123"));
    assert_eq!(config.entries().len(), 2);
    assert_eq!(config.entries_for("a.csv").count(), 2);
    assert_eq!(
        config.entries()[0].config.primary_key,
        Some(vec!["id".to_string()])
    );
    assert_eq!(config.entries()[1].config.incremental, Some(true));
}

#[test]
fn test_output_config_from_yaml() {
    let config = OutputConfig::from_yaml(
        r"
mapping:
  - source: orders.csv
    destination: out.c-main.orders
    delete_where_column: status
    delete_where_operator: ne
    delete_where_values: [open]
    column_metadata:
      id:
        - key: type
          value: integer
",
    )
    .unwrap();

    let entry = &config.entries()[0];
    assert_eq!(entry.source, "orders.csv");
    assert_eq!(entry.config.delete_where_operator, Some(DeleteWhereOperator::Ne));
    assert_eq!(
        entry.config.column_metadata.as_ref().unwrap()["id"],
        vec![item("type", "integer")]
    );
}

#[test]
fn test_output_config_from_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.yml");
    std::fs::write(&path, "bucket: out.c-main\n").unwrap();
    assert_eq!(
        OutputConfig::from_file(&path).unwrap().bucket.as_deref(),
        Some("out.c-main")
    );

    let missing = OutputConfig::from_file(dir.path().join("nope.json")).unwrap_err();
    assert!(matches!(missing, Error::FileNotFound { .. }));
}

#[test_case(r#"{"mapping": [{"destination": "out.c-main.a"}]}"# ; "missing source")]
#[test_case(r#"{"mapping": [{"source": ""}]}"# ; "empty source")]
#[test_case(r#"{"mapping": [{"source": "a", "unknown": 1}]}"# ; "unknown key")]
#[test_case(r#"{"mapping": [{"source": "a", "incremental": "yes"}]}"# ; "wrong type")]
#[test_case(r#"{"bucket": ""}"# ; "empty bucket")]
fn test_output_config_rejects(json: &str) {
    assert!(OutputConfig::from_json(json).is_err());
}

// ============================================================================
// Manifest Validation
// ============================================================================

#[test]
fn test_table_manifest_defaults() {
    let manifest =
        TableManifest::from_config(TableConfig::default().with_destination("out.c-main.a"))
            .unwrap();

    assert_eq!(manifest.delimiter, ",");
    assert_eq!(manifest.enclosure, "\"");
    assert!(!manifest.incremental);
    assert!(manifest.columns.is_empty());
    assert!(manifest.primary_key.is_empty());
    assert!(manifest.delete_where.is_none());
    assert!(manifest.metadata.is_empty());
}

#[test]
fn test_table_manifest_delete_where() {
    let config = TableConfig {
        destination: Some("out.c-main.a".to_string()),
        delete_where_column: Some("status".to_string()),
        delete_where_values: Some(vec!["closed".to_string()]),
        ..TableConfig::default()
    };
    let manifest = TableManifest::from_config(config).unwrap();

    assert_eq!(
        manifest.delete_where,
        Some(DeleteWhere {
            column: "status".to_string(),
            operator: DeleteWhereOperator::Eq,
            values: vec!["closed".to_string()],
        })
    );
}

#[test_case(TableConfig::default() ; "missing destination")]
#[test_case(TableConfig { delimiter: Some(";;".to_string()), ..TableConfig::default().with_destination("a.b.c") } ; "long delimiter")]
#[test_case(TableConfig { delimiter: Some(String::new()), ..TableConfig::default().with_destination("a.b.c") } ; "empty delimiter")]
#[test_case(TableConfig { enclosure: Some("''".to_string()), ..TableConfig::default().with_destination("a.b.c") } ; "long enclosure")]
#[test_case(TableConfig::default().with_destination("a.b.c").with_metadata(vec![item("", "x")]) ; "empty metadata key")]
fn test_table_manifest_rejects(config: TableConfig) {
    assert!(matches!(
        TableManifest::from_config(config),
        Err(Error::Config { .. })
    ));
}

#[test]
fn test_empty_enclosure_is_allowed() {
    let config = TableConfig {
        enclosure: Some(String::new()),
        ..TableConfig::default().with_destination("out.c-main.a")
    };
    assert_eq!(TableManifest::from_config(config).unwrap().enclosure, "");
}

// ============================================================================
// Merge
// ============================================================================

#[test]
fn test_merge_mapping_wins_manifest_fills() {
    let manifest = TableConfig::default().with_columns(["Id", "Name"]);
    let mapping = TableConfig::default()
        .with_destination("out.c-main.x")
        .with_metadata(vec![item("foo", "bar")]);

    let merged = merge(&manifest, &mapping);

    assert_eq!(merged.destination.as_deref(), Some("out.c-main.x"));
    assert_eq!(
        merged.columns,
        Some(vec!["Id".to_string(), "Name".to_string()])
    );
    assert_eq!(merged.metadata, Some(vec![item("foo", "bar")]));
}

#[test]
fn test_merge_does_not_touch_inputs() {
    let manifest = TableConfig::default()
        .with_destination("out.c-main.manifest")
        .with_incremental(true);
    let mapping = TableConfig::default().with_destination("out.c-main.mapping");
    let before = (manifest.clone(), mapping.clone());

    let merged = merge(&manifest, &mapping);

    assert_eq!(merged.destination.as_deref(), Some("out.c-main.mapping"));
    assert_eq!(merged.incremental, Some(true));
    assert_eq!((manifest, mapping), before);
}

#[test]
fn test_merge_metadata_by_key() {
    let manifest = TableConfig::default().with_metadata(vec![item("foo", "baz"), item("bar", "baz")]);
    let mapping = TableConfig::default().with_metadata(vec![item("foo", "bar"), item("new", "1")]);

    let merged = merge(&manifest, &mapping);

    assert_eq!(
        merged.metadata,
        Some(vec![item("foo", "bar"), item("bar", "baz"), item("new", "1")])
    );
}

#[test]
fn test_merge_column_metadata_per_column() {
    let manifest = TableConfig {
        column_metadata: Some(BTreeMap::from([
            ("id".to_string(), vec![item("type", "int"), item("nullable", "no")]),
            ("name".to_string(), vec![item("type", "text")]),
        ])),
        ..TableConfig::default()
    };
    let mapping = TableConfig {
        column_metadata: Some(BTreeMap::from([(
            "id".to_string(),
            vec![item("type", "bigint")],
        )])),
        ..TableConfig::default()
    };

    let merged = merge(&manifest, &mapping).column_metadata.unwrap();

    assert_eq!(merged["id"], vec![item("type", "bigint"), item("nullable", "no")]);
    assert_eq!(merged["name"], vec![item("type", "text")]);
}

#[test]
fn test_merge_items_absent_sides() {
    assert_eq!(merge_items(None, None), None);
    assert_eq!(
        merge_items(Some(&[item("a", "1")][..]), None),
        Some(vec![item("a", "1")])
    );
}

// ============================================================================
// Destination
// ============================================================================

#[test_case(None, "table.csv", "table" ; "no prefix strips csv")]
#[test_case(None, "out.c-main.table.csv", "out.c-main.table" ; "full id file name")]
#[test_case(Some("out.c-main"), "table.csv", "out.c-main.table" ; "prefix")]
#[test_case(Some("out.c-main"), "table", "out.c-main.table" ; "no extension")]
#[test_case(Some("out.c-main"), "table.csv.csv", "out.c-main.table.csv" ; "single suffix stripped")]
#[test_case(Some(""), "table.csv", "table" ; "empty prefix")]
fn test_resolve(prefix: Option<&str>, filename: &str, expected: &str) {
    assert_eq!(resolve(prefix, filename), expected);
}

#[test_case("out.c-foo.table", None, "out.c-foo.table" ; "default branch")]
#[test_case("out.c-foo.table", Some("123"), "out.c-123-foo.table" ; "prefixed bucket")]
#[test_case("in.foo.table", Some("123"), "in.c-123-foo.table" ; "bucket without prefix")]
fn test_rewrite_destination(destination: &str, branch: Option<&str>, expected: &str) {
    assert_eq!(rewrite_destination(destination, branch).unwrap(), expected);
}

#[test]
fn test_rewrite_destination_rejects_invalid_id() {
    assert!(rewrite_destination("not-a-table", Some("123")).is_err());
}

// ============================================================================
// Manifest Files
// ============================================================================

#[test]
fn test_read_table_manifest_json_and_yaml() {
    let dir = TempDir::new().unwrap();
    let json = dir.path().join("a.csv.manifest");
    std::fs::write(&json, r#"{"destination": "out.c-main.a", "primary_key": ["id"]}"#).unwrap();
    let yaml = dir.path().join("b.csv.manifest");
    std::fs::write(&yaml, "destination: out.c-main.b\nincremental: true\n").unwrap();

    let a = read_table_manifest(&json, ManifestFormat::Json).unwrap();
    assert_eq!(a.destination.as_deref(), Some("out.c-main.a"));

    let b = read_table_manifest(&yaml, ManifestFormat::Yaml).unwrap();
    assert_eq!(b.incremental, Some(true));
}

#[test]
fn test_read_table_manifest_errors() {
    let dir = TempDir::new().unwrap();
    let broken = dir.path().join("a.csv.manifest");
    std::fs::write(&broken, r#"{"destination": "out.c-main.a", "bogus": 1}"#).unwrap();

    let err = read_table_manifest(&broken, ManifestFormat::Json).unwrap_err();
    assert!(matches!(err, Error::InvalidOutput { .. }));
    assert!(err
        .to_string()
        .starts_with("Failed to read table manifest from file a.csv.manifest"));

    let missing = read_table_manifest(&dir.path().join("nope.manifest"), ManifestFormat::Json)
        .unwrap_err();
    assert!(missing.to_string().contains("not found."));
}

#[test]
fn test_manifest_format_serialize_roundtrip() {
    let config = TableConfig::default()
        .with_destination("out.c-main.a")
        .with_columns(["id"]);
    for format in [ManifestFormat::Json, ManifestFormat::Yaml] {
        let text = format.serialize(&config).unwrap();
        assert_eq!(format.deserialize(&text).unwrap(), config);
    }
    assert_eq!("yml".parse::<ManifestFormat>().unwrap(), ManifestFormat::Yaml);
    assert!("xml".parse::<ManifestFormat>().is_err());
}

#[test]
fn test_manifest_source_name() {
    assert_eq!(manifest_source_name("a.csv.manifest"), Some("a.csv"));
    assert_eq!(manifest_source_name("a.csv"), None);
}

// ============================================================================
// Primary Key
// ============================================================================

#[test]
fn test_normalize_key_array() {
    let keys = vec![
        " id ".to_string(),
        String::new(),
        "name".to_string(),
        "id".to_string(),
    ];
    assert_eq!(
        normalize_key_array(&keys),
        vec!["id".to_string(), "name".to_string()]
    );
}

#[test_case(&["id"], &["id"], false ; "same key")]
#[test_case(&["id", "name"], &["name", "id"], false ; "same set other order")]
#[test_case(&["id"], &[], true ; "table without key")]
#[test_case(&["name"], &["id"], true ; "different key")]
#[test_case(&[], &["id"], false ; "empty declared key keeps existing")]
fn test_should_modify_primary_key(declared: &[&str], existing: &[&str], expected: bool) {
    let manifest = manifest_with_key("out.c-main.orders", declared);
    assert_eq!(
        should_modify_primary_key(&table_with_key(existing), &manifest),
        expected
    );
}

#[test]
fn test_validate_primary_key_only_warns() {
    let manifest = manifest_with_key("out.c-main.orders", &["name"]);
    validate_primary_key_against_table(&table_with_key(&["id"]), &manifest);
}

#[tokio::test]
async fn test_modify_primary_key_replaces_key() {
    let storage = InMemoryStorage::new();
    storage
        .add_table("out.c-main.orders", &["id", "name"], &["id"])
        .await;

    modify_primary_key(
        &storage,
        "out.c-main.orders",
        &["id".to_string()],
        &["id".to_string(), "name".to_string()],
    )
    .await;

    let table = storage.get_table("out.c-main.orders").await.unwrap();
    assert_eq!(table.primary_key, vec!["id".to_string(), "name".to_string()]);
}

#[tokio::test]
async fn test_modify_primary_key_restores_on_failure() {
    let storage = InMemoryStorage::new();
    storage
        .add_table("out.c-main.orders", &["id", "name"], &["id"])
        .await;

    modify_primary_key(
        &storage,
        "out.c-main.orders",
        &["id".to_string()],
        &["missing".to_string()],
    )
    .await;

    let table = storage.get_table("out.c-main.orders").await.unwrap();
    assert_eq!(table.primary_key, vec!["id".to_string()]);
}
