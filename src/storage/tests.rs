//! Tests for the storage module

use super::*;
use crate::types::{DeleteWhereOperator, MetadataItem, Stage};
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn fast_poll() -> PollConfig {
    PollConfig::constant(Duration::from_millis(1))
}

fn file_import(file_id: &str, incremental: bool) -> ImportRequest {
    ImportRequest {
        data: DataReference::File {
            data_file_id: file_id.to_string(),
        },
        delimiter: ",".to_string(),
        enclosure: "\"".to_string(),
        columns: Vec::new(),
        incremental,
    }
}

async fn upload(storage: &InMemoryStorage, dir: &TempDir, name: &str, content: &str) -> String {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    storage
        .upload_file(&path, &FileUploadOptions::default())
        .await
        .unwrap()
}

// ============================================================================
// Job Polling
// ============================================================================

#[test]
fn test_poll_config_default() {
    let poll = PollConfig::default();
    assert_eq!(poll.initial_interval, Duration::from_secs(1));
    assert_eq!(poll.delay(0), Duration::from_secs(1));
    assert_eq!(poll.delay(2), Duration::from_secs(4));
    assert_eq!(poll.delay(30), Duration::from_secs(20));
}

#[tokio::test]
async fn test_wait_for_job_polls_until_terminal() {
    let storage = InMemoryStorage::new();
    storage.add_table("out.c-main.orders", &["id", "name"], &[]).await;
    storage.set_job_polls(3).await;
    let dir = TempDir::new().unwrap();
    let file_id = upload(&storage, &dir, "orders.csv", "id,name\n1,a\n").await;

    let job_id = storage
        .queue_table_import("out.c-main.orders", &file_import(&file_id, false))
        .await
        .unwrap();
    assert_eq!(
        storage.get_job(&job_id).await.unwrap().status,
        JobStatus::Processing
    );

    let job = wait_for_job(&storage, &job_id, &fast_poll()).await.unwrap();
    assert_eq!(job.status, JobStatus::Success);
}

#[tokio::test]
async fn test_wait_for_job_success_reports_error() {
    let storage = InMemoryStorage::new();
    storage.add_table("out.c-main.orders", &["id"], &[]).await;
    storage.fail_import("out.c-main.orders", "Load error").await;
    let dir = TempDir::new().unwrap();
    let file_id = upload(&storage, &dir, "orders.csv", "id\n1\n").await;

    let job_id = storage
        .queue_table_import("out.c-main.orders", &file_import(&file_id, false))
        .await
        .unwrap();
    let err = wait_for_job_success(&storage, &job_id, &fast_poll())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("Load error"));
}

// ============================================================================
// In-Memory Backend
// ============================================================================

#[tokio::test]
async fn test_full_load_replaces_rows() {
    let storage = InMemoryStorage::new();
    storage.add_table("out.c-main.orders", &["id", "name"], &[]).await;
    let dir = TempDir::new().unwrap();

    for content in ["id,name\n1,a\n2,b\n", "id,name\n3,c\n"] {
        let file_id = upload(&storage, &dir, "orders.csv", content).await;
        let job_id = storage
            .queue_table_import("out.c-main.orders", &file_import(&file_id, false))
            .await
            .unwrap();
        wait_for_job_success(&storage, &job_id, &fast_poll())
            .await
            .unwrap();
    }

    assert_eq!(
        storage.table_rows("out.c-main.orders").await.unwrap(),
        vec![vec!["3".to_string(), "c".to_string()]]
    );
}

#[tokio::test]
async fn test_incremental_load_upserts_by_primary_key() {
    let storage = InMemoryStorage::new();
    storage
        .add_table("out.c-main.orders", &["id", "name"], &["id"])
        .await;
    let dir = TempDir::new().unwrap();

    for content in ["id,name\n1,a\n2,b\n", "id,name\n2,x\n3,c\n"] {
        let file_id = upload(&storage, &dir, "orders.csv", content).await;
        storage
            .queue_table_import("out.c-main.orders", &file_import(&file_id, true))
            .await
            .unwrap();
    }

    let rows = storage.table_rows("out.c-main.orders").await.unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[1], vec!["2".to_string(), "x".to_string()]);
}

#[tokio::test]
async fn test_headerless_import_with_columns() {
    let storage = InMemoryStorage::new();
    storage.add_table("out.c-main.orders", &["id", "name"], &[]).await;
    let dir = TempDir::new().unwrap();
    let file_id = upload(&storage, &dir, "part", "1;'a;b'\n").await;

    let request = ImportRequest {
        delimiter: ";".to_string(),
        enclosure: "'".to_string(),
        columns: vec!["id".to_string(), "name".to_string()],
        ..file_import(&file_id, false)
    };
    let job_id = storage
        .queue_table_import("out.c-main.orders", &request)
        .await
        .unwrap();
    wait_for_job_success(&storage, &job_id, &fast_poll())
        .await
        .unwrap();

    assert_eq!(
        storage.table_rows("out.c-main.orders").await.unwrap(),
        vec![vec!["1".to_string(), "a;b".to_string()]]
    );
}

#[tokio::test]
async fn test_import_header_mismatch_fails_job() {
    let storage = InMemoryStorage::new();
    storage.add_table("out.c-main.orders", &["id", "name"], &[]).await;
    let dir = TempDir::new().unwrap();
    let file_id = upload(&storage, &dir, "orders.csv", "id,other\n1,a\n").await;

    let job_id = storage
        .queue_table_import("out.c-main.orders", &file_import(&file_id, false))
        .await
        .unwrap();
    let job = storage.get_job(&job_id).await.unwrap();

    assert_eq!(job.status, JobStatus::Error);
    assert!(job.error.unwrap().contains("do not match"));
}

#[tokio::test]
async fn test_create_bucket_and_table() {
    let storage = InMemoryStorage::new();
    let bucket_id = storage.create_bucket("main", Stage::Out).await.unwrap();
    assert_eq!(bucket_id, "out.c-main");
    assert!(storage.bucket_exists("out.c-main").await.unwrap());

    let table_id = storage
        .create_table_async(
            &bucket_id,
            "orders",
            &CreateTableOptions {
                columns: vec!["id".to_string(), "name".to_string()],
                primary_key: vec!["id".to_string()],
                distribution_key: Vec::new(),
            },
        )
        .await
        .unwrap();
    assert_eq!(table_id, "out.c-main.orders");

    let table = storage.get_table(&table_id).await.unwrap();
    assert_eq!(table.primary_key, vec!["id".to_string()]);
    assert_eq!(table.rows_count, Some(0));

    let err = storage
        .create_table_async(&bucket_id, "orders", &CreateTableOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(400));
}

#[tokio::test]
async fn test_missing_objects_are_404() {
    let storage = InMemoryStorage::new();
    assert!(!storage.table_exists("out.c-main.nope").await.unwrap());
    assert!(storage.get_table("out.c-main.nope").await.unwrap_err().is_not_found());
    assert!(storage
        .list_bucket_metadata("out.c-nope")
        .await
        .unwrap_err()
        .is_not_found());
}

#[tokio::test]
async fn test_delete_rows_eq_and_ne() {
    let storage = InMemoryStorage::new();
    storage.add_table("out.c-main.orders", &["id", "status"], &[]).await;
    let dir = TempDir::new().unwrap();
    let file_id = upload(
        &storage,
        &dir,
        "orders.csv",
        "id,status\n1,new\n2,done\n3,new\n",
    )
    .await;
    storage
        .queue_table_import("out.c-main.orders", &file_import(&file_id, false))
        .await
        .unwrap();

    storage
        .delete_table_rows(
            "out.c-main.orders",
            &DeleteRowsOptions {
                where_column: "status".to_string(),
                where_operator: DeleteWhereOperator::Eq,
                where_values: vec!["new".to_string()],
            },
        )
        .await
        .unwrap();
    assert_eq!(storage.table_rows("out.c-main.orders").await.unwrap().len(), 1);

    storage
        .delete_table_rows(
            "out.c-main.orders",
            &DeleteRowsOptions {
                where_column: "status".to_string(),
                where_operator: DeleteWhereOperator::Ne,
                where_values: vec!["new".to_string()],
            },
        )
        .await
        .unwrap();
    assert!(storage.table_rows("out.c-main.orders").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_metadata_upsert_by_provider_and_key() {
    let storage = InMemoryStorage::new();
    storage.add_table("out.c-main.orders", &["id"], &[]).await;

    storage
        .post_table_metadata(
            "out.c-main.orders",
            "system",
            &[MetadataItem::new("KBC.createdBy.component.id", "foo")],
        )
        .await
        .unwrap();
    storage
        .post_table_metadata(
            "out.c-main.orders",
            "system",
            &[MetadataItem::new("KBC.createdBy.component.id", "bar")],
        )
        .await
        .unwrap();
    storage
        .post_table_metadata("out.c-main.orders", "foo", &[MetadataItem::new("KBC.createdBy.component.id", "x")])
        .await
        .unwrap();

    let metadata = storage.list_table_metadata("out.c-main.orders").await.unwrap();
    assert_eq!(metadata.len(), 2);
    assert_eq!(metadata[0].value, "bar");
    assert_eq!(metadata[1].provider, "foo");
}

#[tokio::test]
async fn test_column_metadata_requires_column() {
    let storage = InMemoryStorage::new();
    storage.add_table("out.c-main.orders", &["id"], &[]).await;

    storage
        .post_column_metadata("out.c-main.orders.id", "foo", &[MetadataItem::new("k", "v")])
        .await
        .unwrap();
    assert_eq!(storage.column_metadata("out.c-main.orders", "id").await.len(), 1);

    let err = storage
        .post_column_metadata("out.c-main.orders.nope", "foo", &[MetadataItem::new("k", "v")])
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_metadata_failure_injection() {
    let storage = InMemoryStorage::new();
    storage.add_table("out.c-main.orders", &["id"], &[]).await;
    storage.fail_metadata("out.c-main.orders", "Metadata service down").await;

    let err = storage
        .post_table_metadata("out.c-main.orders", "system", &[MetadataItem::new("k", "v")])
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "HTTP 400: Metadata service down");
}

#[tokio::test]
async fn test_primary_key_changes() {
    let storage = InMemoryStorage::new();
    storage
        .add_table("out.c-main.orders", &["id", "name"], &["id"])
        .await;

    let err = storage
        .create_table_primary_key("out.c-main.orders", &["name".to_string()])
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(400));

    storage.remove_table_primary_key("out.c-main.orders").await.unwrap();
    storage
        .create_table_primary_key("out.c-main.orders", &["name".to_string()])
        .await
        .unwrap();
    let table = storage.get_table("out.c-main.orders").await.unwrap();
    assert_eq!(table.primary_key, vec!["name".to_string()]);
}

#[tokio::test]
async fn test_sliced_upload_concatenates_slices() {
    let storage = InMemoryStorage::new();
    let dir = TempDir::new().unwrap();
    let a = dir.path().join("part1");
    let b = dir.path().join("part2");
    std::fs::write(&a, "1,a\n").unwrap();
    std::fs::write(&b, "2,b\n").unwrap();

    let file_id = storage
        .upload_sliced_file(
            &[a, b],
            &FileUploadOptions {
                compress: true,
                is_sliced: true,
                file_name: Some("orders".to_string()),
            },
        )
        .await
        .unwrap();

    assert_eq!(
        storage.file_content(&file_id).await.unwrap(),
        b"1,a\n2,b\n".to_vec()
    );
    assert_eq!(
        storage.calls_to("upload_sliced_file").await,
        vec!["upload_sliced_file orders".to_string()]
    );
}

// ============================================================================
// Session
// ============================================================================

#[test]
fn test_backend_session_branch() {
    let api: Arc<dyn StorageApi> = Arc::new(InMemoryStorage::new());
    let session = BackendSession::new(Arc::clone(&api));
    assert!(!session.has_branch());
    assert_eq!(session.branch_id(), None);

    let session = BackendSession::with_branch(api, BranchContext::new("123", "dev"));
    assert_eq!(session.branch_id(), Some("123"));
    assert_eq!(session.branch().unwrap().name, "dev");
    assert!(format!("{session:?}").contains("dev"));
}

// ============================================================================
// Blob Listing
// ============================================================================

#[test]
fn test_connection_string_with_key() {
    let credentials = AbsCredentials::from_connection_string(
        "DefaultEndpointsProtocol=https;AccountName=acc;AccountKey=a2V5==;EndpointSuffix=core.windows.net",
    )
    .unwrap();
    assert_eq!(credentials.account_name.as_deref(), Some("acc"));
    assert_eq!(credentials.account_key.as_deref(), Some("a2V5=="));
    assert!(credentials.sas_token.is_none());
}

#[test]
fn test_connection_string_with_sas() {
    let credentials = AbsCredentials::from_connection_string(
        "BlobEndpoint=https://acc.blob.core.windows.net;SharedAccessSignature=sv=2020&sig=abc",
    )
    .unwrap();
    assert_eq!(credentials.account_name.as_deref(), Some("acc"));
    assert_eq!(credentials.sas_token.as_deref(), Some("sv=2020&sig=abc"));
}

#[test]
fn test_connection_string_without_account() {
    assert!(AbsCredentials::from_connection_string("AccountKey=abc").is_err());
    assert!(AbsCredentials::from_connection_string("garbage").is_err());
}

#[tokio::test]
async fn test_object_store_lister() {
    let store = InMemory::new();
    for name in ["data/orders/part1", "data/orders/part2", "data/orders.csv"] {
        store
            .put(&ObjectPath::from(name), PutPayload::from_static(b"x"))
            .await
            .unwrap();
    }
    let lister = ObjectStoreBlobLister::default().with_store("container", Arc::new(store));

    let mut names = lister.list_blobs("container", "data/orders").await.unwrap();
    names.sort();
    assert_eq!(
        names,
        vec![
            "data/orders/part1".to_string(),
            "data/orders/part2".to_string()
        ]
    );
}
