//! Storage API client contract tests against a mock HTTP server

use output_mapping::storage::{
    wait_for_job, CreateTableOptions, DataReference, FileUploadOptions, ImportRequest, JobStatus,
    MetadataApi, StorageApi,
};
use output_mapping::Error;
use output_mapping::{MetadataItem, PollConfig, Stage, StorageClient, StorageClientConfig};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{body_json, body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> StorageClient {
    StorageClient::new(
        StorageClientConfig::new(server.uri(), "secret-token")
            .with_poll(PollConfig::constant(Duration::from_millis(1))),
    )
    .unwrap()
}

#[tokio::test]
async fn test_bucket_exists_uses_token() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/storage/buckets/out.c-main"))
        .and(header("X-StorageApi-Token", "secret-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "out.c-main"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/storage/buckets/out.c-missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": "Bucket not found"})))
        .mount(&server)
        .await;

    let client = client(&server);
    assert!(client.bucket_exists("out.c-main").await.unwrap());
    assert!(!client.bucket_exists("out.c-missing").await.unwrap());
}

#[tokio::test]
async fn test_branch_client_prefixes_paths() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v2/storage/branch/123/buckets"))
        .and(body_json(json!({"name": "main", "stage": "out"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "out.c-main"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = StorageClient::new(
        StorageClientConfig::new(server.uri(), "secret-token").with_branch("123"),
    )
    .unwrap();
    assert_eq!(client.create_bucket("main", Stage::Out).await.unwrap(), "out.c-main");
}

#[tokio::test]
async fn test_create_table_uploads_header_and_waits_for_job() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v2/storage/files/prepare"))
        .and(body_partial_json(json!({"name": "orders.header.csv", "isSliced": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 11,
            "uploadParams": {"url": format!("{}/upload/header?sig=x", server.uri())}
        })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/upload/header"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v2/storage/buckets/out.c-main/tables-async"))
        .and(body_json(json!({
            "name": "orders",
            "dataFileId": "11",
            "primaryKey": "id",
        })))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({"id": 5, "status": "waiting"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/storage/jobs/5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 5,
            "status": "success",
            "results": {"id": "out.c-main.orders"}
        })))
        .mount(&server)
        .await;

    let options = CreateTableOptions {
        columns: vec!["id".into(), "name".into()],
        primary_key: vec!["id".into()],
        distribution_key: Vec::new(),
    };
    let table_id = client(&server)
        .create_table_async("out.c-main", "orders", &options)
        .await
        .unwrap();
    assert_eq!(table_id, "out.c-main.orders");
}

#[tokio::test]
async fn test_create_table_job_failure() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v2/storage/files/prepare"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 11,
            "uploadParams": {"url": format!("{}/upload/header", server.uri())}
        })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/upload/header"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v2/storage/buckets/out.c-main/tables-async"))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({"id": 6})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/storage/jobs/6"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 6,
            "status": "error",
            "error": {"message": "Invalid primary key"}
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .create_table_async("out.c-main", "orders", &CreateTableOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Job 6 failed: Invalid primary key");
}

#[tokio::test]
async fn test_queue_workspace_import() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v2/storage/tables/out.c-main.orders/import-async"))
        .and(body_json(json!({
            "dataWorkspaceId": "ws-1",
            "dataObject": "orders",
            "delimiter": ",",
            "enclosure": "\"",
            "incremental": true,
            "columns": ["id", "name"],
            "withoutHeaders": true
        })))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({"id": 9})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/storage/jobs/9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 9,
            "status": "processing"
        })))
        .mount(&server)
        .await;

    let client = client(&server);
    let request = ImportRequest {
        data: DataReference::Workspace {
            data_workspace_id: "ws-1".into(),
            data_object: "orders".into(),
        },
        delimiter: ",".into(),
        enclosure: "\"".into(),
        columns: vec!["id".into(), "name".into()],
        incremental: true,
    };
    let job_id = client
        .queue_table_import("out.c-main.orders", &request)
        .await
        .unwrap();
    assert_eq!(job_id, "9");

    let job = client.get_job(&job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Processing);
}

#[tokio::test]
async fn test_delete_rows_query() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/v2/storage/tables/out.c-main.orders/rows"))
        .and(query_param("whereColumn", "status"))
        .and(query_param("whereOperator", "ne"))
        .and(query_param("whereValues[]", "open"))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({"id": 3})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/storage/jobs/3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 3, "status": "success"})))
        .mount(&server)
        .await;

    let options = output_mapping::storage::DeleteRowsOptions {
        where_column: "status".into(),
        where_operator: output_mapping::DeleteWhereOperator::Ne,
        where_values: vec!["open".into()],
    };
    client(&server)
        .delete_table_rows("out.c-main.orders", &options)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_upload_file_is_gzipped() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("orders.csv");
    std::fs::write(&file, "id\n1\n").unwrap();

    Mock::given(method("POST"))
        .and(path("/v2/storage/files/prepare"))
        .and(body_partial_json(json!({"name": "orders.csv.gz"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "42",
            "uploadParams": {"url": format!("{}/upload/orders", server.uri())}
        })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/upload/orders"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let options = FileUploadOptions {
        compress: true,
        ..FileUploadOptions::default()
    };
    let file_id = client(&server).upload_file(&file, &options).await.unwrap();
    assert_eq!(file_id, "42");
}

#[tokio::test]
async fn test_metadata_endpoints() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v2/storage/columns/out.c-main.orders.id/metadata"))
        .and(body_json(json!({
            "provider": "foo",
            "metadata": [{"key": "type", "value": "INT"}]
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/storage/buckets/out.c-main/metadata"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 1, "key": "KBC.createdBy.branch.id", "value": 123, "provider": "system"}
        ])))
        .mount(&server)
        .await;

    let client = client(&server);
    client
        .post_column_metadata(
            "out.c-main.orders.id",
            "foo",
            &[MetadataItem::new("type", "INT")],
        )
        .await
        .unwrap();

    let metadata = client.list_bucket_metadata("out.c-main").await.unwrap();
    assert_eq!(metadata[0].value, "123");
    assert_eq!(metadata[0].id, "1");
}

#[tokio::test]
async fn test_unrecognised_job_status_stops_polling() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/storage/jobs/12"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 12,
            "status": "cancelled"
        })))
        .mount(&server)
        .await;

    let client = client(&server);
    assert_eq!(client.get_job("12").await.unwrap().status, JobStatus::Unknown);

    let err = tokio::time::timeout(
        Duration::from_secs(5),
        wait_for_job(&client, "12", &PollConfig::constant(Duration::from_millis(1))),
    )
    .await
    .expect("polling should stop")
    .unwrap_err();
    assert!(matches!(err, Error::Job { .. }));
    assert_eq!(err.to_string(), "Job 12 failed: Job reported an unrecognised status");
}
