use std::time::Duration;

use bytes::Bytes;
use serde_json::{Value, json};
use ss4o_trace_exporter::adapter::opensearch::OpenSearchClient;
use ss4o_trace_exporter::config::{ClientSettings, Settings};
use ss4o_trace_exporter::error::{ClientError, ExportError, IndexError};
use ss4o_trace_exporter::exporter::SsoTracesExporter;
use ss4o_trace_exporter::port::BulkClient;
use ss4o_trace_exporter::test_support::{batch_of, test_settings};
use wiremock::{
    Mock, MockServer, Request, ResponseTemplate,
    matchers::{body_string_contains, header, method, path},
};

const BULK_BODY: &str = "{\"create\":{\"_index\":\"traces\",\"_id\":\"a-b\"}}\n{\"name\":\"span\"}\n";

fn client_settings(server: &MockServer) -> ClientSettings {
    ClientSettings {
        endpoint: server.uri(),
        request_timeout: Duration::from_secs(5),
        retry_backoff: Duration::from_millis(10),
        ..ClientSettings::default()
    }
}

fn created(id: &str) -> Value {
    json!({ "create": { "_index": "traces", "_id": id, "status": 201 } })
}

/// Answer a bulk request with one `201` item per action line.
fn echo_bulk(request: &Request) -> ResponseTemplate {
    let body = String::from_utf8_lossy(&request.body);
    let items: Vec<Value> = body
        .lines()
        .step_by(2)
        .filter_map(|line| serde_json::from_str::<Value>(line).ok())
        .map(|action| {
            let id = action["create"]["_id"].as_str().unwrap_or_default().to_string();
            created(&id)
        })
        .collect();
    ResponseTemplate::new(200).set_body_json(json!({ "errors": false, "items": items }))
}

#[tokio::test]
async fn test_bulk_posts_ndjson_and_parses_items() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .and(header("content-type", "application/x-ndjson"))
        .and(body_string_contains("\"_id\":\"a-b\""))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "errors": false, "items": [created("a-b")] })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = OpenSearchClient::new(&client_settings(&server)).unwrap();
    let response = client.bulk(Bytes::from_static(BULK_BODY.as_bytes())).await.unwrap();

    assert_eq!(response.items.len(), 1);
    assert_eq!(response.items[0].id.as_deref(), Some("a-b"));
    assert!(response.items[0].is_success());
}

#[tokio::test]
async fn test_basic_auth_is_sent_when_configured() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .and(header("authorization", "Basic YWRtaW46c2VjcmV0"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = OpenSearchClient::new(&ClientSettings {
        username: Some("admin".to_string()),
        password: Some("secret".to_string()),
        ..client_settings(&server)
    })
    .unwrap();

    assert!(client.health_check().await.is_ok());
}

#[tokio::test]
async fn test_bulk_server_error_is_http_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .respond_with(ResponseTemplate::new(500).set_body_string("cluster on fire"))
        .mount(&server)
        .await;

    let client = OpenSearchClient::new(&client_settings(&server)).unwrap();
    let result = client.bulk(Bytes::from_static(BULK_BODY.as_bytes())).await;

    match result {
        Err(ClientError::HttpError { status, message }) => {
            assert_eq!(status, 500);
            assert_eq!(message, "cluster on fire");
        }
        other => panic!("Expected HttpError, got {other:?}"),
    }
}

#[tokio::test]
async fn test_malformed_bulk_body_is_invalid_response() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy</html>"))
        .mount(&server)
        .await;

    let client = OpenSearchClient::new(&client_settings(&server)).unwrap();
    let result = client.bulk(Bytes::from_static(BULK_BODY.as_bytes())).await;

    assert!(matches!(result, Err(ClientError::InvalidResponse(_))));
}

#[tokio::test]
async fn test_retryable_failure_is_retried_when_enabled() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "errors": false, "items": [created("a-b")] })),
        )
        .mount(&server)
        .await;

    let client = OpenSearchClient::new(&ClientSettings {
        max_retries: 3,
        enable_metrics: true,
        ..client_settings(&server)
    })
    .unwrap();

    let response = client.bulk(Bytes::from_static(BULK_BODY.as_bytes())).await.unwrap();
    assert_eq!(response.items.len(), 1);

    let stats = client.stats().unwrap();
    assert_eq!(stats.total_requests, 3);
    assert_eq!(stats.failed_requests, 2);
    assert_eq!(stats.successful_requests, 1);
    assert_eq!(stats.retried_requests, 2);
}

#[tokio::test]
async fn test_no_retry_by_default() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let client = OpenSearchClient::new(&client_settings(&server)).unwrap();
    let result = client.bulk(Bytes::from_static(BULK_BODY.as_bytes())).await;

    assert!(matches!(result, Err(ClientError::HttpError { status: 503, .. })));
}

#[tokio::test]
async fn test_health_check_reports_status() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let client = OpenSearchClient::new(&client_settings(&server)).unwrap();

    match client.health_check().await {
        Err(ClientError::HttpError { status, .. }) => assert_eq!(status, 401),
        other => panic!("Expected HttpError, got {other:?}"),
    }
}

#[tokio::test]
async fn test_exporter_pushes_to_opensearch() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .respond_with(echo_bulk)
        .expect(2)
        .mount(&server)
        .await;

    let mut settings = Settings {
        client: client_settings(&server),
        ..test_settings()
    };
    settings.indexer.flush_documents = 5;
    let mut exporter = SsoTracesExporter::new(settings).unwrap();
    exporter.start().unwrap();

    exporter.push_batch(&batch_of(10)).await.unwrap();
}

#[tokio::test]
async fn test_exporter_reports_unreachable_backend() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let settings = Settings {
        client: client_settings(&server),
        ..test_settings()
    };
    let mut exporter = SsoTracesExporter::new(settings).unwrap();
    exporter.start().unwrap();

    let result = exporter.push_batch(&batch_of(3)).await;
    assert!(matches!(result, Err(ExportError::Connection(_))));
}

#[tokio::test]
async fn test_exporter_maps_item_rejections() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errors": true,
            "items": [{
                "create": {
                    "_index": "traces",
                    "status": 400,
                    "error": { "type": "mapper_parsing_exception", "reason": "bad field" }
                }
            }]
        })))
        .mount(&server)
        .await;

    let settings = Settings {
        client: client_settings(&server),
        ..test_settings()
    };
    let mut exporter = SsoTracesExporter::new(settings).unwrap();
    exporter.start().unwrap();

    let result = exporter.push_batch(&batch_of(1)).await;
    let Err(ExportError::Indexing(joined)) = result else {
        panic!("expected a rejection, got {result:?}");
    };
    assert!(matches!(
        &joined.errors()[0],
        IndexError::DocumentRejected { status: 400, kind, .. } if kind == "mapper_parsing_exception"
    ));
}
