//! HTTP backend integration tests
//!
//! Exercises `ApiClient` and `HttpObjectStore` against a mock server, then
//! runs the whole coordinator over HTTP.

use bytes::Bytes;
use kb_uploadr::api::{ApiClient, HttpObjectStore};
use kb_uploadr::upload::{
    CoordinatorOptions, DocumentKind, DocumentRegistrar, DocumentRegistration, ObjectStore,
    SignedUrlIssuer, SignedUrlRequest, UploadCoordinator, UploadError, UploadFile, UploadStatus,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_bytes, body_json, header, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn api_client(server: &MockServer) -> ApiClient {
    ApiClient::new(
        &server.uri(),
        Some("test-token".to_string()),
        Duration::from_secs(5),
    )
    .unwrap()
}

fn signed_url_request() -> SignedUrlRequest {
    SignedUrlRequest {
        bucket: "knowledge-base".into(),
        key: "kb/kb-1/abc-a.pdf".into(),
        content_type: "application/pdf".into(),
        metadata: HashMap::from([("original_name".to_string(), "a.pdf".to_string())]),
    }
}

fn registration(url: &str) -> DocumentRegistration {
    DocumentRegistration {
        knowledge_base_id: "kb-1".into(),
        name: "a.pdf".into(),
        url: url.into(),
        file_type: DocumentKind::Pdf,
        size: 2048,
    }
}

// ============================================================================
// Signed URL issuer
// ============================================================================

#[tokio::test]
async fn test_signed_url_request_body_and_auth() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/storage/signed-url"))
        .and(header("authorization", "Bearer test-token"))
        .and(body_json(json!({
            "bucket": "knowledge-base",
            "key": "kb/kb-1/abc-a.pdf",
            "contentType": "application/pdf",
            "metadata": {"original_name": "a.pdf"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "url": "https://storage.test/kb/kb-1/abc-a.pdf?X-Amz-Signature=sig"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let url = tokio_test::assert_ok!(api_client(&server).signed_url(&signed_url_request()).await);
    assert_eq!(
        url,
        "https://storage.test/kb/kb-1/abc-a.pdf?X-Amz-Signature=sig"
    );
}

#[tokio::test]
async fn test_signed_url_accepts_signed_url_field() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/storage/signed-url"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "signedUrl": "https://storage.test/obj?sig=1"
        })))
        .mount(&server)
        .await;

    let url = api_client(&server)
        .signed_url(&signed_url_request())
        .await
        .unwrap();
    assert_eq!(url, "https://storage.test/obj?sig=1");
}

#[tokio::test]
async fn test_signed_url_rejection_is_acquisition_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/storage/signed-url"))
        .respond_with(ResponseTemplate::new(403).set_body_string("bucket not allowed"))
        .mount(&server)
        .await;

    let err = api_client(&server)
        .signed_url(&signed_url_request())
        .await
        .unwrap_err();
    match err {
        UploadError::Acquisition(message) => {
            assert!(message.contains("403"));
            assert!(message.contains("bucket not allowed"));
        }
        other => panic!("Expected acquisition error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_signed_url_unreachable_is_acquisition_error() {
    let client = ApiClient::new("http://127.0.0.1:1", None, Duration::from_secs(1)).unwrap();
    let result = client.signed_url(&signed_url_request()).await;
    assert!(matches!(result, Err(UploadError::Acquisition(_))));
}

// ============================================================================
// Object store
// ============================================================================

#[tokio::test]
async fn test_put_sends_bytes_and_content_type() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/kb/a.pdf"))
        .and(query_param("X-Amz-Signature", "sig"))
        .and(header("content-type", "application/pdf"))
        .and(body_bytes(b"%PDF-1.7".to_vec()))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let store = HttpObjectStore::new(Duration::from_secs(5)).unwrap();
    let url = format!("{}/kb/a.pdf?X-Amz-Signature=sig", server.uri());
    store
        .put(&url, Bytes::from_static(b"%PDF-1.7"), "application/pdf")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_put_non_success_is_transfer_error() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(403).set_body_string("SignatureDoesNotMatch"))
        .mount(&server)
        .await;

    let store = HttpObjectStore::new(Duration::from_secs(5)).unwrap();
    let url = format!("{}/kb/a.pdf?X-Amz-Signature=bad", server.uri());
    let err = store
        .put(&url, Bytes::from_static(b"data"), "application/pdf")
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::Transfer(ref m) if m.contains("SignatureDoesNotMatch")));
}

// ============================================================================
// Document registrar
// ============================================================================

#[tokio::test]
async fn test_register_posts_metadata_and_parses_document() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/knowledge-bases/kb-1/documents"))
        .and(body_json(json!({
            "name": "a.pdf",
            "url": "https://storage.test/kb/a.pdf",
            "fileType": "pdf",
            "size": 2048
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "doc-123",
            "name": "a.pdf",
            "url": "https://storage.test/kb/a.pdf",
            "fileType": "pdf",
            "size": 2048,
            "knowledgeBaseId": "kb-1",
            "createdAt": "2026-10-16T09:00:00Z"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let document = api_client(&server)
        .register(&registration("https://storage.test/kb/a.pdf"))
        .await
        .unwrap();
    assert_eq!(document.id, "doc-123");
    assert_eq!(document.file_type, DocumentKind::Pdf);
    assert_eq!(document.knowledge_base_id.as_deref(), Some("kb-1"));
    assert!(document.created_at.is_some());
}

#[tokio::test]
async fn test_register_encodes_knowledge_base_id_in_path() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/knowledge-bases/team%2Fcoach%231/documents"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "doc-9",
            "name": "a.pdf",
            "url": "https://storage.test/kb/a.pdf",
            "fileType": "pdf",
            "size": 2048
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut request = registration("https://storage.test/kb/a.pdf");
    request.knowledge_base_id = "team/coach#1".into();

    let document = api_client(&server).register(&request).await.unwrap();
    assert_eq!(document.id, "doc-9");
}

#[tokio::test]
async fn test_register_invalid_body_is_registration_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/knowledge-bases/kb-1/documents"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let result = api_client(&server)
        .register(&registration("https://storage.test/kb/a.pdf"))
        .await;
    assert!(matches!(result, Err(UploadError::Registration(_))));
}

// ============================================================================
// End to end over HTTP
// ============================================================================

#[tokio::test]
async fn test_coordinator_over_http() {
    let server = MockServer::start().await;
    let storage_base = format!("{}/bucket", server.uri());

    Mock::given(method("POST"))
        .and(path("/storage/signed-url"))
        .respond_with(move |request: &wiremock::Request| {
            let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
            let key = body["key"].as_str().unwrap().to_string();
            ResponseTemplate::new(200).set_body_json(json!({
                "url": format!("{}/{}?X-Amz-Signature=sig", storage_base, key)
            }))
        })
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path_regex(r"^/bucket/kb/kb-1/.*-a\.pdf$"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path_regex(r"^/bucket/kb/kb-1/.*-b\.pdf$"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/knowledge-bases/kb-1/documents"))
        .respond_with(|request: &wiremock::Request| {
            let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
            assert!(!body["url"].as_str().unwrap().contains('?'));
            ResponseTemplate::new(201).set_body_json(json!({
                "id": "doc-a",
                "name": body["name"],
                "url": body["url"],
                "fileType": body["fileType"],
                "size": body["size"]
            }))
        })
        .expect(1)
        .mount(&server)
        .await;

    let api = Arc::new(api_client(&server));
    let coordinator = UploadCoordinator::builder()
        .issuer(api.clone())
        .registrar(api)
        .object_store(Arc::new(HttpObjectStore::new(Duration::from_secs(5)).unwrap()))
        .options(CoordinatorOptions::new("kb-1", "knowledge-base"))
        .build()
        .unwrap();

    let tasks = coordinator
        .submit(vec![
            UploadFile::new("a.pdf", "application/pdf", Bytes::from(vec![1u8; 2048])),
            UploadFile::new("b.pdf", "application/pdf", Bytes::from(vec![2u8; 3072])),
        ])
        .await;

    assert_eq!(tasks[0].status(), UploadStatus::Completed);
    assert_eq!(tasks[0].document().unwrap().id, "doc-a");
    assert_eq!(tasks[0].document().unwrap().size, 2048);
    assert_eq!(tasks[1].status(), UploadStatus::Error);
    assert!(tasks[1].error().unwrap().contains("500"));
}
