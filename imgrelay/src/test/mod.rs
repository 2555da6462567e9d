//! End-to-end tests: upload client → relay on a real socket → fake image host.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use bytes::Bytes;
use tokio::sync::Mutex;
use wiremock::matchers::{header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::Application;
use crate::api::models::upload::{ProviderResponse, UploadRequest};
use crate::client::{Clipboard, ClientError, FileCandidate, UploadClient};
use crate::errors::Result;
use crate::provider::ImageHost;
use crate::test_utils::{TEST_API_KEY, create_test_config, png_bytes, spawn_relay};

struct NoClipboard;

#[async_trait]
impl Clipboard for NoClipboard {
    async fn write_text(&self, _text: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

fn client_for(base_url: &str) -> UploadClient {
    UploadClient::new(base_url.parse().unwrap(), Arc::new(NoClipboard)).unwrap()
}

fn png_candidate(len: usize) -> FileCandidate {
    FileCandidate::new(png_bytes(len), "a.png", "image/png")
}

fn hosted(url: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "status_code": 200,
        "status_txt": "OK",
        "image": { "url": url }
    }))
}

/// Binds and immediately releases a port so nothing is listening on it.
fn closed_port_uri() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{port}")
}

#[test_log::test(tokio::test)]
async fn test_e2e_upload_returns_hosted_url() {
    let provider = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/1/upload"))
        .and(header("X-API-Key", TEST_API_KEY))
        .and(header_exists("content-type"))
        .respond_with(hosted("https://host/x.png"))
        .expect(1)
        .mount(&provider)
        .await;

    let relay = spawn_relay(Application::new(create_test_config(&provider.uri())).unwrap()).await;
    let client = client_for(&relay.base_url());

    assert!(client.select_file(png_candidate(2048)));
    let url = client.submit().await.unwrap();

    assert_eq!(url, "https://host/x.png");
    assert_eq!(client.state().uploaded_link(), Some("https://host/x.png"));

    let received = provider.received_requests().await.unwrap();
    let body = String::from_utf8_lossy(&received[0].body);
    assert!(body.contains("name=\"source\""));
    assert!(body.contains("filename=\"a.png\""));
    assert!(body.contains("image/png"));
}

#[test_log::test(tokio::test)]
async fn test_missing_field_never_reaches_provider() {
    let provider = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(hosted("https://host/x.png"))
        .expect(0)
        .mount(&provider)
        .await;

    let relay = spawn_relay(Application::new(create_test_config(&provider.uri())).unwrap()).await;

    let form = reqwest::multipart::Form::new().part(
        "file",
        reqwest::multipart::Part::bytes(png_bytes(64))
            .file_name("a.png")
            .mime_str("image/png")
            .unwrap(),
    );
    let response = reqwest::Client::new()
        .post(format!("{}/api/upload", relay.base_url()))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "No file found in the request");
}

#[test_log::test(tokio::test)]
async fn test_provider_rejection_forwarded_unchanged() {
    let rejection = r#"{"status_code":400,"error":{"message":"Invalid API key","code":100},"status_txt":"Bad Request"}"#;
    let provider = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_raw(rejection, "application/json"))
        .mount(&provider)
        .await;

    let relay = spawn_relay(Application::new(create_test_config(&provider.uri())).unwrap()).await;

    let form = reqwest::multipart::Form::new().part(
        "source",
        reqwest::multipart::Part::bytes(png_bytes(64))
            .file_name("a.png")
            .mime_str("image/png")
            .unwrap(),
    );
    let response = reqwest::Client::new()
        .post(format!("{}/api/upload", relay.base_url()))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.text().await.unwrap(), rejection);

    let client = client_for(&relay.base_url());
    client.select_file(png_candidate(64));
    let err = client.submit().await.unwrap_err();

    assert_eq!(
        err,
        ClientError::RelayUnreachable {
            status: Some(400),
            message: Some("Invalid API key".to_string()),
        }
    );
}

#[test_log::test(tokio::test)]
async fn test_unreachable_provider_hides_credential() {
    let relay = spawn_relay(Application::new(create_test_config(&closed_port_uri())).unwrap()).await;
    let client = client_for(&relay.base_url());

    client.select_file(png_candidate(256));
    let err = client.submit().await.unwrap_err();

    assert!(matches!(err, ClientError::RelayUnreachable { status: Some(500), .. }));
    let message = client.state().error_message().unwrap().to_string();
    assert_eq!(message, "Failed to reach the image host");
    assert!(!message.contains(TEST_API_KEY));
    assert!(!client.is_uploading());
}

#[test_log::test(tokio::test)]
async fn test_slow_provider_times_out() {
    let provider = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(hosted("https://host/x.png").set_delay(Duration::from_secs(2)))
        .mount(&provider)
        .await;

    let mut config = create_test_config(&provider.uri());
    config.provider.timeout = Duration::from_millis(200);
    let relay = spawn_relay(Application::new(config).unwrap()).await;
    let client = client_for(&relay.base_url());

    client.select_file(png_candidate(256));
    let err = client.submit().await.unwrap_err();

    assert_eq!(
        err,
        ClientError::RelayUnreachable {
            status: Some(500),
            message: Some("Image host did not respond in time".to_string()),
        }
    );
}

#[test_log::test(tokio::test)]
async fn test_identical_uploads_are_independent() {
    let provider = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(hosted("https://host/first.png"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&provider)
        .await;
    Mock::given(method("POST"))
        .respond_with(hosted("https://host/second.png"))
        .expect(1)
        .mount(&provider)
        .await;

    let relay = spawn_relay(Application::new(create_test_config(&provider.uri())).unwrap()).await;
    let client = client_for(&relay.base_url());

    client.select_file(png_candidate(512));
    let first = client.submit().await.unwrap();
    let second = client.submit().await.unwrap();

    assert_eq!(first, "https://host/first.png");
    assert_eq!(second, "https://host/second.png");
}

/// Records what the relay handed over instead of talking to a network.
#[derive(Default)]
struct RecordingHost {
    calls: AtomicUsize,
    last: Mutex<Option<UploadRequest>>,
}

#[async_trait]
impl ImageHost for RecordingHost {
    async fn upload(&self, request: UploadRequest) -> Result<ProviderResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().await = Some(request);
        Ok(ProviderResponse {
            status: StatusCode::OK,
            body: Bytes::from_static(br#"{"status_code":200,"image":{"url":"https://host/recorded.png"}}"#),
        })
    }
}

#[test_log::test(tokio::test)]
async fn test_relay_hands_file_to_image_host() {
    let host = Arc::new(RecordingHost::default());
    let app = Application::with_image_host(create_test_config(&closed_port_uri()), host.clone()).unwrap();
    let relay = spawn_relay(app).await;
    let client = client_for(&relay.base_url());

    let candidate = FileCandidate::new(png_bytes(1500), "holiday photo.jpg", "image/jpeg");
    client.select_file(candidate.clone());
    let url = client.submit().await.unwrap();

    assert_eq!(url, "https://host/recorded.png");
    assert_eq!(host.calls.load(Ordering::SeqCst), 1);

    let request = host.last.lock().await.take().unwrap();
    assert_eq!(request.bytes, candidate.bytes);
    assert_eq!(request.filename, "holiday photo.jpg");
    assert_eq!(request.content_type, "image/jpeg");
}

#[test_log::test(tokio::test)]
async fn test_oversized_file_never_reaches_image_host() {
    let host = Arc::new(RecordingHost::default());
    let mut config = create_test_config(&closed_port_uri());
    config.limits.max_file_size = 1024;
    let relay = spawn_relay(Application::with_image_host(config, host.clone()).unwrap()).await;
    let client = client_for(&relay.base_url());

    client.select_file(png_candidate(4096));
    let err = client.submit().await.unwrap_err();

    assert!(matches!(err, ClientError::RelayUnreachable { status: Some(413), .. }));
    assert_eq!(host.calls.load(Ordering::SeqCst), 0);
}
