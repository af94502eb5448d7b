//! Mock HTTP tests for ProviderClient.
//!
//! These tests cover:
//! - Authentication and request formatting
//! - Status parsing
//! - Error classification
//! - Avatar listing with the sample fallback
//! - Video download

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ugc_studio::catalog::{avatars_or_samples, sample_avatars};
use ugc_studio::provider::{
    JobRequest, JobStatus, ProviderClient, ProviderError, ProviderGateway, PROVIDER_API_BASE_URL,
};

fn request() -> JobRequest {
    JobRequest {
        avatar_id: "avatar-3".to_string(),
        voice_id: "voice-2".to_string(),
        voice_type: "text".to_string(),
        script: "Hello from Acme".to_string(),
        name: None,
    }
}

async fn client_for(server: &MockServer) -> ProviderClient {
    let client = ProviderClient::new(server.uri()).unwrap();
    client.configure("test-api-key".to_string());
    client
}

// === Client Creation Tests ===

#[test]
fn test_new_client_has_no_credential() {
    let client = ProviderClient::new(PROVIDER_API_BASE_URL).unwrap();
    assert_eq!(client.base_url(), PROVIDER_API_BASE_URL);
    assert!(!client.has_credential());

    client.configure("".to_string());
    assert!(!client.has_credential());

    client.configure("sk-1".to_string());
    assert!(client.has_credential());
}

#[test]
fn test_base_url_trailing_slash_trimmed() {
    let client = ProviderClient::new("https://custom.api/v1/").unwrap();
    assert_eq!(client.base_url(), "https://custom.api/v1");
}

#[tokio::test]
async fn test_calls_without_credential_fail_before_network() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = ProviderClient::new(server.uri()).unwrap();
    let submit = client.submit_job(&request()).await;
    assert!(matches!(submit, Err(ProviderError::MissingCredential)));

    let poll = client.poll_status("vid-1").await;
    assert!(matches!(poll, Err(ProviderError::MissingCredential)));
}

// === Submission Tests ===

#[tokio::test]
async fn test_submit_sends_bearer_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/video_generation"))
        .and(header("Authorization", "Bearer test-api-key"))
        .and(body_json(json!({
            "avatar": { "avatar_id": "avatar-3" },
            "voice": { "voice_id": "voice-2", "voice_type": "text" },
            "text": "Hello from Acme",
            "name": "UGC Ad"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "video_id": "vid-42" })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let job_id = client.submit_job(&request()).await.unwrap();
    assert_eq!(job_id, "vid-42");
}

#[tokio::test]
async fn test_submit_without_video_id_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/video_generation"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "ok" })))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let result = client.submit_job(&request()).await;
    assert!(matches!(result, Err(ProviderError::InvalidResponse(_))));
    assert!(result.unwrap_err().is_unavailable());
}

#[tokio::test]
async fn test_submit_rejection_carries_provider_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/video_generation"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({ "message": "avatar not found" })),
        )
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    match client.submit_job(&request()).await {
        Err(ProviderError::InvalidRequest { status, message }) => {
            assert_eq!(status, 400);
            assert_eq!(message, "avatar not found");
        }
        other => panic!("Expected InvalidRequest, got {:?}", other),
    }
}

#[tokio::test]
async fn test_submit_unauthorized_is_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let error = client.submit_job(&request()).await.unwrap_err();
    assert!(matches!(error, ProviderError::InvalidRequest { status: 401, .. }));
    assert!(!error.is_unavailable());
}

#[tokio::test]
async fn test_server_errors_are_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let error = client.submit_job(&request()).await.unwrap_err();
    assert!(error.is_unavailable());
    assert_eq!(error.retry_after_secs(), None);
}

#[tokio::test]
async fn test_rate_limit_reads_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/video_generation/vid-1"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let error = client.poll_status("vid-1").await.unwrap_err();
    assert!(error.is_unavailable());
    assert_eq!(error.retry_after_secs(), Some(7));
}

#[tokio::test]
async fn test_unreachable_provider_is_unavailable() {
    // Nothing listens on the discard port
    let client = ProviderClient::new("http://127.0.0.1:9").unwrap();
    client.configure("test-api-key".to_string());
    let error = client.submit_job(&request()).await.unwrap_err();
    assert!(matches!(error, ProviderError::Unavailable { .. }));
}

// === Status Tests ===

async fn poll_with_body(body: serde_json::Value) -> Result<JobStatus, ProviderError> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/video_generation/vid-1"))
        .and(header("Authorization", "Bearer test-api-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;
    client_for(&server).await.poll_status("vid-1").await
}

#[tokio::test]
async fn test_poll_in_progress_statuses() {
    assert_eq!(
        poll_with_body(json!({ "status": "pending" })).await.unwrap(),
        JobStatus::Pending
    );
    assert_eq!(
        poll_with_body(json!({ "status": "waiting" })).await.unwrap(),
        JobStatus::Pending
    );
    assert_eq!(
        poll_with_body(json!({ "status": "processing" })).await.unwrap(),
        JobStatus::Processing
    );
}

#[tokio::test]
async fn test_poll_completed_with_url() {
    let status = poll_with_body(json!({ "status": "completed", "url": "https://x/video.mp4" }))
        .await
        .unwrap();
    assert_eq!(
        status,
        JobStatus::Completed {
            video_url: "https://x/video.mp4".to_string()
        }
    );
    assert!(status.is_terminal());
}

#[tokio::test]
async fn test_poll_completed_without_url_is_invalid() {
    let result = poll_with_body(json!({ "status": "completed" })).await;
    assert!(matches!(result, Err(ProviderError::InvalidResponse(_))));
}

#[tokio::test]
async fn test_poll_failed_keeps_error() {
    let status = poll_with_body(json!({ "status": "failed", "error": "bad audio" }))
        .await
        .unwrap();
    assert_eq!(
        status,
        JobStatus::Failed {
            error: "bad audio".to_string()
        }
    );

    let status = poll_with_body(json!({ "status": "failed" })).await.unwrap();
    assert!(matches!(status, JobStatus::Failed { .. }));
}

#[tokio::test]
async fn test_poll_unknown_status_is_invalid() {
    let result = poll_with_body(json!({ "status": "exploded" })).await;
    assert!(matches!(result, Err(ProviderError::InvalidResponse(_))));
}

#[tokio::test]
async fn test_poll_malformed_body_is_invalid() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;
    let result = client_for(&server).await.poll_status("vid-1").await;
    assert!(matches!(result, Err(ProviderError::InvalidResponse(_))));
}

// === Avatar Tests ===

#[tokio::test]
async fn test_list_avatars_accepts_provider_field_names() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/avatars"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "avatars": [
                {
                    "avatar_id": "av-1",
                    "avatar_name": "Riley",
                    "preview_image_url": "https://img/riley.png",
                    "gender": "female"
                }
            ]
        })))
        .mount(&server)
        .await;

    let avatars = client_for(&server).await.list_avatars().await.unwrap();
    assert_eq!(avatars.len(), 1);
    assert_eq!(avatars[0].id, "av-1");
    assert_eq!(avatars[0].name, "Riley");
    assert_eq!(avatars[0].image_url, "https://img/riley.png");
}

#[tokio::test]
async fn test_list_avatars_failures_are_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/avatars"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let error = client.list_avatars().await.unwrap_err();
    assert!(matches!(error, ProviderError::Unavailable { .. }));

    let anonymous = ProviderClient::new(server.uri()).unwrap();
    let error = anonymous.list_avatars().await.unwrap_err();
    assert!(matches!(error, ProviderError::Unavailable { .. }));
}

#[tokio::test]
async fn test_avatars_fall_back_to_samples() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/avatars"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let avatars = avatars_or_samples(&client).await;
    assert_eq!(avatars, sample_avatars());
}

#[tokio::test]
async fn test_empty_avatar_list_falls_back_to_samples() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/avatars"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "avatars": [] })))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    assert_eq!(avatars_or_samples(&client).await.len(), sample_avatars().len());
}

// === Download Tests ===

#[tokio::test]
async fn test_download_video_writes_file() {
    let server = MockServer::start().await;
    let bytes = vec![0u8, 1, 2, 3, 4, 5, 6, 7];
    Mock::given(method("GET"))
        .and(path("/files/video.mp4"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(bytes.clone()))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("out").join("video.mp4");
    let client = ProviderClient::new(server.uri()).unwrap();
    let url = format!("{}/files/video.mp4", server.uri());

    let written = client.download_video(&url, &dest).await.unwrap();
    assert_eq!(written, dest);
    assert_eq!(std::fs::read(&dest).unwrap(), bytes);
}

#[tokio::test]
async fn test_download_video_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let client = ProviderClient::new(server.uri()).unwrap();
    let url = format!("{}/missing.mp4", server.uri());
    let result = client.download_video(&url, &dir.path().join("v.mp4")).await;
    assert!(matches!(
        result,
        Err(ProviderError::InvalidRequest { status: 404, .. })
    ));
}
