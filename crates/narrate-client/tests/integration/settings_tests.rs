//! Settings, cleanup and preview download tests.

use narrate_models::ServiceSettings;
use serde_json::json;
use wiremock::matchers::{body_string, body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::{client, RecordingSink};

/// Test that only the provided credentials are sent as form fields.
#[tokio::test]
async fn test_save_settings_form() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/save_settings"))
        .and(body_string("gemini_api_key=gm-123&youtube_client_id=client+id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": "Settings saved successfully!"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let settings = ServiceSettings {
        gemini_api_key: Some("gm-123".to_string()),
        youtube_client_id: Some("client id".to_string()),
        ..Default::default()
    };
    let message = client(&server).save_settings(&settings).await.unwrap();

    assert_eq!(message, "Settings saved successfully!");
}

/// Test that a rejected settings request surfaces the server error.
#[tokio::test]
async fn test_save_settings_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/save_settings"))
        .and(body_string_contains("youtube_api_key"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": "Could not write .env"
        })))
        .mount(&server)
        .await;

    let settings = ServiceSettings {
        youtube_api_key: Some("yt-456".to_string()),
        ..Default::default()
    };
    let err = client(&server).save_settings(&settings).await.unwrap_err();

    assert_eq!(err.to_string(), "Could not write .env");
}

/// Test the explicit cleanup call.
#[tokio::test]
async fn test_cleanup() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/cleanup_files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": "Files cleaned up successfully"
        })))
        .expect(1)
        .mount(&server)
        .await;

    client(&server).cleanup().await.unwrap();
}

/// Test downloading a produced video for preview.
#[tokio::test]
async fn test_download_preview() {
    let server = MockServer::start().await;
    let video = vec![7u8; 64 * 1024];
    Mock::given(method("GET"))
        .and(path("/static/uploads/merged_5f0c.mp4"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(video.clone(), "video/mp4"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("preview.mp4");
    let mut sink = RecordingSink::default();

    let written = client(&server)
        .download("/static/uploads/merged_5f0c.mp4", &dest, &mut sink)
        .await
        .unwrap();

    assert_eq!(written, video.len() as u64);
    assert_eq!(std::fs::read(&dest).unwrap(), video);
    assert_eq!(sink.fractions().last(), Some(&(100.0, false)));
}
