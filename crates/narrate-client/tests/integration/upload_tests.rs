//! Upload stage tests.

use std::time::Duration;

use narrate_client::{PipelineError, StageRequest, StageSequencer, StartOutcome, ValidationError};
use narrate_models::{JobState, Stage, StageOutput, UploadedVideo};
use serde_json::json;
use wiremock::matchers::{body_string_contains, header_regex, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::{client, track, video_file, RecordingSink};

/// Test a multipart upload decoded into the uploaded video reference.
#[tokio::test]
async fn test_upload_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload_video"))
        .and(header_regex("content-type", "^multipart/form-data"))
        .and(body_string_contains("name=\"video\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": "Video uploaded successfully",
            "status": "success",
            "unique_filename": "5f0c_harbour.mp4",
            "video_url": "/static/uploads/5f0c_harbour.mp4"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let file = video_file(".mp4");
    let mut sink = RecordingSink::default();
    let job = track(&client(&server), StageRequest::upload(file.path()), &mut sink).await;

    assert_eq!(job.state, JobState::Succeeded);
    assert_eq!(
        job.result,
        Some(StageOutput::Uploaded(UploadedVideo {
            unique_filename: "5f0c_harbour.mp4".to_string(),
            video_url: "/static/uploads/5f0c_harbour.mp4".to_string(),
        }))
    );
    assert_eq!(job.status_message, "Video uploaded successfully");
    assert_eq!(sink.fractions().last(), Some(&(100.0, false)));
}

/// Test that a failed upload never opens the analysis stream.
#[tokio::test]
async fn test_upload_error_skips_analysis() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload_video"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "File type not allowed"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/stream_analysis_progress"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let file = video_file(".mp4");
    let seq = StageSequencer::new(client(&server), Duration::from_secs(5));

    let outcome = seq
        .start(StageRequest::upload(file.path()), &mut RecordingSink::default())
        .await
        .unwrap();
    let StartOutcome::Finished(job) = outcome else {
        panic!("upload did not finish");
    };
    assert_eq!(job.state, JobState::Failed);
    assert_eq!(job.error_message.as_deref(), Some("File type not allowed"));

    assert!(!seq.can_start(Stage::Analyze));
    let err = seq
        .start(
            StageRequest::Analyze {
                unique_filename: "5f0c_harbour.mp4".to_string(),
            },
            &mut RecordingSink::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::NotReady { .. }));
}

/// Test that a non-video file is rejected without any request.
#[tokio::test]
async fn test_non_video_sends_nothing() {
    let server = MockServer::start().await;
    let file = video_file(".webp");
    let seq = StageSequencer::new(client(&server), Duration::from_secs(5));

    let err = seq
        .start(StageRequest::upload(file.path()), &mut RecordingSink::default())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Validation(ValidationError::NotVideo { .. })
    ));
    assert_eq!(seq.job(Stage::Upload).state, JobState::Idle);
    assert!(server.received_requests().await.unwrap().is_empty());
}

/// Test that a status-error body on a success response fails the upload.
#[tokio::test]
async fn test_upload_reported_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload_video"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "error",
            "error": "No selected file"
        })))
        .mount(&server)
        .await;

    let file = video_file(".mov");
    let job = track(
        &client(&server),
        StageRequest::upload(file.path()),
        &mut RecordingSink::default(),
    )
    .await;

    assert_eq!(job.state, JobState::Failed);
    assert_eq!(job.error_message.as_deref(), Some("No selected file"));
}

/// Test that a status-error body on a success response blocks analysis too.
#[tokio::test]
async fn test_upload_reported_error_blocks_analysis() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload_video"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "error",
            "error": "No selected file"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/stream_analysis_progress"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let file = video_file(".mp4");
    let seq = StageSequencer::new(client(&server), Duration::from_secs(5));

    let outcome = seq
        .start(StageRequest::upload(file.path()), &mut RecordingSink::default())
        .await
        .unwrap();
    let StartOutcome::Finished(job) = outcome else {
        panic!("upload did not finish");
    };
    assert_eq!(job.state, JobState::Failed);
    assert_eq!(job.error_message.as_deref(), Some("No selected file"));
    assert_eq!(seq.job(Stage::Upload).state, JobState::Failed);
    assert!(seq.current().uploaded_video().is_none());

    let err = seq
        .start(
            StageRequest::Analyze {
                unique_filename: "5f0c_harbour.mp4".to_string(),
            },
            &mut RecordingSink::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::NotReady {
            stage: Stage::Analyze,
            blocked_by: Stage::Upload
        }
    ));
}
