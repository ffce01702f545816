//! End-to-end stage sequencing against the mock pipeline server.

use std::time::Duration;

use narrate_client::{PipelineClient, StageRequest, StageSequencer, StartOutcome};
use narrate_models::{JobState, Script, Stage};
use serde_json::json;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::{client, sse, video_file, RecordingSink};

const SCRIPT_TEXT: &str = "0:00: Boats leave the harbour\n0:05: Gulls circle the pier";

async fn mount_pipeline(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/upload_video"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": "Video uploaded successfully",
            "status": "success",
            "unique_filename": "5f0c_harbour.mp4",
            "video_url": "/static/uploads/5f0c_harbour.mp4"
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/stream_analysis_progress"))
        .and(query_param("video_filename", "5f0c_harbour.mp4"))
        .respond_with(sse(&[
            json!({"status": "in_progress", "progress": 50, "message": "Generating script"}),
            json!({
                "status": "complete",
                "script": [
                    {"time": "0:00", "description": "Boats leave the harbour"},
                    {"time": "0:05", "description": "Gulls circle the pier"}
                ]
            }),
        ]))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/generate_speech"))
        .and(body_json(json!({"script_text": SCRIPT_TEXT})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "audio_url": "/static/uploads/speech_5f0c.mp3"
        })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/merge_video_audio"))
        .respond_with(sse(&[
            json!({"status": "in_progress", "progress": 50, "message": "Merge: 50% complete"}),
            json!({"status": "complete", "merged_video_url": "/static/uploads/merged_5f0c.mp4"}),
        ]))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/upload_to_youtube"))
        .and(body_json(json!({
            "video_title": "Harbour morning",
            "video_description": "Narrated timelapse"
        })))
        .respond_with(sse(&[
            json!({"status": "in_progress", "progress": 30, "message": "Uploading to YouTube"}),
            json!({"status": "complete", "message": "Video uploaded to YouTube"}),
        ]))
        .mount(server)
        .await;
}

async fn finish(seq: &StageSequencer<PipelineClient>, request: StageRequest) -> JobState {
    match seq
        .start(request, &mut RecordingSink::default())
        .await
        .unwrap()
    {
        StartOutcome::Finished(job) => job.state,
        other => panic!("unexpected outcome {:?}", other),
    }
}

/// Test the whole pipeline, including the script round trip and cleanup.
#[tokio::test]
async fn test_full_pipeline() {
    let server = MockServer::start().await;
    mount_pipeline(&server).await;
    Mock::given(method("POST"))
        .and(path("/cleanup_files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": "Files cleaned up successfully"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let file = video_file(".mp4");
    let seq = StageSequencer::new(client(&server), Duration::from_secs(5));

    assert_eq!(finish(&seq, StageRequest::upload(file.path())).await, JobState::Succeeded);

    let unique_filename = seq.current().uploaded_video().unwrap().unique_filename.clone();
    assert_eq!(
        finish(&seq, StageRequest::Analyze { unique_filename }).await,
        JobState::Succeeded
    );

    // Script text goes out exactly as it was rendered for editing
    let script_text = seq.current().script().unwrap().to_text();
    assert_eq!(script_text, SCRIPT_TEXT);
    assert_eq!(
        Script::parse(&script_text).unwrap(),
        *seq.current().script().unwrap()
    );
    assert_eq!(
        finish(&seq, StageRequest::Synthesize { script_text }).await,
        JobState::Succeeded
    );

    assert_eq!(finish(&seq, StageRequest::Merge).await, JobState::Succeeded);
    assert_eq!(
        seq.current().merged_video_url(),
        Some("/static/uploads/merged_5f0c.mp4")
    );

    assert_eq!(
        finish(
            &seq,
            StageRequest::Publish {
                title: " Harbour morning ".to_string(),
                description: "Narrated timelapse".to_string(),
            },
        )
        .await,
        JobState::Succeeded
    );
    assert!(seq.current().is_complete());

    // Cleanup runs in the background
    for _ in 0..50 {
        let requests = server.received_requests().await.unwrap();
        if requests.iter().any(|r| r.url.path() == "/cleanup_files") {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("cleanup was never requested");
}

/// Test that a second start of a running stage sends nothing.
#[tokio::test]
async fn test_single_flight_analysis() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/stream_analysis_progress"))
        .respond_with(sse(&[json!({
            "status": "complete",
            "script": [{"time": "0:00", "description": "Boats leave the harbour"}]
        })]))
        .expect(1)
        .mount(&server)
        .await;
    mount_pipeline(&server).await;

    let file = video_file(".mp4");
    let seq = StageSequencer::new(client(&server), Duration::from_secs(5));
    assert_eq!(finish(&seq, StageRequest::upload(file.path())).await, JobState::Succeeded);

    let request = StageRequest::Analyze {
        unique_filename: "5f0c_harbour.mp4".to_string(),
    };
    let mut first_sink = RecordingSink::default();
    let mut second_sink = RecordingSink::default();
    let (first, second) = tokio::join!(
        seq.start(request.clone(), &mut first_sink),
        seq.start(request.clone(), &mut second_sink),
    );

    assert!(matches!(first.unwrap(), StartOutcome::Finished(ref job) if job.state == JobState::Succeeded));
    assert_eq!(second.unwrap(), StartOutcome::AlreadyRunning);
    assert!(second_sink.0.is_empty());
    assert_eq!(seq.job(Stage::Analyze).state, JobState::Succeeded);
}

/// Test that a failed merge leaves publish unavailable and can be retried.
#[tokio::test]
async fn test_failed_stage_gates_downstream() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/merge_video_audio"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "status": "error",
            "message": "Audio file not found in session"
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_pipeline(&server).await;

    let file = video_file(".mp4");
    let seq = StageSequencer::new(client(&server), Duration::from_secs(5));
    finish(&seq, StageRequest::upload(file.path())).await;
    finish(
        &seq,
        StageRequest::Analyze {
            unique_filename: "5f0c_harbour.mp4".to_string(),
        },
    )
    .await;
    finish(
        &seq,
        StageRequest::Synthesize {
            script_text: SCRIPT_TEXT.to_string(),
        },
    )
    .await;

    assert_eq!(finish(&seq, StageRequest::Merge).await, JobState::Failed);
    assert_eq!(
        seq.job(Stage::Merge).error_message.as_deref(),
        Some("Audio file not found in session")
    );
    assert!(!seq.can_start(Stage::Publish));

    assert_eq!(finish(&seq, StageRequest::Merge).await, JobState::Succeeded);
    assert!(seq.can_start(Stage::Publish));
}
