//! Shared fixtures for the pipeline server integration tests.

mod sequencer_tests;
mod settings_tests;
mod upload_tests;

use std::io::Write;
use std::time::Duration;

use narrate_client::{
    ClientConfig, JobTracker, PipelineClient, ProgressDisplay, ProgressSink, StageBackend,
    StageRequest,
};
use narrate_models::{PipelineJob, RunId};
use serde_json::Value;
use wiremock::{MockServer, ResponseTemplate};

/// Client pointed at the mock server.
pub fn client(server: &MockServer) -> PipelineClient {
    PipelineClient::new(
        ClientConfig::default()
            .with_base_url(server.uri())
            .with_idle_timeout(Duration::from_secs(5)),
    )
    .unwrap()
}

/// Push-stream response carrying the given frames.
pub fn sse(frames: &[Value]) -> ResponseTemplate {
    let body: String = frames
        .iter()
        .map(|frame| format!("data: {}\n\n", frame))
        .collect();
    ResponseTemplate::new(200).set_body_raw(body, "text/event-stream")
}

/// Small non-empty file with a video extension.
pub fn video_file(suffix: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(b"\x00\x00\x00\x18ftypmp42isom").unwrap();
    file
}

#[derive(Default)]
pub struct RecordingSink(pub Vec<ProgressDisplay>);

impl ProgressSink for RecordingSink {
    fn show(&mut self, display: &ProgressDisplay) {
        self.0.push(display.clone());
    }
}

impl RecordingSink {
    pub fn fractions(&self) -> Vec<(f64, bool)> {
        self.0.iter().map(|d| (d.fraction, d.visible)).collect()
    }
}

/// Run one stage through a fresh tracker.
pub async fn track(
    client: &PipelineClient,
    request: StageRequest,
    sink: &mut dyn ProgressSink,
) -> PipelineJob {
    let mut tracker = JobTracker::new(request.stage(), &RunId::new(), Duration::from_secs(5));
    tracker.begin(&request).unwrap();
    match client.open(&request).await {
        Ok(stream) => tracker.attach(stream),
        Err(e) => tracker.fail(&e, sink),
    }
    tracker.run(sink).await.clone()
}
