//! Pipeline server HTTP client.

use std::path::Path;

use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client};
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};
use url::Url;

use narrate_models::{PublishRequest, ServiceSettings, SpeechRequest, StageFrame};

use crate::config::ClientConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::progress::ProgressSink;
use crate::request::StageRequest;
use crate::transport::{ensure_success, from_response, FrameStream};

const UPLOAD_PATH: &str = "upload_video";
const ANALYSIS_STREAM_PATH: &str = "stream_analysis_progress";
const SPEECH_PATH: &str = "generate_speech";
const MERGE_PATH: &str = "merge_video_audio";
const PUBLISH_PATH: &str = "upload_to_youtube";
const CLEANUP_PATH: &str = "cleanup_files";
const SETTINGS_PATH: &str = "save_settings";

/// Network side of the stage sequencer.
///
/// `open` performs a stage's start call and returns the stream that reports
/// on it. A failed start call is returned as an error and no stream is
/// opened.
#[async_trait]
pub trait StageBackend: Send + Sync {
    async fn open(&self, request: &StageRequest) -> PipelineResult<FrameStream>;

    /// Release server-side files after a successful publish.
    async fn cleanup(&self) -> PipelineResult<()>;
}

#[derive(Debug, Deserialize)]
struct SettingsResponse {
    #[serde(default)]
    message: String,
}

/// Client for the pipeline server.
#[derive(Clone)]
pub struct PipelineClient {
    http: Client,
    base_url: Url,
    config: ClientConfig,
}

impl PipelineClient {
    /// Create a new pipeline client.
    ///
    /// Cookies are kept across calls: the server tracks the session's
    /// uploaded, synthesized and merged files in a cookie session.
    pub fn new(config: ClientConfig) -> PipelineResult<Self> {
        let http = Client::builder()
            .connect_timeout(config.connect_timeout)
            .cookie_store(true)
            .build()
            .map_err(PipelineError::Network)?;

        let mut base = config.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)?;

        Ok(Self {
            http,
            base_url,
            config,
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> PipelineResult<Self> {
        Self::new(ClientConfig::from_env())
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Resolve a server path or a URL returned by the server.
    pub fn resolve(&self, path: &str) -> PipelineResult<Url> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    /// Upload a video as multipart field `video`.
    ///
    /// The body is streamed from disk; bytes sent are reported as progress
    /// frames ahead of the terminal frame decoded from the response.
    pub async fn upload_video(&self, path: &Path, mime: &str) -> PipelineResult<FrameStream> {
        let url = self.resolve(UPLOAD_PATH)?;
        let file = tokio::fs::File::open(path).await?;
        let total = file.metadata().await?.len();
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video".to_string());

        let (tx, rx) = mpsc::unbounded_channel::<u64>();
        let mut sent = 0u64;
        let body = ReaderStream::new(file).map(move |chunk| {
            if let Ok(bytes) = &chunk {
                sent += bytes.len() as u64;
                let _ = tx.send(sent);
            }
            chunk
        });

        let part = Part::stream_with_length(Body::wrap_stream(body), total)
            .file_name(file_name)
            .mime_str(mime)?;
        let request = self
            .http
            .post(url.clone())
            .multipart(Form::new().part("video", part))
            .timeout(self.config.request_timeout);

        debug!("Uploading {} bytes to {}", total, url);

        let progress = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|sent| (sent, rx))
        })
        .map(move |sent| Ok::<_, PipelineError>(upload_progress_frame(sent, total)));

        let outcome = stream::once(async move {
            let response = ensure_success(request.send().await?).await?;
            let body = response.text().await?;
            debug!("Upload response: {}", body);
            Ok::<_, PipelineError>(StageFrame::parse(&body)?)
        });

        Ok(Box::pin(stream::select(progress, outcome)))
    }

    /// Subscribe to analysis progress for an uploaded video.
    pub async fn analysis_stream(&self, unique_filename: &str) -> PipelineResult<FrameStream> {
        let url = self.resolve(ANALYSIS_STREAM_PATH)?;
        debug!("Opening analysis stream for {}", unique_filename);
        let response = self
            .http
            .get(url)
            .query(&[("video_filename", unique_filename)])
            .send()
            .await?;
        Ok(from_response(ensure_success(response).await?))
    }

    /// Request speech synthesis for an edited script.
    pub async fn synthesize(&self, request: &SpeechRequest) -> PipelineResult<FrameStream> {
        let url = self.resolve(SPEECH_PATH)?;
        let response = self.http.post(url).json(request).send().await?;
        Ok(from_response(ensure_success(response).await?))
    }

    /// Merge the synthesized audio into the uploaded video.
    pub async fn merge(&self) -> PipelineResult<FrameStream> {
        let url = self.resolve(MERGE_PATH)?;
        let response = self.http.post(url).send().await?;
        Ok(from_response(ensure_success(response).await?))
    }

    /// Publish the merged video to the hosting platform.
    pub async fn publish(&self, request: &PublishRequest) -> PipelineResult<FrameStream> {
        let url = self.resolve(PUBLISH_PATH)?;
        let response = self.http.post(url).json(request).send().await?;
        Ok(from_response(ensure_success(response).await?))
    }

    /// Ask the server to delete the session's files.
    pub async fn cleanup(&self) -> PipelineResult<()> {
        let url = self.resolve(CLEANUP_PATH)?;
        let response = self
            .http
            .post(url)
            .timeout(self.config.request_timeout)
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    /// Apply service credentials on the server. Returns the server message.
    pub async fn save_settings(&self, settings: &ServiceSettings) -> PipelineResult<String> {
        let url = self.resolve(SETTINGS_PATH)?;
        let response = self
            .http
            .post(url)
            .form(settings)
            .timeout(self.config.request_timeout)
            .send()
            .await?;
        let response: SettingsResponse = ensure_success(response).await?.json().await?;
        Ok(response.message)
    }

    /// Download a produced media file for local preview.
    ///
    /// Returns the number of bytes written.
    pub async fn download(
        &self,
        url: &str,
        dest: &Path,
        sink: &mut dyn ProgressSink,
    ) -> PipelineResult<u64> {
        let url = self.resolve(url)?;
        let response = ensure_success(self.http.get(url.clone()).send().await?).await?;
        let total = response.content_length().unwrap_or(0);

        let mut file = tokio::fs::File::create(dest).await?;
        let mut body = response.bytes_stream();
        let mut written = 0u64;

        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;

            if total > 0 {
                let percent = written as f64 / total as f64 * 100.0;
                sink.render(percent, &format!("Download: {:.1}%", percent));
            }
        }
        file.flush().await?;
        sink.render(100.0, "Download complete");

        info!("Downloaded {} bytes from {} to {}", written, url, dest.display());
        Ok(written)
    }
}

fn upload_progress_frame(sent: u64, total: u64) -> StageFrame {
    let percent = if total == 0 {
        100.0
    } else {
        sent as f64 / total as f64 * 100.0
    };
    StageFrame::in_progress(percent, format!("File upload: {:.1}%", percent))
}

#[async_trait]
impl StageBackend for PipelineClient {
    async fn open(&self, request: &StageRequest) -> PipelineResult<FrameStream> {
        match request {
            StageRequest::Upload { path, mime } => self.upload_video(path, mime).await,
            StageRequest::Analyze { unique_filename } => {
                self.analysis_stream(unique_filename).await
            }
            StageRequest::Synthesize { .. } => {
                let body = request
                    .speech_request()
                    .ok_or_else(|| PipelineError::transport("Missing speech request"))??;
                self.synthesize(&body).await
            }
            StageRequest::Merge => self.merge().await,
            StageRequest::Publish { .. } => {
                let body = request
                    .publish_request()
                    .ok_or_else(|| PipelineError::transport("Missing publish request"))?;
                self.publish(&body).await
            }
        }
    }

    async fn cleanup(&self) -> PipelineResult<()> {
        PipelineClient::cleanup(self).await
    }
}
