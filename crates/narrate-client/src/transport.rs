//! Update transports.
//!
//! A stage reports its progress either over a long-lived event stream or in
//! the body of a single response. Both are exposed as a [`FrameStream`] so
//! the tracker handles them the same way. Dropping a `FrameStream` closes
//! the underlying connection.

use std::collections::VecDeque;
use std::pin::Pin;

use futures_util::{stream, Stream, StreamExt};
use reqwest::header::CONTENT_TYPE;
use reqwest::Response;
use serde_json::Value;
use tracing::debug;

use narrate_models::StageFrame;

use crate::error::{PipelineError, PipelineResult};

/// Ordered updates for one in-flight stage.
pub type FrameStream = Pin<Box<dyn Stream<Item = PipelineResult<StageFrame>> + Send>>;

/// Incremental decoder for `text/event-stream` bodies.
///
/// Collects `data:` lines until a blank line ends the event. Comment lines
/// and other fields are skipped. A bare line starting with `{` is taken as
/// a complete newline-delimited JSON frame.
#[derive(Debug, Default)]
pub struct SseDecoder {
    line: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of body bytes; returns the payloads completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut payloads = Vec::new();
        for &byte in chunk {
            if byte == b'\n' {
                let line = std::mem::take(&mut self.line);
                let line = String::from_utf8_lossy(&line);
                self.process_line(line.trim_end_matches('\r'), &mut payloads);
            } else {
                self.line.push(byte);
            }
        }
        payloads
    }

    /// Flush whatever is pending once the body has ended.
    pub fn finish(&mut self) -> Vec<String> {
        let mut payloads = Vec::new();
        if !self.line.is_empty() {
            let line = std::mem::take(&mut self.line);
            let line = String::from_utf8_lossy(&line);
            self.process_line(line.trim_end_matches('\r'), &mut payloads);
        }
        self.dispatch(&mut payloads);
        payloads
    }

    fn process_line(&mut self, line: &str, payloads: &mut Vec<String>) {
        if line.is_empty() {
            self.dispatch(payloads);
        } else if line.starts_with(':') {
            // comment / keep-alive
        } else if let Some(value) = line.strip_prefix("data:") {
            self.data
                .push(value.strip_prefix(' ').unwrap_or(value).to_string());
        } else if line.trim_start().starts_with('{') {
            self.dispatch(payloads);
            payloads.push(line.trim().to_string());
        }
    }

    fn dispatch(&mut self, payloads: &mut Vec<String>) {
        if !self.data.is_empty() {
            payloads.push(self.data.join("\n"));
            self.data.clear();
        }
    }
}

/// Decode an event-stream body into frames.
///
/// The stream ends after the first body error, which is yielded as an
/// error item.
pub fn decode_event_stream<S, B, E>(body: S) -> FrameStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<PipelineError> + Send + 'static,
{
    struct State<S> {
        body: Pin<Box<S>>,
        decoder: SseDecoder,
        pending: VecDeque<String>,
        finished: bool,
    }

    let state = State {
        body: Box::pin(body),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(payload) = state.pending.pop_front() {
                debug!("Received frame: {}", payload);
                let item = StageFrame::parse(&payload).map_err(PipelineError::from);
                return Some((item, state));
            }
            if state.finished {
                return None;
            }
            match state.body.next().await {
                Some(Ok(chunk)) => {
                    let payloads = state.decoder.feed(chunk.as_ref());
                    state.pending.extend(payloads);
                }
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((Err(e.into()), state));
                }
                None => {
                    state.finished = true;
                    let payloads = state.decoder.finish();
                    state.pending.extend(payloads);
                }
            }
        }
    }))
}

/// Frames from a server-push response.
pub fn event_stream(response: Response) -> FrameStream {
    decode_event_stream(response.bytes_stream())
}

/// Status shown while a blocking call is outstanding.
pub const WAITING_MESSAGE: &str = "Waiting for the server...";

/// A single terminal frame carried by a whole response body.
///
/// A waiting frame is reported first so the stage shows as in progress
/// until the body has been read.
pub fn single_response(response: Response) -> FrameStream {
    let waiting = StageFrame::InProgress {
        progress: None,
        message: Some(WAITING_MESSAGE.to_string()),
    };
    let body = stream::once(async move {
        let body = response.text().await?;
        debug!("Received response frame: {}", body);
        Ok::<_, PipelineError>(StageFrame::parse(&body)?)
    });
    Box::pin(stream::iter([Ok(waiting)]).chain(body))
}

/// Pick the transport from the response content type.
pub fn from_response(response: Response) -> FrameStream {
    if is_event_stream(&response) {
        event_stream(response)
    } else {
        single_response(response)
    }
}

fn is_event_stream(response: &Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.starts_with("text/event-stream"))
        .unwrap_or(false)
}

/// Turn a non-success response into a transport error.
///
/// The server's `error` or `message` field is used when the body carries
/// one.
pub async fn ensure_success(response: Response) -> PipelineResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(PipelineError::Transport(
        server_message(&body).unwrap_or_else(|| format!("Server returned {}", status)),
    ))
}

fn server_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["error", "message"]
        .iter()
        .filter_map(|key| value.get(*key)?.as_str())
        .map(str::trim)
        .find(|text| !text.is_empty())
        .map(str::to_string)
}
