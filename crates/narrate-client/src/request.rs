//! Stage inputs and their pre-flight checks.

use std::path::{Path, PathBuf};

use narrate_models::{PublishRequest, Script, SpeechRequest, Stage};

use crate::error::ValidationError;

/// Container formats accepted for upload, by file extension.
const VIDEO_EXTENSIONS: &[(&str, &str)] = &[
    ("mp4", "video/mp4"),
    ("m4v", "video/x-m4v"),
    ("mov", "video/quicktime"),
    ("webm", "video/webm"),
    ("mkv", "video/x-matroska"),
    ("avi", "video/x-msvideo"),
    ("mpeg", "video/mpeg"),
    ("mpg", "video/mpeg"),
];

/// Guess a video MIME type from the file extension.
pub fn guess_video_mime(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    VIDEO_EXTENSIONS
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, mime)| *mime)
}

/// Input for starting one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageRequest {
    Upload { path: PathBuf, mime: String },
    Analyze { unique_filename: String },
    Synthesize { script_text: String },
    Merge,
    Publish { title: String, description: String },
}

impl StageRequest {
    /// Upload request with the MIME type guessed from the extension.
    pub fn upload(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mime = guess_video_mime(&path)
            .unwrap_or("application/octet-stream")
            .to_string();
        StageRequest::Upload { path, mime }
    }

    pub fn stage(&self) -> Stage {
        match self {
            StageRequest::Upload { .. } => Stage::Upload,
            StageRequest::Analyze { .. } => Stage::Analyze,
            StageRequest::Synthesize { .. } => Stage::Synthesize,
            StageRequest::Merge => Stage::Merge,
            StageRequest::Publish { .. } => Stage::Publish,
        }
    }

    /// Pre-flight contract check. Never touches the network.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            StageRequest::Upload { path, mime } => {
                let metadata = std::fs::metadata(path).map_err(|_| ValidationError::NoFile)?;
                if !metadata.is_file() {
                    return Err(ValidationError::NoFile);
                }
                if !mime.starts_with("video/") {
                    return Err(ValidationError::NotVideo { mime: mime.clone() });
                }
                if metadata.len() == 0 {
                    return Err(ValidationError::EmptyFile);
                }
                Ok(())
            }
            StageRequest::Analyze { unique_filename } => {
                if unique_filename.trim().is_empty() {
                    return Err(ValidationError::MissingUploadKey);
                }
                Ok(())
            }
            StageRequest::Synthesize { script_text } => {
                Script::parse(script_text)?;
                Ok(())
            }
            StageRequest::Merge => Ok(()),
            StageRequest::Publish { title, .. } => {
                if title.trim().is_empty() {
                    return Err(ValidationError::EmptyTitle);
                }
                Ok(())
            }
        }
    }

    /// Speech request body with the script normalized to line format.
    pub fn speech_request(&self) -> Option<Result<SpeechRequest, ValidationError>> {
        match self {
            StageRequest::Synthesize { script_text } => Some(
                Script::parse(script_text)
                    .map(|script| SpeechRequest {
                        script_text: script.to_text(),
                    })
                    .map_err(ValidationError::from),
            ),
            _ => None,
        }
    }

    /// Publish request body with title and description trimmed.
    pub fn publish_request(&self) -> Option<PublishRequest> {
        match self {
            StageRequest::Publish { title, description } => Some(PublishRequest {
                video_title: title.trim().to_string(),
                video_description: description.trim().to_string(),
            }),
            _ => None,
        }
    }
}
