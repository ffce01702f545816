//! Request bodies sent to the pipeline server.

use serde::{Deserialize, Serialize};

/// Body of the speech synthesis request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeechRequest {
    /// Edited script in line format
    pub script_text: String,
}

/// Body of the publish request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishRequest {
    pub video_title: String,
    #[serde(default)]
    pub video_description: String,
}

/// Service credentials accepted by the settings endpoint.
///
/// Sent as form fields; unset fields are omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gemini_api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub youtube_api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub youtube_client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub youtube_client_secret: Option<String>,
}

impl ServiceSettings {
    /// True when no field is set.
    pub fn is_empty(&self) -> bool {
        self.gemini_api_key.is_none()
            && self.youtube_api_key.is_none()
            && self.youtube_client_id.is_none()
            && self.youtube_client_secret.is_none()
    }
}
