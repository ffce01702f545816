//! Stage results carried by terminal frames.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::script::Script;
use crate::stage::Stage;

/// Video accepted by the server, keyed for the analysis stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedVideo {
    /// Server-issued name used to correlate the analysis stream
    pub unique_filename: String,
    /// Where the uploaded video can be played back
    pub video_url: String,
}

/// Stage-specific payload of a successful job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageOutput {
    Uploaded(UploadedVideo),
    Script { script: Script },
    Audio { audio_url: String },
    Merged { merged_video_url: String },
    Published,
}

#[derive(Deserialize)]
struct ScriptFields {
    script: Script,
}

#[derive(Deserialize)]
struct AudioFields {
    audio_url: String,
}

#[derive(Deserialize)]
struct MergedFields {
    merged_video_url: String,
}

impl StageOutput {
    /// Decode the extra fields of a terminal frame for the given stage.
    ///
    /// A missing or mistyped field is a decoding error; the caller treats
    /// it as a malformed payload.
    pub fn decode(stage: Stage, fields: &Map<String, Value>) -> Result<Self, serde_json::Error> {
        let value = Value::Object(fields.clone());
        Ok(match stage {
            Stage::Upload => StageOutput::Uploaded(serde_json::from_value(value)?),
            Stage::Analyze => {
                let fields: ScriptFields = serde_json::from_value(value)?;
                StageOutput::Script {
                    script: fields.script,
                }
            }
            Stage::Synthesize => {
                let fields: AudioFields = serde_json::from_value(value)?;
                StageOutput::Audio {
                    audio_url: fields.audio_url,
                }
            }
            Stage::Merge => {
                let fields: MergedFields = serde_json::from_value(value)?;
                StageOutput::Merged {
                    merged_video_url: fields.merged_video_url,
                }
            }
            Stage::Publish => StageOutput::Published,
        })
    }

    /// URL of a media artifact produced by the stage, if any.
    pub fn media_url(&self) -> Option<&str> {
        match self {
            StageOutput::Uploaded(video) => Some(&video.video_url),
            StageOutput::Audio { audio_url } => Some(audio_url),
            StageOutput::Merged { merged_video_url } => Some(merged_video_url),
            StageOutput::Script { .. } | StageOutput::Published => None,
        }
    }
}
