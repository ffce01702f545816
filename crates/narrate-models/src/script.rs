//! Narration scripts and their editable line format.
//!
//! The analysis stage produces an ordered list of timed descriptions. The
//! user edits them as plain text, one entry per line in the form
//! `<time>: <description>`, and the text is parsed back before speech
//! synthesis is requested.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use thiserror::Error;

/// Separator between the time and the description on a script line.
const SEPARATOR: &str = ": ";

pub type ScriptResult<T> = Result<T, ScriptParseError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptParseError {
    #[error("Script cannot be empty.")]
    Empty,

    #[error("Line {line}: expected \"<time>: <description>\", got {text:?}")]
    MissingSeparator { line: usize, text: String },

    #[error("Line {line}: time is empty")]
    EmptyTime { line: usize },
}

/// One timed narration entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptEntry {
    /// Timestamp as reported by the analyzer (e.g. "0:05")
    #[serde(deserialize_with = "time_from_string_or_number")]
    pub time: String,
    /// Narration text for this point in the video
    pub description: String,
}

impl ScriptEntry {
    pub fn new(time: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            time: time.into(),
            description: description.into(),
        }
    }

    /// Render as a single editable line.
    ///
    /// Line breaks inside the description are folded into spaces so the
    /// entry stays on one line. The description is otherwise written as is,
    /// so an empty one renders as `"<time>: "`.
    pub fn to_line(&self) -> String {
        let description = self.description.replace(['\r', '\n'], " ");
        format!("{}{}{}", self.time.trim(), SEPARATOR, description)
    }
}

/// Ordered narration script.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Script(pub Vec<ScriptEntry>);

impl Script {
    pub fn new(entries: Vec<ScriptEntry>) -> Self {
        Self(entries)
    }

    pub fn entries(&self) -> &[ScriptEntry] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Serialize to the editable text form, one entry per line.
    pub fn to_text(&self) -> String {
        self.0
            .iter()
            .map(ScriptEntry::to_line)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Parse the editable text form back into entries.
    ///
    /// Blank lines are skipped. The first `": "` on a line separates the
    /// time from the description, so clock-style times such as `1:05`
    /// are kept intact. Everything after the separator is the description,
    /// surrounding spaces included. A line ending in a bare `:` (an entry
    /// whose trailing space was lost in editing) has an empty description.
    pub fn parse(text: &str) -> ScriptResult<Self> {
        let mut entries = Vec::new();

        for (index, raw) in text.lines().enumerate() {
            let line = raw.trim_end_matches('\r').trim_start();
            if line.trim_end().is_empty() {
                continue;
            }

            let (time, description) = match line.split_once(SEPARATOR) {
                Some(parts) => parts,
                None => line
                    .trim_end()
                    .strip_suffix(':')
                    .map(|time| (time, ""))
                    .ok_or_else(|| ScriptParseError::MissingSeparator {
                        line: index + 1,
                        text: line.trim_end().to_string(),
                    })?,
            };

            let time = time.trim();
            if time.is_empty() {
                return Err(ScriptParseError::EmptyTime { line: index + 1 });
            }

            entries.push(ScriptEntry::new(time, description));
        }

        if entries.is_empty() {
            return Err(ScriptParseError::Empty);
        }

        Ok(Self(entries))
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl From<Vec<ScriptEntry>> for Script {
    fn from(entries: Vec<ScriptEntry>) -> Self {
        Self(entries)
    }
}

/// Analyzers report time either as text ("0:05") or as seconds (5.0).
fn time_from_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawTime {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match RawTime::deserialize(deserializer)? {
        RawTime::Text(text) => text,
        RawTime::Number(number) => number.to_string(),
    })
}
