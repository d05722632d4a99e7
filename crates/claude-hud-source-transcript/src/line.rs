//! Transcript line shapes.
//!
//! Only the fields needed for usage accounting are modelled; everything
//! else on a line is ignored.

use serde::Deserialize;

/// One parsed line of a transcript file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TranscriptLine {
    /// "user", "assistant", "summary", ...
    #[serde(rename = "type", default)]
    pub line_type: Option<String>,
    #[serde(default)]
    pub message: Option<TranscriptMessage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TranscriptMessage {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub usage: Option<UsageRecord>,
}

/// Token counts reported for one assistant turn. Absent or `null` fields
/// count as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct UsageRecord {
    #[serde(default)]
    pub input_tokens: Option<u64>,
    #[serde(default)]
    pub output_tokens: Option<u64>,
    #[serde(default)]
    pub cache_creation_input_tokens: Option<u64>,
    #[serde(default)]
    pub cache_read_input_tokens: Option<u64>,
}

impl TranscriptLine {
    /// Usage and model of an assistant line, if it carries usage.
    pub fn assistant_usage(&self) -> Option<(UsageRecord, Option<&str>)> {
        if self.line_type.as_deref() != Some("assistant") {
            return None;
        }
        let message = self.message.as_ref()?;
        let usage = message.usage?;
        let model = message.model.as_deref().filter(|m| !m.is_empty());
        Some((usage, model))
    }
}
