//! Streaming chunk types and token extraction.
//!
//! Providers stream incremental response units with different JSON shapes.
//! [`StreamChunk`] deserializes both families into one struct, and
//! [`StreamChunk::extract_text`] pulls the textual delta out without the
//! caller knowing which provider produced the chunk. That uniform extraction
//! is what keeps the stream renderer provider-agnostic.

use serde::Deserialize;

/// One incremental unit of a streaming provider response.
///
/// All fields are optional: a chunk may carry a direct `text` field, a
/// Gemini-style candidate tree, an OpenAI-style choice delta, or none of
/// them (keep-alive or metadata-only frames).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamChunk {
    /// Direct text payload, when the provider surfaces one.
    #[serde(default)]
    pub text: Option<String>,

    /// Gemini-style candidates, each carrying content parts.
    #[serde(default)]
    pub candidates: Vec<Candidate>,

    /// OpenAI-style choices, each carrying a content delta.
    #[serde(default)]
    pub choices: Vec<Choice>,
}

/// One Gemini response candidate.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Candidate {
    /// The candidate's content tree.
    #[serde(default)]
    pub content: Option<CandidateContent>,
}

/// Content of a Gemini candidate: an ordered list of parts.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CandidateContent {
    /// The content parts.
    #[serde(default)]
    pub parts: Vec<Part>,
}

/// One Gemini content part.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Part {
    /// Text carried by this part, if any.
    #[serde(default)]
    pub text: Option<String>,
}

/// One OpenAI streaming choice.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Choice {
    /// The incremental delta for this choice.
    #[serde(default)]
    pub delta: Delta,
}

/// The delta payload of an OpenAI streaming choice.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Delta {
    /// Incremental content, if the frame carries any.
    #[serde(default)]
    pub content: Option<String>,
}

impl StreamChunk {
    /// Creates a chunk carrying a direct text payload. Used by tests and
    /// scripted providers.
    pub fn from_text(text: impl Into<String>) -> Self {
        StreamChunk {
            text: Some(text.into()),
            ..StreamChunk::default()
        }
    }

    /// Creates an OpenAI-shaped chunk carrying a delta. Used by tests and
    /// scripted providers.
    pub fn from_delta(content: impl Into<String>) -> Self {
        StreamChunk {
            choices: vec![Choice {
                delta: Delta {
                    content: Some(content.into()),
                },
            }],
            ..StreamChunk::default()
        }
    }

    /// Extracts the textual delta from this chunk.
    ///
    /// Checks a direct text field first, then the first candidate's content
    /// parts, then the first choice's delta content. Returns an empty string
    /// when the chunk carries no text. Never fails.
    pub fn extract_text(&self) -> String {
        if let Some(text) = &self.text
            && !text.is_empty()
        {
            return text.clone();
        }

        if let Some(candidate) = self.candidates.first()
            && let Some(content) = &candidate.content
        {
            let mut joined = String::new();
            for part in &content.parts {
                if let Some(text) = &part.text {
                    joined.push_str(text);
                }
            }
            if !joined.is_empty() {
                return joined;
            }
        }

        if let Some(choice) = self.choices.first()
            && let Some(content) = &choice.delta.content
        {
            return content.clone();
        }

        String::new()
    }
}
