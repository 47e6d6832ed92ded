//! Judge verdict parsing.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Judge errors.
#[derive(Error, Debug)]
pub enum JudgeError {
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid response format: {0}")]
    InvalidFormat(String),

    #[error("Chat transport error: {0}")]
    Transport(String),

    #[error("Chat service returned HTTP {status}: {body}")]
    Service { status: u16, body: String },

    #[error("Missing credential: {0}")]
    MissingCredential(String),
}

pub type JudgeResult<T> = Result<T, JudgeError>;

/// Structured verdict returned by the judge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JudgeVerdict {
    pub best_match: BestMatch,
    #[serde(default)]
    pub ranked: Vec<RankedEntry>,
}

/// The judge's single pick.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BestMatch {
    pub name: String,
    #[serde(default)]
    pub reason: String,
}

/// One entry of the judge's full ranking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankedEntry {
    pub name: String,
    pub similarity: f64,
}

impl JudgeVerdict {
    /// Similarity the judge reported for a given candidate name.
    pub fn similarity_of(&self, name: &str) -> Option<f64> {
        let wanted = name.trim().to_lowercase();
        self.ranked
            .iter()
            .find(|r| r.name.trim().to_lowercase() == wanted)
            .map(|r| r.similarity)
    }

    /// Similarity the judge reported for its own best match.
    pub fn best_similarity(&self) -> Option<f64> {
        self.similarity_of(&self.best_match.name)
    }
}

/// Parse the judge's reply into a verdict.
///
/// Chat models sometimes wrap the object in prose or code fences, so the
/// outermost `{...}` span is extracted before deserializing.
pub fn parse_judge_output(reply: &str) -> JudgeResult<JudgeVerdict> {
    let json_start = reply.find('{').ok_or_else(|| {
        JudgeError::InvalidFormat("No JSON object found in response".into())
    })?;
    let json_end = reply.rfind('}').ok_or_else(|| {
        JudgeError::InvalidFormat("No closing brace found in response".into())
    })?;
    if json_end < json_start {
        return Err(JudgeError::InvalidFormat(
            "Closing brace precedes opening brace".into(),
        ));
    }

    let verdict: JudgeVerdict = serde_json::from_str(&reply[json_start..=json_end])?;

    if verdict.best_match.name.trim().is_empty() {
        return Err(JudgeError::InvalidFormat("best_match.name is empty".into()));
    }
    if verdict
        .ranked
        .iter()
        .any(|r| !r.similarity.is_finite() || r.similarity < 0.0 || r.similarity > 1.0)
    {
        return Err(JudgeError::InvalidFormat(
            "ranked similarity outside [0, 1]".into(),
        ));
    }

    Ok(verdict)
}
