//! Hybrid similarity results.

use serde::{Deserialize, Serialize};

/// Per-candidate score breakdown from the hybrid matcher.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SimilarityEvaluation {
    /// Candidate name as first supplied by the caller
    pub candidate: String,
    /// Cosine similarity of embeddings, clamped to [0, 1]
    pub semantic_score: f64,
    /// Token-set overlap in [0, 1]
    pub lexical_score: f64,
    /// Weighted blend of the two scores
    pub blended_score: f64,
    /// Blended score plus domain bonuses; ranking only, may exceed 1
    pub adjusted_score: f64,
}

/// How the winning candidate was chosen.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MatchMethod {
    Hybrid,
    LlmRerank,
}

/// Ranked result of matching one input against a candidate pool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub candidate: Option<String>,
    /// Adjusted score of the pick (0 when there is none)
    pub score: f64,
    pub reason: String,
    pub method: MatchMethod,
    /// All evaluations, best first
    pub evaluations: Vec<SimilarityEvaluation>,
}

impl MatchResult {
    /// Result with no pick, explaining why.
    pub fn empty(reason: impl Into<String>) -> Self {
        Self {
            candidate: None,
            score: 0.0,
            reason: reason.into(),
            method: MatchMethod::Hybrid,
            evaluations: Vec::new(),
        }
    }

    pub fn top(&self) -> Option<&SimilarityEvaluation> {
        self.evaluations.first()
    }
}
