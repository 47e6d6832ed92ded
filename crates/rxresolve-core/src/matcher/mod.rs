//! Hybrid similarity matcher.
//!
//! Picks the best name from an existing candidate pool:
//! Preprocess → Embed (cached) → Cosine + Token overlap → Blend → Bonuses → Rank → (optional) Judge

mod embedding;
mod lexical;
mod preprocess;
mod rerank;

pub use embedding::*;
pub use lexical::*;
pub use preprocess::*;
pub use rerank::*;

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;

use crate::config::MatcherConfig;
use crate::models::{MatchMethod, MatchResult, SimilarityEvaluation};

/// Matcher errors.
#[derive(Error, Debug)]
pub enum MatchError {
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),
}

/// Relative weight of the semantic and lexical scores.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlendWeights {
    pub semantic: f64,
    pub lexical: f64,
}

impl Default for BlendWeights {
    fn default() -> Self {
        Self {
            semantic: 0.85,
            lexical: 0.15,
        }
    }
}

impl BlendWeights {
    /// Rescale so the weights sum to 1. Unusable weights fall back to the defaults.
    pub fn normalized(self) -> Self {
        let sum = self.semantic + self.lexical;
        if !sum.is_finite() || sum <= 0.0 || self.semantic < 0.0 || self.lexical < 0.0 {
            return Self::default();
        }
        Self {
            semantic: self.semantic / sum,
            lexical: self.lexical / sum,
        }
    }
}

/// Blends embedding similarity with token overlap to choose among names.
pub struct HybridMatcher {
    config: MatcherConfig,
    preprocessor: Preprocessor,
    embeddings: Arc<EmbeddingCache>,
    reranker: Option<Reranker>,
}

impl HybridMatcher {
    pub fn new(config: MatcherConfig, embeddings: Arc<EmbeddingCache>) -> Self {
        Self {
            preprocessor: Preprocessor::new(&config.substitutions),
            config,
            embeddings,
            reranker: None,
        }
    }

    /// Enable the judge stage used by [`HybridMatcher::best_match_with_rerank`].
    pub fn with_reranker(mut self, reranker: Reranker) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub fn embeddings(&self) -> &Arc<EmbeddingCache> {
        &self.embeddings
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// Best match using the configured weights.
    pub fn best_match<S: AsRef<str>>(
        &self,
        input: &str,
        candidates: &[S],
    ) -> Result<MatchResult, MatchError> {
        let weights = BlendWeights {
            semantic: self.config.semantic_weight,
            lexical: self.config.lexical_weight,
        };
        self.best_match_weighted(input, candidates, weights)
    }

    /// Rank every candidate and pick the highest adjusted score.
    ///
    /// Empty input or an empty pool yields a result with no pick and never
    /// touches the embedding service. Embedding failures are returned.
    pub fn best_match_weighted<S: AsRef<str>>(
        &self,
        input: &str,
        candidates: &[S],
        weights: BlendWeights,
    ) -> Result<MatchResult, MatchError> {
        let input_text = self.preprocessor.apply(input);
        if input_text.is_empty() {
            return Ok(MatchResult::empty("input is empty"));
        }

        let pool = self.unique_candidates(candidates);
        if pool.is_empty() {
            return Ok(MatchResult::empty("no candidates supplied"));
        }

        let weights = weights.normalized();
        let input_vector = self.embeddings.get(&input_text)?;
        let input_tokens = token_set(&input_text);

        let mut scored: Vec<(SimilarityEvaluation, String)> = Vec::with_capacity(pool.len());
        for (original, processed) in pool {
            let vector = self.embeddings.get(&processed)?;
            let tokens = token_set(&processed);

            let semantic = cosine_similarity(&input_vector, &vector).clamp(0.0, 1.0);
            let lexical = lexical_overlap(&input_tokens, &tokens);
            let blended = weights.semantic * semantic + weights.lexical * lexical;
            let adjusted = blended + self.bonus(&input_tokens, &tokens);

            scored.push((
                SimilarityEvaluation {
                    candidate: original,
                    semantic_score: semantic,
                    lexical_score: lexical,
                    blended_score: blended,
                    adjusted_score: adjusted,
                },
                processed,
            ));
        }

        scored.sort_by(|a, b| {
            b.0.adjusted_score
                .partial_cmp(&a.0.adjusted_score)
                .unwrap_or(Ordering::Equal)
        });

        let (top, top_text) = &scored[0];
        let reason = self.reason(&input_text, top_text, top);
        let (candidate, score) = (Some(top.candidate.clone()), top.adjusted_score);
        tracing::debug!(candidate = ?candidate, score, "hybrid pick");

        Ok(MatchResult {
            candidate,
            score,
            reason,
            method: MatchMethod::Hybrid,
            evaluations: scored.into_iter().map(|(e, _)| e).collect(),
        })
    }

    /// Hybrid match, then let the judge override it when it is confident.
    ///
    /// Without a reranker, or when the judge is unavailable or unsure, this is
    /// the plain hybrid result.
    pub fn best_match_with_rerank<S: AsRef<str>>(
        &self,
        input: &str,
        candidates: &[S],
    ) -> Result<MatchResult, MatchError> {
        let result = self.best_match(input, candidates)?;
        let Some(reranker) = self.reranker.as_ref() else {
            return Ok(result);
        };
        if result.candidate.is_none() {
            return Ok(result);
        }
        match reranker.rerank(input, &result.evaluations) {
            Some(verdict) => Ok(reranker.apply(result, &verdict)),
            None => Ok(result),
        }
    }

    /// Preprocessed, de-duplicated pool; the first original spelling is kept.
    fn unique_candidates<S: AsRef<str>>(&self, candidates: &[S]) -> Vec<(String, String)> {
        let mut seen = HashSet::new();
        candidates
            .iter()
            .filter_map(|c| {
                let processed = self.preprocessor.apply(c.as_ref());
                (!processed.is_empty() && seen.insert(processed.clone()))
                    .then(|| (c.as_ref().trim().to_string(), processed))
            })
            .collect()
    }

    fn bonus(&self, a: &HashSet<String>, b: &HashSet<String>) -> f64 {
        let shared: Vec<&String> = a.intersection(b).collect();
        let in_list = |list: &[String]| shared.iter().any(|t| list.iter().any(|l| l == *t));

        let mut bonus = 0.0;
        if in_list(&self.config.brand_tokens) {
            bonus += self.config.brand_bonus;
        }
        if in_list(&self.config.clinical_tokens) {
            bonus += self.config.clinical_bonus;
        }
        if shared.iter().any(|t| is_numeric_token(t)) {
            bonus += self.config.numeric_bonus;
        }
        bonus
    }

    fn reason(&self, input: &str, candidate: &str, eval: &SimilarityEvaluation) -> String {
        let tokens = token_set(candidate);
        let shared: Vec<String> = shared_tokens(input, &tokens)
            .into_iter()
            .filter(|t| is_high_signal(t))
            .collect();
        let scores = format!(
            "semantic={:.3}, lexical={:.3}",
            eval.semantic_score, eval.lexical_score
        );
        if shared.is_empty() {
            format!("no shared high-signal tokens; {}", scores)
        } else {
            format!("shared tokens: {}; {}", shared.join(", "), scores)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher() -> (HybridMatcher, Arc<HashingEmbedder>) {
        let embedder = Arc::new(HashingEmbedder::new());
        let cache = Arc::new(EmbeddingCache::new(Arc::clone(&embedder)));
        (HybridMatcher::new(MatcherConfig::default(), cache), embedder)
    }

    #[test]
    fn test_weights_normalized() {
        let w = BlendWeights {
            semantic: 3.0,
            lexical: 1.0,
        }
        .normalized();
        assert!((w.semantic - 0.75).abs() < 1e-9);
        assert!((w.lexical - 0.25).abs() < 1e-9);

        let zero = BlendWeights {
            semantic: 0.0,
            lexical: 0.0,
        };
        assert_eq!(zero.normalized(), BlendWeights::default());
    }

    #[test]
    fn test_empty_cases_skip_embedding() {
        let (m, embedder) = matcher();
        let none: [&str; 0] = [];
        let r = m.best_match("", &["albuterol"]).unwrap();
        assert!(r.candidate.is_none());
        assert!(!r.reason.is_empty());
        let r = m.best_match("albuterol", &none).unwrap();
        assert!(r.candidate.is_none());
        assert!(!r.reason.is_empty());
        let r = m.best_match("albuterol", &["   "]).unwrap();
        assert!(r.candidate.is_none());
        assert_eq!(embedder.calls(), 0);
    }

    #[test]
    fn test_duplicates_collapse_to_first_spelling() {
        let (m, _) = matcher();
        let r = m
            .best_match(
                "lisinopril 10 mg",
                &["Lisinopril 10 MG Oral Tablet", "lisinopril 10 mg oral tablet"],
            )
            .unwrap();
        assert_eq!(r.evaluations.len(), 1);
        assert_eq!(r.candidate.as_deref(), Some("Lisinopril 10 MG Oral Tablet"));
    }

    #[test]
    fn test_bonuses_add_to_blend() {
        let (m, _) = matcher();
        let r = m
            .best_match("ventolin hfa 90 mcg inhaler", &["albuterol hfa 90 mcg inhaler"])
            .unwrap();
        let top = r.top().unwrap();
        // brand (hfa) + clinical (inhaler) + numeric (90)
        assert!((top.adjusted_score - top.blended_score - 0.10).abs() < 1e-9);
        assert!(r.reason.starts_with("shared tokens: 90, inhaler;"));
    }

    #[test]
    fn test_embedding_failure_propagates() {
        let cache = Arc::new(EmbeddingCache::new(HashingEmbedder::failing()));
        let m = HybridMatcher::new(MatcherConfig::default(), cache);
        assert!(matches!(
            m.best_match("albuterol", &["albuterol inhaler"]),
            Err(MatchError::Embedding(_))
        ));
    }
}
