//! LLM judge re-ranking of the hybrid short list.

use rxresolve_llm::{
    make_rerank_prompt, parse_judge_output, ChatClient, JudgeCandidate, JudgeVerdict,
    JUDGE_SYSTEM_PROMPT,
};

use crate::config::MatcherConfig;
use crate::models::{MatchMethod, MatchResult, SimilarityEvaluation};

/// Sends the top hybrid candidates to a judge and decides whether its pick
/// may override the hybrid winner.
pub struct Reranker {
    client: Box<dyn ChatClient>,
    top_n: usize,
    override_threshold: f64,
}

impl Reranker {
    pub fn new<C: ChatClient + 'static>(client: C, config: &MatcherConfig) -> Self {
        Self {
            client: Box::new(client),
            top_n: config.rerank_top_n.max(1),
            override_threshold: config.override_threshold,
        }
    }

    /// Ask the judge about the first `top_n` evaluations.
    ///
    /// Returns `None` when there is nothing to judge, the call fails, or the
    /// reply is not a well-formed verdict.
    pub fn rerank(&self, input: &str, evaluations: &[SimilarityEvaluation]) -> Option<JudgeVerdict> {
        let top = &evaluations[..evaluations.len().min(self.top_n)];
        if top.is_empty() {
            return None;
        }

        let candidates: Vec<JudgeCandidate> = top
            .iter()
            .map(|e| JudgeCandidate {
                name: e.candidate.clone(),
                semantic: e.semantic_score,
                lexical: e.lexical_score,
                adjusted: e.adjusted_score,
            })
            .collect();
        let prompt = make_rerank_prompt(input, &candidates);

        let reply = match self.client.complete(JUDGE_SYSTEM_PROMPT, &prompt) {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(error = %e, "judge call failed; keeping hybrid pick");
                return None;
            }
        };

        match parse_judge_output(&reply) {
            Ok(verdict) => Some(verdict),
            Err(e) => {
                tracing::warn!(error = %e, "judge reply unusable; keeping hybrid pick");
                None
            }
        }
    }

    /// Apply a verdict to a hybrid result.
    ///
    /// The judge wins only when its own similarity for its pick exceeds the
    /// threshold and the pick names one of the candidates it was shown.
    pub fn apply(&self, mut result: MatchResult, verdict: &JudgeVerdict) -> MatchResult {
        let confidence = verdict.best_similarity().unwrap_or(0.0);
        if confidence <= self.override_threshold {
            tracing::debug!(confidence, "judge below override threshold");
            return result;
        }

        let wanted = verdict.best_match.name.trim();
        let Some(pick) = result
            .evaluations
            .iter()
            .take(self.top_n)
            .find(|e| e.candidate.trim().eq_ignore_ascii_case(wanted))
        else {
            tracing::warn!(name = %wanted, "judge picked a name it was not shown");
            return result;
        };

        let (candidate, score) = (pick.candidate.clone(), pick.adjusted_score);
        if result.candidate.as_deref() != Some(candidate.as_str()) {
            tracing::info!(from = ?result.candidate, to = %candidate, confidence, "judge override");
        }
        result.candidate = Some(candidate);
        result.score = score;
        result.method = MatchMethod::LlmRerank;
        if !verdict.best_match.reason.trim().is_empty() {
            result.reason = verdict.best_match.reason.clone();
        }
        result
    }
}
