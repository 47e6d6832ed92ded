//! Hybrid matcher tests with a deterministic embedder and a scripted judge.

use std::sync::Arc;

use rxresolve_core::matcher::{BlendWeights, HashingEmbedder};
use rxresolve_core::{EmbeddingCache, HybridMatcher, MatchMethod, MatcherConfig, Reranker};
use rxresolve_llm::ScriptedChatClient;

const VENTOLIN: &str = "ventolin hfa 90 mcg inhaler";
const ALBUTEROL_HFA: &str = "Albuterol HFA 90 MCG/ACTUAT Inhalation Aerosol";
const LEVALBUTEROL: &str = "Levalbuterol 45 MCG/ACTUAT Inhalation Aerosol";
const ALBUTEROL_TAB: &str = "albuterol 2 MG Oral Tablet";

fn inhaler_pool() -> Vec<&'static str> {
    vec![ALBUTEROL_TAB, LEVALBUTEROL, ALBUTEROL_HFA]
}

fn hashing_matcher() -> (HybridMatcher, Arc<HashingEmbedder>) {
    let embedder = Arc::new(HashingEmbedder::new());
    let cache = Arc::new(EmbeddingCache::new(Arc::clone(&embedder)));
    (HybridMatcher::new(MatcherConfig::default(), cache), embedder)
}

fn judge_reply(name: &str, similarity: f64) -> String {
    format!(
        r#"Here is my assessment:
{{"best_match": {{"name": "{name}", "reason": "same inhaled product"}},
  "ranked": [{{"name": "{name}", "similarity": {similarity}}}]}}"#
    )
}

#[test]
fn test_brand_inhaler_matches_generic_inhaler() {
    let (matcher, _) = hashing_matcher();
    let result = matcher.best_match(VENTOLIN, &inhaler_pool()).unwrap();

    assert_eq!(result.candidate.as_deref(), Some(ALBUTEROL_HFA));
    assert_eq!(result.method, MatchMethod::Hybrid);
    assert_eq!(result.evaluations.len(), 3);
    assert!(result.reason.starts_with("shared tokens: 90, inhaler;"));

    // evaluations are sorted best first
    let scores: Vec<f64> = result.evaluations.iter().map(|e| e.adjusted_score).collect();
    assert!(scores.windows(2).all(|w| w[0] >= w[1]));
    assert_eq!(result.evaluations.last().map(|e| e.candidate.as_str()), Some(ALBUTEROL_TAB));
}

#[test]
fn test_ventolin_picks_hfa_aerosol_over_tablet() {
    let (matcher, _) = hashing_matcher();
    let pool = [
        "Albuterol HFA 90 MCG/ACTUAT Inhalation Aerosol",
        "Albuterol Sulfate Tablet",
    ];
    let result = matcher.best_match("Ventolin HFA 90 MCG inhaler", &pool).unwrap();

    assert_eq!(
        result.candidate.as_deref(),
        Some("Albuterol HFA 90 MCG/ACTUAT Inhalation Aerosol")
    );
    assert_eq!(result.method, MatchMethod::Hybrid);
    assert!(result.reason.starts_with("shared tokens: 90, inhaler;"), "{}", result.reason);
}

#[test]
fn test_scores_stay_in_range() {
    let (matcher, _) = hashing_matcher();
    let result = matcher.best_match(VENTOLIN, &inhaler_pool()).unwrap();
    for eval in &result.evaluations {
        assert!((0.0..=1.0).contains(&eval.semantic_score), "{:?}", eval);
        assert!((0.0..=1.0).contains(&eval.lexical_score), "{:?}", eval);
        assert!(eval.adjusted_score >= eval.blended_score);
    }
}

#[test]
fn test_lexical_only_weights() {
    let (matcher, _) = hashing_matcher();
    let weights = BlendWeights {
        semantic: 0.0,
        lexical: 1.0,
    };
    let result = matcher
        .best_match_weighted(VENTOLIN, &inhaler_pool(), weights)
        .unwrap();
    for eval in &result.evaluations {
        assert!((eval.blended_score - eval.lexical_score).abs() < 1e-9);
    }
}

#[test]
fn test_embeddings_are_cached_across_calls() {
    let (matcher, embedder) = hashing_matcher();
    matcher.best_match(VENTOLIN, &inhaler_pool()).unwrap();
    assert_eq!(embedder.calls(), 4);
    assert_eq!(matcher.embeddings().len(), 4);

    matcher.best_match(VENTOLIN, &inhaler_pool()).unwrap();
    assert_eq!(embedder.calls(), 4);
}

#[test]
fn test_empty_input_or_pool_yields_no_pick() {
    let (matcher, embedder) = hashing_matcher();
    let empty: Vec<&str> = Vec::new();

    let result = matcher.best_match("   ", &inhaler_pool()).unwrap();
    assert!(result.candidate.is_none());
    assert_eq!(result.score, 0.0);

    let result = matcher.best_match(VENTOLIN, &empty).unwrap();
    assert!(result.candidate.is_none());
    assert!(result.evaluations.is_empty());
    assert_eq!(embedder.calls(), 0);
}

#[test]
fn test_confident_judge_overrides_hybrid() {
    let (matcher, _) = hashing_matcher();
    let judge = ScriptedChatClient::new([judge_reply(LEVALBUTEROL, 0.95)]);
    let matcher = matcher.with_reranker(Reranker::new(judge, &MatcherConfig::default()));

    let result = matcher.best_match_with_rerank(VENTOLIN, &inhaler_pool()).unwrap();
    assert_eq!(result.candidate.as_deref(), Some(LEVALBUTEROL));
    assert_eq!(result.method, MatchMethod::LlmRerank);
    assert_eq!(result.reason, "same inhaled product");
}

#[test]
fn test_unsure_judge_keeps_hybrid() {
    let (matcher, _) = hashing_matcher();
    let judge = ScriptedChatClient::new([judge_reply(LEVALBUTEROL, 0.9)]);
    let matcher = matcher.with_reranker(Reranker::new(judge, &MatcherConfig::default()));

    let result = matcher.best_match_with_rerank(VENTOLIN, &inhaler_pool()).unwrap();
    assert_eq!(result.candidate.as_deref(), Some(ALBUTEROL_HFA));
    assert_eq!(result.method, MatchMethod::Hybrid);
}

#[test]
fn test_broken_judge_keeps_hybrid() {
    for judge in [ScriptedChatClient::new(["no idea"]), ScriptedChatClient::failing()] {
        let (matcher, _) = hashing_matcher();
        let matcher = matcher.with_reranker(Reranker::new(judge, &MatcherConfig::default()));
        let result = matcher.best_match_with_rerank(VENTOLIN, &inhaler_pool()).unwrap();
        assert_eq!(result.candidate.as_deref(), Some(ALBUTEROL_HFA));
        assert_eq!(result.method, MatchMethod::Hybrid);
    }
}

#[test]
fn test_judge_sees_only_top_candidates() {
    let (matcher, _) = hashing_matcher();
    let judge = Arc::new(ScriptedChatClient::new([judge_reply(ALBUTEROL_HFA, 0.99)]));
    let config = MatcherConfig {
        rerank_top_n: 2,
        ..MatcherConfig::default()
    };
    let matcher = matcher.with_reranker(Reranker::new(Arc::clone(&judge), &config));

    matcher.best_match_with_rerank(VENTOLIN, &inhaler_pool()).unwrap();
    let prompts = judge.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains(ALBUTEROL_HFA));
    assert!(!prompts[0].contains(ALBUTEROL_TAB));
}
