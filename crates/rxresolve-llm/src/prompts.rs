//! Judge prompts for drug-name re-ranking.
//!
//! The judge sees only the short list produced by the hybrid matcher, together
//! with each candidate's numeric scores, and must answer with a single JSON object.

use serde::{Deserialize, Serialize};

/// System prompt for the re-ranking judge.
pub const JUDGE_SYSTEM_PROMPT: &str = r#"You are a clinical pharmacy terminology assistant.

You receive a free-text medication description and a short list of candidate
drug names from a controlled vocabulary. Each candidate comes with scores from
an automatic matcher:
- semantic: embedding cosine similarity (0-1)
- lexical: token overlap (0-1)
- adjusted: blended score plus domain bonuses (used for ranking only)

Pick the candidate that denotes the same ingredient, strength, dose form and
route as the description. Treat brand names as equivalent to their generic
ingredient. Use the scores as evidence, but prefer clinical equivalence over
surface wording.

Respond with JSON only, no prose outside the object."#;

/// A candidate as presented to the judge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JudgeCandidate {
    pub name: String,
    pub semantic: f64,
    pub lexical: f64,
    pub adjusted: f64,
}

/// User prompt for one re-ranking request.
pub fn make_rerank_prompt(input: &str, candidates: &[JudgeCandidate]) -> String {
    let mut listing = String::new();
    for (i, c) in candidates.iter().enumerate() {
        listing.push_str(&format!(
            "{}. {} (semantic={:.3}, lexical={:.3}, adjusted={:.3})\n",
            i + 1,
            c.name,
            c.semantic,
            c.lexical,
            c.adjusted
        ));
    }

    format!(
        r#"Medication description:
"{}"

Candidates:
{}
Return a JSON object of this exact shape:
{{"best_match": {{"name": "<candidate name copied exactly>", "reason": "<one sentence>"}},
 "ranked": [{{"name": "<candidate name>", "similarity": <number between 0 and 1>}}]}}

"ranked" must list every candidate, most similar first."#,
        input, listing
    )
}
