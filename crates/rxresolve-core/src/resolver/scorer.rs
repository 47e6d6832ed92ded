//! Composite scoring.
//!
//! Scores are additive and unbounded; only their order matters.

use std::cmp::Ordering;

use super::StageOutput;
use crate::config::{ScoringWeights, VocabularyTables};
use crate::models::{Candidate, ParsedMedication, TermType};

/// Ranks filtered candidates by a weighted heuristic.
pub struct Scorer<'a> {
    weights: &'a ScoringWeights,
    tables: &'a VocabularyTables,
}

impl<'a> Scorer<'a> {
    pub fn new(weights: &'a ScoringWeights, tables: &'a VocabularyTables) -> Self {
        Self { weights, tables }
    }

    /// Composite score for one candidate.
    pub fn composite(&self, candidate: &Candidate, parsed: &ParsedMedication) -> f64 {
        let w = self.weights;
        let name = candidate.name.to_lowercase();
        let mut score = candidate.approx_score.unwrap_or(0.0);

        if let Some(source) = candidate.source.as_deref() {
            if source.eq_ignore_ascii_case(&w.primary_source) {
                score += w.primary_source_bonus;
            } else if w
                .secondary_sources
                .iter()
                .any(|s| s.eq_ignore_ascii_case(source))
            {
                score += w.secondary_source_penalty;
            }
        }

        score += match candidate.term_type {
            Some(TermType::Sbd) => w.sbd_bonus,
            Some(TermType::Scd) => w.scd_bonus,
            Some(TermType::Gpck) => w.gpck_bonus,
            Some(TermType::Bpck) => w.bpck_bonus,
            _ => 0.0,
        };

        if parsed
            .brand
            .as_deref()
            .is_some_and(|b| !b.is_empty() && name.contains(&b.to_lowercase()))
        {
            score += w.brand_bonus;
        }

        let route_named = parsed
            .route
            .and_then(|r| self.tables.route(r))
            .is_some_and(|entry| entry.name_synonyms.iter().any(|s| name.contains(s.as_str())));
        if route_named {
            score += w.route_bonus;
        }

        if candidate.market_presence_count.unwrap_or(0) > 0 {
            score += w.market_presence_bonus;
        }

        score
    }

    /// Annotate every candidate with its score and sort best first.
    ///
    /// The sort is stable, so equal scores keep collection order.
    pub fn rank(
        &self,
        mut candidates: Vec<Candidate>,
        parsed: &ParsedMedication,
    ) -> StageOutput<Vec<Candidate>> {
        let mut out = StageOutput::new(Vec::new());
        for candidate in &mut candidates {
            let score = self.composite(candidate, parsed);
            candidate.composite_score = Some(score);
            out.note(format!("[{}] composite score {:.2}", candidate.id, score));
        }
        candidates.sort_by(|a, b| {
            b.composite_score
                .partial_cmp(&a.composite_score)
                .unwrap_or(Ordering::Equal)
        });
        out.value = candidates;
        out
    }
}
