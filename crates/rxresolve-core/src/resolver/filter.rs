//! Candidate filtering.
//!
//! Stage A keeps only active, dispensable concepts. Stage B checks attribute
//! fidelity: the amount must appear in the candidate name, and an unrequested
//! chewable variant is rejected when its name does not carry the parsed form.

use super::{Normalizer, StageOutput};
use crate::models::{Candidate, DoseForm, ParsedMedication};

/// Two concentrations with the same units match when their per-unit ratios
/// differ by no more than this.
pub const RATIO_TOLERANCE: f64 = 0.01;

const CHEWABLE: &str = "chewable";

/// Drops candidates that cannot be the answer for the parsed input.
pub struct FilterEngine<'a> {
    normalizer: &'a Normalizer,
}

impl<'a> FilterEngine<'a> {
    pub fn new(normalizer: &'a Normalizer) -> Self {
        Self { normalizer }
    }

    pub fn filter(
        &self,
        candidates: Vec<Candidate>,
        parsed: &ParsedMedication,
    ) -> StageOutput<Vec<Candidate>> {
        let mut out = StageOutput::new(Vec::with_capacity(candidates.len()));

        for candidate in candidates {
            if !candidate.is_dispensable() {
                let tty = candidate
                    .term_type
                    .as_ref()
                    .map(|t| t.as_str().to_string())
                    .unwrap_or_else(|| "unknown".into());
                out.note(format!("[{}] type {} not dispensable; excluded", candidate.id, tty));
                continue;
            }
            if !candidate.is_active() {
                out.note(format!("[{}] not active; excluded", candidate.id));
                continue;
            }
            if !self.amount_matches(&candidate.name, parsed) {
                out.note(format!(
                    "[{}] '{}' lacks {}; excluded",
                    candidate.id,
                    candidate.name,
                    parsed.amount_str().unwrap_or_default()
                ));
                continue;
            }
            if self.is_unrequested_chewable(&candidate.name, parsed) {
                out.note(format!(
                    "[{}] '{}' is a chewable variant not in the input; excluded",
                    candidate.id, candidate.name
                ));
                continue;
            }
            out.value.push(candidate);
        }

        out.note(format!("filter kept {} candidate(s)", out.value.len()));
        out
    }

    /// True when the name carries the parsed strength or concentration.
    ///
    /// Matching is textual after normalization; concentrations also match on
    /// equal per-volume ratios, so "125 MG/5 ML" matches "25 MG/ML".
    pub fn amount_matches(&self, name: &str, parsed: &ParsedMedication) -> bool {
        let Some(amount) = parsed.amount_str() else {
            return true;
        };
        let normalized = self.normalizer.normalize_text(name);
        if contains_amount(&normalized, amount) {
            return true;
        }
        if !parsed.is_concentration() {
            return false;
        }

        let (Some(wanted), Some(found)) = (
            self.normalizer.find_concentration(amount),
            self.normalizer.find_concentration(&normalized),
        ) else {
            return false;
        };
        wanted.unit == found.unit && (wanted.ratio() - found.ratio()).abs() <= RATIO_TOLERANCE
    }

    /// True when the name mentions one of the form's name synonyms.
    pub fn name_has_form(&self, name: &str, form: DoseForm) -> bool {
        let lower = name.to_lowercase();
        self.normalizer
            .tables()
            .form(form)
            .is_some_and(|entry| entry.name_synonyms.iter().any(|s| lower.contains(s.as_str())))
    }

    /// A chewable candidate whose name lacks the parsed form, for an input
    /// that never asked for chewable.
    pub fn is_unrequested_chewable(&self, name: &str, parsed: &ParsedMedication) -> bool {
        let Some(form) = parsed.dose_form else {
            return false;
        };
        !self.name_has_form(name, form) && is_chewable_variant(name, parsed)
    }
}

/// Name says chewable, input does not.
pub fn is_chewable_variant(name: &str, parsed: &ParsedMedication) -> bool {
    name.to_lowercase().contains(CHEWABLE) && !parsed.original.to_lowercase().contains(CHEWABLE)
}

/// Substring match that will not match "500 MG" inside "1500 MG" or "5 MG"
/// inside "2.5 MG".
fn contains_amount(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(start, m)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + m.len()..].chars().next();
        !before.is_some_and(|c| c.is_ascii_digit() || c == '.')
            && !after.is_some_and(|c| c.is_alphanumeric() || c == '.')
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConceptStatus, TermType};

    fn candidate(id: &str, name: &str, tty: TermType) -> Candidate {
        let mut c = Candidate::new(id, name);
        c.term_type = Some(tty);
        c.status = Some(ConceptStatus::Active);
        c
    }

    fn ids(out: &StageOutput<Vec<Candidate>>) -> Vec<&str> {
        out.value.iter().map(|c| c.id.as_str()).collect()
    }

    #[test]
    fn test_stage_a_excludes_ingredients() {
        let normalizer = Normalizer::new();
        let parsed = normalizer.parse("metformin");
        let out = FilterEngine::new(&normalizer).filter(
            vec![
                candidate("1", "metformin", TermType::In),
                candidate("2", "metformin / sitagliptin", TermType::Min),
                candidate("3", "metformin hydrochloride", TermType::Pin),
                candidate("4", "metformin 500 MG Oral Tablet", TermType::Scd),
            ],
            &parsed,
        );
        assert_eq!(ids(&out), vec!["4"]);
    }

    #[test]
    fn test_stage_a_excludes_inactive() {
        let normalizer = Normalizer::new();
        let parsed = normalizer.parse("metformin");
        let mut stale = candidate("1", "metformin 500 MG Oral Tablet", TermType::Scd);
        stale.status = Some(ConceptStatus::NotFound);
        let out = FilterEngine::new(&normalizer).filter(vec![stale], &parsed);
        assert!(out.value.is_empty());
    }

    #[test]
    fn test_strength_must_appear() {
        let normalizer = Normalizer::new();
        let parsed = normalizer.parse("metformin 500 mg tablet");
        let out = FilterEngine::new(&normalizer).filter(
            vec![
                candidate("1", "metformin hydrochloride 1500 MG Oral Tablet", TermType::Scd),
                candidate("2", "metformin hydrochloride 500 MG Oral Tablet", TermType::Scd),
                candidate("3", "metformin hydrochloride 850 MG Oral Tablet", TermType::Scd),
            ],
            &parsed,
        );
        assert_eq!(ids(&out), vec!["2"]);
    }

    #[test]
    fn test_concentration_ratio_match() {
        let normalizer = Normalizer::new();
        let parsed = normalizer.parse("amoxicillin 125 mg/5 ml suspension");
        let engine = FilterEngine::new(&normalizer);
        assert!(engine.amount_matches("amoxicillin 25 MG/ML Oral Suspension", &parsed));
        assert!(engine.amount_matches("amoxicillin 125 MG per 5 mL Oral Suspension", &parsed));
        assert!(!engine.amount_matches("amoxicillin 250 MG/5 ML Oral Suspension", &parsed));
        assert!(!engine.amount_matches("amoxicillin 125 MCG/5 ML Oral Suspension", &parsed));
    }

    #[test]
    fn test_unrequested_chewable_without_form_is_excluded() {
        let normalizer = Normalizer::new();
        let parsed = normalizer.parse("aspirin 81 mg tablet");
        let out = FilterEngine::new(&normalizer).filter(
            vec![
                candidate("1", "aspirin 81 MG Chewable Bar", TermType::Scd),
                candidate("2", "aspirin 81 MG Chewable Tablet", TermType::Scd),
                candidate("3", "aspirin 81 MG Oral Tablet", TermType::Scd),
            ],
            &parsed,
        );
        assert_eq!(ids(&out), vec!["2", "3"]);
    }

    #[test]
    fn test_requested_chewable_is_kept() {
        let normalizer = Normalizer::new();
        let parsed = normalizer.parse("aspirin 81 mg chewable tablet");
        let out = FilterEngine::new(&normalizer)
            .filter(vec![candidate("1", "aspirin 81 MG Chewable Bar", TermType::Scd)], &parsed);
        assert_eq!(ids(&out), vec!["1"]);
    }

    #[test]
    fn test_missing_form_alone_is_not_excluded() {
        let normalizer = Normalizer::new();
        let parsed = normalizer.parse("ibuprofen 200 mg capsule");
        let out = FilterEngine::new(&normalizer)
            .filter(vec![candidate("1", "ibuprofen 200 MG Oral Tablet", TermType::Scd)], &parsed);
        assert_eq!(ids(&out), vec!["1"]);
    }

    #[test]
    fn test_contains_amount_boundaries() {
        assert!(contains_amount("metformin 500 MG oral tablet", "500 MG"));
        assert!(!contains_amount("metformin 1500 MG oral tablet", "500 MG"));
        assert!(!contains_amount("warfarin 2.5 MG oral tablet", "5 MG"));
        assert!(!contains_amount("x 5 MGS", "5 MG"));
        assert!(contains_amount("morphine 2 MG/ML", "2 MG/ML"));
    }
}
