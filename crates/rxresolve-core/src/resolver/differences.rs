//! Advisory mismatch notes between the input and the winner.

use std::cmp::Ordering;

use super::{is_chewable_variant, word_tokens, FilterEngine, Normalizer};
use crate::models::{FinalConcept, ParsedMedication, NO_DIFFERENCES};

/// Jaro-Winkler similarity above which a name token is offered as the
/// likely spelling of a missing ingredient.
const CLOSEST_TOKEN_THRESHOLD: f64 = 0.85;

/// Explains how the winning concept differs from what was asked for.
pub struct DifferenceReporter<'a> {
    filter: FilterEngine<'a>,
}

impl<'a> DifferenceReporter<'a> {
    pub fn new(normalizer: &'a Normalizer) -> Self {
        Self {
            filter: FilterEngine::new(normalizer),
        }
    }

    /// Mismatch notes for a verified winner; `["—"]` when there are none.
    pub fn report(
        &self,
        parsed: &ParsedMedication,
        winner: &FinalConcept,
        hybrid_pick: Option<&str>,
    ) -> Vec<String> {
        let name = winner.name.as_str();
        let lower = name.to_lowercase();
        let mut notes = Vec::new();

        if !parsed.ingredient.is_empty() && !lower.contains(&parsed.ingredient) {
            match closest_token(&parsed.ingredient, name) {
                Some(token) => notes.push(format!(
                    "ingredient '{}' not in result (closest: '{}')",
                    parsed.ingredient, token
                )),
                None => notes.push(format!("ingredient '{}' not in result", parsed.ingredient)),
            }
        }

        if let Some(amount) = parsed.amount_str() {
            if !self.filter.amount_matches(name, parsed) {
                let kind = if parsed.is_concentration() {
                    "concentration"
                } else {
                    "strength"
                };
                notes.push(format!("{} {} not in result", kind, amount));
            }
        }

        if let Some(form) = parsed.dose_form {
            if !self.filter.name_has_form(name, form) {
                notes.push(format!("dose form {} not in result", form));
            }
        }

        if let Some(brand) = parsed.brand.as_deref() {
            if !lower.contains(&brand.to_lowercase()) {
                notes.push(format!(
                    "brand {} not matched; returning generic {}",
                    brand, winner.term_type
                ));
            }
        }

        if is_chewable_variant(name, parsed) {
            notes.push("result is a chewable variant; input did not ask for chewable".into());
        }

        if let Some(pick) = hybrid_pick {
            if !pick.eq_ignore_ascii_case(name) {
                notes.push(format!("hybrid matcher preferred '{}'", pick));
            }
        }

        if notes.is_empty() {
            notes.push(NO_DIFFERENCES.to_string());
        }
        notes
    }
}

fn closest_token(word: &str, name: &str) -> Option<String> {
    word_tokens(name)
        .into_iter()
        .map(|token| (strsim::jaro_winkler(word, &token), token))
        .filter(|(score, _)| *score >= CLOSEST_TOKEN_THRESHOLD)
        .max_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal))
        .map(|(_, token)| token)
}
