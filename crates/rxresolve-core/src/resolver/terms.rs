//! Search term generation.
//!
//! Terms are ordered most-specific first. The collector walks them in order,
//! so loose phrasings (ingredient only) are tried only after every narrower
//! phrasing has been looked up.

use std::collections::HashSet;

use crate::config::VocabularyTables;
use crate::models::{Amount, ParsedMedication, Route};

/// Builds ordered, de-duplicated lookup terms from parsed attributes.
pub struct TermGenerator<'a> {
    tables: &'a VocabularyTables,
}

impl<'a> TermGenerator<'a> {
    pub fn new(tables: &'a VocabularyTables) -> Self {
        Self { tables }
    }

    /// Ordered unique lookup terms; never contains empty strings.
    pub fn build_terms(&self, parsed: &ParsedMedication) -> Vec<String> {
        let ing = parsed.ingredient.as_str();
        let amt = parsed.amount_str().unwrap_or("");
        let form_entry = parsed.dose_form.and_then(|f| self.tables.form(f));
        let form_label = form_entry.map(|e| e.label.as_str()).unwrap_or("");
        let brand = parsed
            .brand
            .as_deref()
            .map(|b| format!("[{}]", b))
            .unwrap_or_default();

        let mut terms = TermList::default();

        // 1. everything we know
        terms.push(&[ing, amt, form_label, &brand]);
        // 2. without brand
        terms.push(&[ing, amt, form_label]);

        // 3. alternate concentration phrasings
        if let Some(Amount::Concentration(conc)) = &parsed.amount {
            if let Some((num, den)) = conc.split_once('/') {
                let slash = format!("{}/{}", num.trim(), den.trim());
                let per = format!("{} per {}", num.trim(), den.trim());
                terms.push(&[ing, &slash, form_label]);
                terms.push(&[ing, &per, form_label]);
                terms.push(&[ing, &slash]);
                terms.push(&[ing, &per]);
            }
        }

        // 4. route-qualified
        if let (Some(route), Some(entry)) = (parsed.route, form_entry) {
            terms.push(&[ing, amt, &self.route_qualified_form(route, &entry.label)]);
        }

        // 5. abbreviated form
        if let Some(abbrev) = form_entry.and_then(|e| e.abbreviation.as_deref()) {
            terms.push(&[ing, amt, abbrev]);
        }

        // 6. no form
        terms.push(&[ing, amt]);

        // 7. brand first
        if let Some(b) = parsed.brand.as_deref() {
            terms.push(&[b, amt, form_label]);
        }

        // 8. last resort
        terms.push(&[ing]);

        terms.into_vec()
    }

    /// Form label prefixed by the route label, e.g. "Injectable Solution".
    ///
    /// An "Oral" qualifier already in the label is dropped so that an oral
    /// route reads "Oral Tablet" rather than "Oral Oral Tablet"; a label that
    /// already names the route is returned unchanged.
    fn route_qualified_form(&self, route: Route, label: &str) -> String {
        let Some(route_entry) = self.tables.route(route) else {
            return label.to_string();
        };
        let bare = strip_word_prefix(label, "oral");
        let bare_lower = bare.to_lowercase();
        if route_entry
            .name_synonyms
            .iter()
            .any(|s| bare_lower.contains(&s.to_lowercase()))
        {
            return bare.to_string();
        }
        format!("{} {}", route_entry.label, bare)
    }
}

fn strip_word_prefix<'s>(label: &'s str, word: &str) -> &'s str {
    match label.split_once(' ') {
        Some((first, rest)) if first.eq_ignore_ascii_case(word) => rest.trim_start(),
        _ => label,
    }
}

/// Accumulates terms, dropping blanks and case-insensitive repeats.
#[derive(Default)]
struct TermList {
    terms: Vec<String>,
    seen: HashSet<String>,
}

impl TermList {
    fn push(&mut self, parts: &[&str]) {
        let term = parts
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if term.is_empty() {
            return;
        }
        if self.seen.insert(term.to_lowercase()) {
            self.terms.push(term);
        }
    }

    fn into_vec(self) -> Vec<String> {
        self.terms
    }
}
