//! Text normalizer and medication parser.
//!
//! Handles:
//! - Unit spelling (milligrams→MG, cc→ML, mcg→MCG)
//! - Concentration separators ("mg per 5 ml", "mg in 5ml", "mg/5ml" → "MG/5 ML")
//! - Bracketed brand suffixes ("... [Glucophage]")
//! - Dose form and route keywords, matched as whole words
//!
//! Parsing is total: any input yields a `ParsedMedication`, degrading to a
//! best-effort ingredient guess when nothing else is recognized.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;

use crate::config::VocabularyTables;
use crate::models::{Amount, DoseForm, ParsedMedication, Route};

static DIGIT_LETTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d)([a-zµ%])").unwrap());

static THOUSANDS_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d),(\d{3})\b").unwrap());

static BRAND_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\[\]]*)\]\s*$").unwrap());

/// `<num> UNIT/[<num> ]UNIT` on normalized text.
static CONCENTRATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+(?:\.\d+)?) ([A-Z]+)/(?:(\d+(?:\.\d+)?) )?([A-Z]+)\b").unwrap()
});

/// `<num> UNIT` on normalized text.
static STRENGTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?) ([A-Z]+)\b").unwrap());

/// A concentration split into its parts.
#[derive(Debug, Clone, PartialEq)]
pub struct ConcentrationParts {
    pub amount: f64,
    pub unit: String,
    /// Denominator volume; 1 when written as "MG/ML"
    pub volume: f64,
    /// Canonical text, e.g. "125 MG/5 ML"
    pub text: String,
}

impl ConcentrationParts {
    /// Amount per single volume unit.
    pub fn ratio(&self) -> f64 {
        if self.volume == 0.0 {
            self.amount
        } else {
            self.amount / self.volume
        }
    }
}

/// Normalizer and parser for medication descriptions.
pub struct Normalizer {
    tables: VocabularyTables,
    /// Lowercase spelling → canonical unit
    unit_lookup: HashMap<String, String>,
    /// Words that can never be the ingredient
    stop_words: HashSet<String>,
    /// Canonical units that can lead a strength or concentration
    mass_units: HashSet<String>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Normalizer {
    /// Create a normalizer with the default vocabulary tables.
    pub fn new() -> Self {
        Self::with_tables(VocabularyTables::default())
    }

    /// Create a normalizer over custom vocabulary tables.
    pub fn with_tables(tables: VocabularyTables) -> Self {
        let mut unit_lookup = HashMap::new();
        for entry in &tables.units {
            unit_lookup.insert(entry.canonical.to_lowercase(), entry.canonical.clone());
            for alias in &entry.aliases {
                unit_lookup.insert(alias.to_lowercase(), entry.canonical.clone());
            }
        }

        let mut stop_words: HashSet<String> = unit_lookup.keys().cloned().collect();
        for form in &tables.forms {
            for kw in &form.keywords {
                stop_words.extend(kw.split_whitespace().map(str::to_lowercase));
            }
        }
        for route in &tables.routes {
            for kw in &route.keywords {
                stop_words.extend(kw.split_whitespace().map(str::to_lowercase));
            }
        }
        for sep in ["per", "in", "of", "and", "/"] {
            stop_words.insert(sep.to_string());
        }

        let mass_units = tables.mass_units().into_iter().map(str::to_string).collect();

        Self {
            tables,
            unit_lookup,
            stop_words,
            mass_units,
        }
    }

    pub fn tables(&self) -> &VocabularyTables {
        &self.tables
    }

    /// Canonical spelling of a unit, if recognized.
    pub fn canonical_unit(&self, unit: &str) -> Option<&str> {
        self.unit_lookup
            .get(&unit.to_lowercase())
            .map(String::as_str)
    }

    fn is_mass_unit(&self, token: &str) -> bool {
        self.mass_units.contains(token)
    }

    fn is_volume_unit(&self, token: &str) -> bool {
        token == self.tables.volume_unit
    }

    /// Canonicalize case, unit spellings and concentration separators.
    ///
    /// Words are lowercased; canonical units are uppercase; a concentration
    /// always reads `<num> UNIT/<num> VOL` or `<num> UNIT/VOL`.
    pub fn normalize_text(&self, text: &str) -> String {
        let lower = text.trim().to_lowercase();
        let lower = THOUSANDS_SEPARATOR.replace_all(&lower, "$1$2");
        let spaced = DIGIT_LETTER.replace_all(&lower, "$1 $2");
        let spaced: String = spaced
            .chars()
            .flat_map(|c| match c {
                '/' | ',' | '(' | ')' | ';' => vec![' ', c, ' '],
                _ => vec![c],
            })
            .collect();

        let tokens: Vec<String> = spaced
            .split_whitespace()
            .filter(|t| !matches!(*t, "," | "(" | ")" | ";"))
            .map(|t| {
                self.canonical_unit(t)
                    .map(str::to_string)
                    .unwrap_or_else(|| t.to_string())
            })
            .collect();

        let mut out: Vec<String> = Vec::with_capacity(tokens.len());
        let mut i = 0;
        while i < tokens.len() {
            let tok = &tokens[i];
            if self.is_mass_unit(tok) && i + 2 < tokens.len() {
                let sep = tokens[i + 1].as_str();
                if matches!(sep, "/" | "per" | "in") {
                    let next = &tokens[i + 2];
                    if self.is_volume_unit(next) {
                        out.push(format!("{}/{}", tok, next));
                        i += 3;
                        continue;
                    }
                    if is_number(next)
                        && i + 3 < tokens.len()
                        && self.is_volume_unit(&tokens[i + 3])
                    {
                        out.push(format!("{}/{}", tok, next));
                        out.push(tokens[i + 3].clone());
                        i += 4;
                        continue;
                    }
                }
            }
            out.push(tok.clone());
            i += 1;
        }

        out.join(" ").replace(" / ", "/")
    }

    /// Split a trailing `[Brand]` off the text.
    ///
    /// Returns the remainder and the trimmed brand (if non-empty).
    pub fn extract_brand<'t>(&self, text: &'t str) -> (&'t str, Option<String>) {
        let trimmed = text.trim();
        match BRAND_SUFFIX.captures(trimmed) {
            Some(caps) => {
                let whole = caps.get(0).map(|m| m.start()).unwrap_or(trimmed.len());
                let brand = caps
                    .get(1)
                    .map(|m| m.as_str().trim().to_string())
                    .filter(|b| !b.is_empty());
                (trimmed[..whole].trim_end(), brand)
            }
            None => (trimmed, None),
        }
    }

    /// First concentration in normalized text.
    pub fn find_concentration(&self, normalized: &str) -> Option<ConcentrationParts> {
        CONCENTRATION.captures_iter(normalized).find_map(|caps| {
            let amount_text = caps.get(1)?.as_str();
            let unit = caps.get(2)?.as_str();
            let volume_text = caps.get(3).map(|m| m.as_str());
            let volume_unit = caps.get(4)?.as_str();
            if !self.is_mass_unit(unit) || !self.is_volume_unit(volume_unit) {
                return None;
            }
            let text = match volume_text {
                Some(v) => format!("{} {}/{} {}", amount_text, unit, v, volume_unit),
                None => format!("{} {}/{}", amount_text, unit, volume_unit),
            };
            Some(ConcentrationParts {
                amount: amount_text.parse().ok()?,
                unit: unit.to_string(),
                volume: volume_text.and_then(|v| v.parse().ok()).unwrap_or(1.0),
                text,
            })
        })
    }

    /// First bare strength (`<num> UNIT`) in normalized text.
    pub fn find_strength(&self, normalized: &str) -> Option<String> {
        STRENGTH.captures_iter(normalized).find_map(|caps| {
            let amount = caps.get(1)?.as_str();
            let unit = caps.get(2)?.as_str();
            self.is_mass_unit(unit)
                .then(|| format!("{} {}", amount, unit))
        })
    }

    /// First dose form whose keyword appears, in table order.
    pub fn detect_form(&self, words: &[&str]) -> Option<DoseForm> {
        self.tables
            .forms
            .iter()
            .find(|entry| entry.keywords.iter().any(|kw| contains_phrase(words, kw)))
            .map(|entry| entry.form)
    }

    /// First route whose keyword appears, in table order.
    pub fn detect_route(&self, words: &[&str]) -> Option<Route> {
        self.tables
            .routes
            .iter()
            .find(|entry| entry.keywords.iter().any(|kw| contains_phrase(words, kw)))
            .map(|entry| entry.route)
    }

    /// Parse a free-text description. Never fails.
    pub fn parse(&self, text: &str) -> ParsedMedication {
        let (remainder, brand) = self.extract_brand(text);
        let normalized = self.normalize_text(remainder);
        let lower_words = word_tokens(&normalized);
        let words: Vec<&str> = lower_words.iter().map(String::as_str).collect();

        // Concentration is more specific than a bare strength, so it is tried first.
        let amount = match self.find_concentration(&normalized) {
            Some(c) => Some(Amount::Concentration(c.text)),
            None => self.find_strength(&normalized).map(Amount::Strength),
        };

        let mut dose_form = self.detect_form(&words);
        if dose_form.is_none() && matches!(amount, Some(Amount::Concentration(_))) {
            // Reconstituted-powder convention
            dose_form = Some(DoseForm::Suspension);
        }

        let route = self.detect_route(&words).or_else(|| {
            dose_form
                .and_then(|f| self.tables.form(f))
                .filter(|entry| entry.implies_oral)
                .map(|_| Route::Oral)
        });

        let ingredient = self
            .primary_ingredient(&normalized)
            .or_else(|| self.fallback_ingredient(&normalized))
            .unwrap_or_default();

        ParsedMedication {
            ingredient,
            amount,
            dose_form,
            route,
            brand,
            original: text.to_string(),
        }
    }

    /// Primary tier: first usable word before the first number, after skipping
    /// a leading package volume such as "10 ML".
    fn primary_ingredient(&self, normalized: &str) -> Option<String> {
        let tokens: Vec<&str> = normalized.split_whitespace().collect();
        let skip = match tokens.as_slice() {
            [n, unit, ..] if is_number(n) && self.is_volume_unit(unit) => 2,
            _ => 0,
        };
        tokens[skip..]
            .iter()
            .take_while(|t| !t.chars().any(|c| c.is_ascii_digit()))
            .find_map(|t| self.ingredient_word(t))
    }

    /// Fallback tier: first usable word anywhere in the text.
    fn fallback_ingredient(&self, normalized: &str) -> Option<String> {
        normalized
            .split_whitespace()
            .filter(|t| !t.chars().any(|c| c.is_ascii_digit()))
            .find_map(|t| self.ingredient_word(t))
    }

    fn ingredient_word(&self, token: &str) -> Option<String> {
        let word: String = token
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase();
        if word.is_empty()
            || !word.chars().any(char::is_alphabetic)
            || self.stop_words.contains(&word)
        {
            return None;
        }
        Some(word)
    }
}

/// Lowercase word tokens split on whitespace, slashes and brackets.
pub fn word_tokens(text: &str) -> Vec<String> {
    text.split(|c: char| c.is_whitespace() || matches!(c, '/' | '[' | ']' | '(' | ')' | ','))
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn is_number(token: &str) -> bool {
    !token.is_empty() && token.parse::<f64>().is_ok()
}

fn contains_phrase(words: &[&str], phrase: &str) -> bool {
    let needle: Vec<&str> = phrase.split_whitespace().collect();
    if needle.is_empty() || needle.len() > words.len() {
        return false;
    }
    words
        .windows(needle.len())
        .any(|w| w.iter().zip(&needle).all(|(a, b)| a.eq_ignore_ascii_case(b)))
}
