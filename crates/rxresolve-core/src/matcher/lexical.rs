//! Token-set overlap.

use std::collections::HashSet;

use crate::resolver::word_tokens;

/// Distinct word tokens of a preprocessed string.
pub fn token_set(text: &str) -> HashSet<String> {
    word_tokens(text).into_iter().collect()
}

/// `|A ∩ B| / max(|A|, |B|)`; 0 when either side has no tokens.
pub fn lexical_overlap(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let denominator = a.len().max(b.len());
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    a.intersection(b).count() as f64 / denominator as f64
}

/// Tokens of `a` that also occur in `b`, in `a`'s order, without repeats.
pub fn shared_tokens(a: &str, b: &HashSet<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    word_tokens(a)
        .into_iter()
        .filter(|t| b.contains(t) && seen.insert(t.clone()))
        .collect()
}

/// A strength-like token such as "90" or "0.5".
pub fn is_numeric_token(token: &str) -> bool {
    token.parse::<f64>().is_ok_and(f64::is_finite)
}

/// Tokens worth citing in a match reason: numbers and words longer than three letters.
pub fn is_high_signal(token: &str) -> bool {
    token.chars().any(|c| c.is_ascii_digit()) || token.chars().count() > 3
}
