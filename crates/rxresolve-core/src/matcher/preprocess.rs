//! Text preprocessing shared by the input and every candidate.

use regex::Regex;

/// Lowercases, trims, collapses whitespace and applies whole-word
/// substitutions such as "actuation" → "inhal" and "aerosol" → "inhaler".
pub struct Preprocessor {
    substitutions: Vec<(Regex, String)>,
}

impl Preprocessor {
    pub fn new(substitutions: &[(String, String)]) -> Self {
        let substitutions = substitutions
            .iter()
            .filter(|(from, _)| !from.trim().is_empty())
            .filter_map(|(from, to)| {
                let pattern = format!(r"\b{}\b", regex::escape(&from.to_lowercase()));
                match Regex::new(&pattern) {
                    Ok(re) => Some((re, to.to_lowercase())),
                    Err(e) => {
                        tracing::warn!(%from, error = %e, "skipping substitution");
                        None
                    }
                }
            })
            .collect();
        Self { substitutions }
    }

    pub fn apply(&self, text: &str) -> String {
        let mut out = text.trim().to_lowercase();
        for (pattern, replacement) in &self.substitutions {
            out = pattern.replace_all(&out, replacement.as_str()).into_owned();
        }
        out.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}
