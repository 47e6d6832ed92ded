//! Deterministic resolution pipeline.
//!
//! Pipeline: Parse → Terms → Collect (+ remap, hydrate) → Filter → Score → Verify → Differences
//!
//! Each stage returns a [`StageOutput`]; the [`Resolver`] appends every
//! stage's log entries to the attempts log of the resolution it is building.

mod collector;
mod differences;
mod filter;
mod hydrator;
mod normalizer;
mod scorer;
mod terms;
mod verifier;

pub use collector::*;
pub use differences::*;
pub use filter::*;
pub use hydrator::*;
pub use normalizer::*;
pub use scorer::*;
pub use terms::*;
pub use verifier::*;

use chrono::Utc;
use uuid::Uuid;

use crate::config::ResolverConfig;
use crate::matcher::HybridMatcher;
use crate::models::{Candidate, ParsedMedication, Resolution};
use crate::terminology::TerminologyService;

/// A stage's result together with the attempts-log entries it produced.
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutput<T> {
    pub value: T,
    pub log: Vec<String>,
}

impl<T> StageOutput<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            log: Vec::new(),
        }
    }

    /// Append one log entry.
    pub fn note(&mut self, entry: impl Into<String>) {
        self.log.push(entry.into());
    }

    /// Take over another stage's log entries and return its value.
    pub fn absorb<U>(&mut self, other: StageOutput<U>) -> U {
        self.log.extend(other.log);
        other.value
    }

    /// Move the log entries onto `log` and return the value.
    pub fn append_to(self, log: &mut Vec<String>) -> T {
        log.extend(self.log);
        self.value
    }
}

/// Coordinates the pipeline stages for one terminology service.
pub struct Resolver<S: TerminologyService> {
    terminology: S,
    normalizer: Normalizer,
    config: ResolverConfig,
    matcher: Option<HybridMatcher>,
}

impl<S: TerminologyService> Resolver<S> {
    /// Create a resolver with the default configuration.
    pub fn new(terminology: S) -> Self {
        Self::with_config(terminology, ResolverConfig::default())
    }

    pub fn with_config(terminology: S, config: ResolverConfig) -> Self {
        Self {
            terminology,
            normalizer: Normalizer::with_tables(config.vocabulary.clone()),
            config,
            matcher: None,
        }
    }

    /// Attach a hybrid matcher used to cross-check the ranked candidates.
    pub fn with_matcher(mut self, matcher: HybridMatcher) -> Self {
        self.matcher = Some(matcher);
        self
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    pub fn terminology(&self) -> &S {
        &self.terminology
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn parse(&self, text: &str) -> ParsedMedication {
        self.normalizer.parse(text)
    }

    pub fn build_terms(&self, parsed: &ParsedMedication) -> Vec<String> {
        TermGenerator::new(self.normalizer.tables()).build_terms(parsed)
    }

    /// Resolve free text to a verified concept.
    ///
    /// Never fails: lookup errors are recorded in the attempts log and a
    /// missing winner is reported as `final_concept: None`.
    pub fn resolve(&self, text: &str) -> Resolution {
        let request_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!("resolve", %request_id);
        let _enter = span.enter();

        let mut log = Vec::new();
        let normalized = self.normalizer.normalize_text(text);
        let parsed = self.parse(text);
        log.push(format!(
            "parsed: ingredient='{}' amount={} form={} route={} brand={}",
            parsed.ingredient,
            parsed.amount_str().unwrap_or("-"),
            parsed.dose_form.map(|f| f.as_str()).unwrap_or("-"),
            parsed.route.map(|r| r.as_str()).unwrap_or("-"),
            parsed.brand.as_deref().unwrap_or("-"),
        ));

        let terms = self.build_terms(&parsed);
        log.push(format!("terms: {}", terms.join(" | ")));
        tracing::debug!(terms = terms.len(), "search terms built");

        let collected = Collector::new(&self.terminology, self.config.approx_max_entries)
            .collect(&terms)
            .append_to(&mut log);
        let collected_count = collected.candidates.len();

        let filtered = FilterEngine::new(&self.normalizer)
            .filter(collected.candidates.into_vec(), &parsed)
            .append_to(&mut log);

        let ranked = Scorer::new(&self.config.scoring, self.normalizer.tables())
            .rank(filtered, &parsed)
            .append_to(&mut log);

        let hybrid_pick = self.hybrid_pick(&normalized, &ranked, &mut log);

        let final_concept = Verifier::new(&self.terminology)
            .verify(&ranked)
            .append_to(&mut log);

        let differences = match &final_concept {
            Some(winner) => {
                tracing::info!(id = %winner.id, name = %winner.name, "resolved");
                DifferenceReporter::new(&self.normalizer).report(
                    &parsed,
                    winner,
                    hybrid_pick.as_deref(),
                )
            }
            None => {
                tracing::info!(collected = collected_count, "no verified candidate");
                vec![unresolved_reason(collected_count, ranked.len()).to_string()]
            }
        };

        Resolution {
            request_id,
            resolved_at: Utc::now().to_rfc3339(),
            input: text.to_string(),
            normalized,
            final_concept,
            group_id: collected.group,
            differences,
            candidates: ranked,
            hybrid_pick,
            attempts_log: log,
        }
    }

    /// Best-fit name among the ranked candidates according to the attached
    /// matcher. Embedding failures are logged, never propagated.
    fn hybrid_pick(
        &self,
        normalized: &str,
        ranked: &[Candidate],
        log: &mut Vec<String>,
    ) -> Option<String> {
        let matcher = self.matcher.as_ref()?;
        if ranked.is_empty() {
            return None;
        }
        let names: Vec<String> = ranked.iter().map(|c| c.name.clone()).collect();
        match matcher.best_match(normalized, &names) {
            Ok(result) => {
                log.push(format!(
                    "hybrid pick: {} ({})",
                    result.candidate.as_deref().unwrap_or("none"),
                    result.reason
                ));
                result.candidate
            }
            Err(e) => {
                tracing::warn!(error = %e, "hybrid cross-check failed");
                log.push(format!("hybrid cross-check failed: {}", e));
                None
            }
        }
    }
}

fn unresolved_reason(collected: usize, surviving: usize) -> &'static str {
    if collected == 0 {
        "no candidates found for any search term"
    } else if surviving == 0 {
        "no candidate survived filtering"
    } else {
        "no candidate passed verification"
    }
}
