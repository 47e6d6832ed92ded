//! RxResolve Core Library
//!
//! Resolves free-text medication descriptions to drug-concept identifiers in
//! an external terminology service, with an explainable trail.
//!
//! # Architecture
//!
//! ```text
//! "metformin 500 MG oral tablet"
//!              │
//!     Normalizer / Parser ──► ParsedMedication
//!              │
//!       Term Generator ──► ["metformin 500 MG Oral Tablet", ..., "metformin"]
//!              │
//!   ┌──────────▼──────────┐
//!   │ Collector           │  exact + approximate lookup per term
//!   │   └─ Hydrator       │  remap → properties → market presence
//!   └──────────┬──────────┘
//!              │
//!   Filter (type/status, amount, chewable) → Scorer → Verifier
//!              │                               │
//!              │                    HybridMatcher cross-check (optional)
//!              ▼
//!      Differences ──► Resolution { final, groupId, differences, attemptsLog }
//! ```
//!
//! The [`matcher::HybridMatcher`] also works on its own: given any pool of
//! names it blends embedding similarity with token overlap and can escalate
//! the short list to an LLM judge.
//!
//! # Core Principle
//!
//! **Resolution never throws.** Lookup failures are recorded in the attempts
//! log; "nothing verified" is a `Resolution` with no final concept.
//!
//! # Modules
//!
//! - [`config`]: Vocabulary tables, scoring weights, matcher settings, service endpoints
//! - [`models`]: Domain types (ParsedMedication, Candidate, Resolution, MatchResult)
//! - [`terminology`]: Terminology service seam, RxNav client, in-memory service
//! - [`resolver`]: Deterministic pipeline stages and the coordinating `Resolver`
//! - [`matcher`]: Hybrid similarity matcher, embedding cache, judge re-ranking

pub mod config;
pub mod matcher;
pub mod models;
pub mod resolver;
pub mod terminology;

// Re-export commonly used types
pub use config::{MatcherConfig, ResolverConfig, ScoringWeights, ServiceConfig, VocabularyTables};
pub use matcher::{EmbeddingCache, EmbeddingService, HybridMatcher, Reranker};
pub use models::{
    Amount, Candidate, ConceptStatus, DoseForm, FinalConcept, MatchMethod, MatchResult,
    ParsedMedication, Resolution, Route, SimilarityEvaluation, TermType,
};
pub use resolver::{Normalizer, Resolver, TermGenerator};
pub use terminology::{InMemoryTerminology, RxNavClient, TerminologyService};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::sync::Arc;

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum RxResolveError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Terminology error: {0}")]
    TerminologyError(String),

    #[error("Matching error: {0}")]
    MatchError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<config::ConfigError> for RxResolveError {
    fn from(e: config::ConfigError) -> Self {
        RxResolveError::ConfigError(e.to_string())
    }
}

impl From<terminology::TerminologyError> for RxResolveError {
    fn from(e: terminology::TerminologyError) -> Self {
        RxResolveError::TerminologyError(e.to_string())
    }
}

impl From<matcher::MatchError> for RxResolveError {
    fn from(e: matcher::MatchError) -> Self {
        RxResolveError::MatchError(e.to_string())
    }
}

impl From<serde_json::Error> for RxResolveError {
    fn from(e: serde_json::Error) -> Self {
        RxResolveError::SerializationError(e.to_string())
    }
}

// =========================================================================
// Free Functions (exported to FFI)
// =========================================================================

/// Parse a description with the default vocabulary tables.
#[uniffi::export]
pub fn parse_medication(text: String) -> FfiParsedMedication {
    Normalizer::new().parse(&text).into()
}

/// Ordered lookup terms for a description, most specific first.
#[uniffi::export]
pub fn build_search_terms(text: String) -> Vec<String> {
    let normalizer = Normalizer::new();
    let parsed = normalizer.parse(&text);
    TermGenerator::new(normalizer.tables()).build_terms(&parsed)
}

/// Create a resolver backed by the RxNav REST API at `base_url`.
#[uniffi::export]
pub fn open_rxnav_resolver(base_url: String) -> Result<Arc<RxResolveCore>, RxResolveError> {
    let timeout = ServiceConfig::default().timeout_secs;
    let client = RxNavClient::new(&base_url, timeout)?;
    Ok(Arc::new(RxResolveCore {
        resolver: Resolver::new(client),
    }))
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe resolver handle for FFI.
#[derive(uniffi::Object)]
pub struct RxResolveCore {
    resolver: Resolver<RxNavClient>,
}

#[uniffi::export]
impl RxResolveCore {
    /// Resolve free text. Always returns a resolution; check `final_concept`.
    pub fn resolve(&self, text: String) -> FfiResolution {
        self.resolver.resolve(&text).into()
    }

    /// Full resolution as camelCase JSON.
    pub fn resolve_json(&self, text: String) -> Result<String, RxResolveError> {
        Ok(serde_json::to_string(&self.resolver.resolve(&text))?)
    }

    /// Lookup terms the resolver would try, without any network call.
    pub fn preview_terms(&self, text: String) -> Vec<String> {
        let parsed = self.resolver.parse(&text);
        self.resolver.build_terms(&parsed)
    }
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe parsed medication.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiParsedMedication {
    pub ingredient: String,
    pub strength: Option<String>,
    pub concentration: Option<String>,
    pub is_concentration: bool,
    pub dose_form: Option<String>,
    pub route: Option<String>,
    pub brand: Option<String>,
    pub original: String,
}

impl From<ParsedMedication> for FfiParsedMedication {
    fn from(parsed: ParsedMedication) -> Self {
        Self {
            strength: parsed.strength().map(str::to_string),
            concentration: parsed.concentration().map(str::to_string),
            is_concentration: parsed.is_concentration(),
            dose_form: parsed.dose_form.map(|f| f.to_string()),
            route: parsed.route.map(|r| r.to_string()),
            ingredient: parsed.ingredient,
            brand: parsed.brand,
            original: parsed.original,
        }
    }
}

/// FFI-safe candidate.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiCandidate {
    pub id: String,
    pub name: String,
    pub term_type: Option<String>,
    pub source: Option<String>,
    pub composite_score: Option<f64>,
    pub market_presence_count: Option<u32>,
}

impl From<Candidate> for FfiCandidate {
    fn from(c: Candidate) -> Self {
        Self {
            id: c.id,
            name: c.name,
            term_type: c.term_type.map(String::from),
            source: c.source,
            composite_score: c.composite_score,
            market_presence_count: c.market_presence_count,
        }
    }
}

/// FFI-safe verified winner.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiFinalConcept {
    pub id: String,
    pub term_type: String,
    pub name: String,
    pub status: String,
    pub status_checked: bool,
    pub properties_checked: bool,
    pub market_found: bool,
}

impl From<FinalConcept> for FfiFinalConcept {
    fn from(f: FinalConcept) -> Self {
        Self {
            id: f.id,
            term_type: String::from(f.term_type),
            name: f.name,
            status: format!("{:?}", f.status),
            status_checked: f.verification.status_checked,
            properties_checked: f.verification.properties_checked,
            market_found: f.verification.market_found,
        }
    }
}

/// FFI-safe resolution.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiResolution {
    pub request_id: String,
    pub resolved_at: String,
    pub input: String,
    pub normalized: String,
    pub final_concept: Option<FfiFinalConcept>,
    pub ingredient_id: Option<String>,
    pub ingredient_name: Option<String>,
    pub differences: Vec<String>,
    /// False when `differences` holds only the no-difference marker
    pub has_differences: bool,
    pub candidates: Vec<FfiCandidate>,
    pub hybrid_pick: Option<String>,
    pub attempts_log: Vec<String>,
}

impl From<Resolution> for FfiResolution {
    fn from(r: Resolution) -> Self {
        let has_differences = r.has_differences();
        Self {
            request_id: r.request_id,
            resolved_at: r.resolved_at,
            input: r.input,
            normalized: r.normalized,
            final_concept: r.final_concept.map(Into::into),
            ingredient_id: r.group_id.ingredient_id,
            ingredient_name: r.group_id.ingredient_name,
            differences: r.differences,
            has_differences,
            candidates: r.candidates.into_iter().map(Into::into).collect(),
            hybrid_pick: r.hybrid_pick,
            attempts_log: r.attempts_log,
        }
    }
}
