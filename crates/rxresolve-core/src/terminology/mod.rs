//! Terminology lookup seam.
//!
//! The pipeline only ever talks to a `TerminologyService`. `RxNavClient` is the
//! HTTP implementation; `InMemoryTerminology` backs tests and offline runs.

mod memory;
mod rxnav;

pub use memory::*;
pub use rxnav::*;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{ConceptStatus, TermType};

/// Terminology lookup errors.
#[derive(Error, Debug)]
pub enum TerminologyError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Terminology service returned HTTP {status}: {body}")]
    Service { status: u16, body: String },

    #[error("Response parsing error: {0}")]
    Parse(String),

    #[error("Unknown identifier: {0}")]
    NotFound(String),
}

pub type TerminologyResult<T> = Result<T, TerminologyError>;

/// One hit from an approximate-term lookup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApproximateMatch {
    pub id: String,
    /// Atom identifier
    pub alt_id: Option<String>,
    pub name: Option<String>,
    pub score: Option<f64>,
    pub source: Option<String>,
}

/// Properties of one identifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConceptProperties {
    pub id: String,
    pub name: String,
    pub term_type: TermType,
    /// Raw pipe-delimited synonym field
    pub synonym: String,
}

impl ConceptProperties {
    /// Synonyms split on `|`, trimmed, blanks dropped.
    pub fn synonyms(&self) -> Vec<String> {
        self.synonym
            .split('|')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Status of one identifier, with its successor when remapped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusReport {
    pub status: ConceptStatus,
    pub successor: Option<String>,
}

/// The five lookups the resolution pipeline needs.
pub trait TerminologyService: Send + Sync {
    /// Identifiers whose name matches exactly.
    fn find_exact(&self, name: &str) -> TerminologyResult<Vec<String>>;

    /// Scored, misspelling-tolerant matches.
    fn find_approximate(
        &self,
        term: &str,
        max_entries: usize,
    ) -> TerminologyResult<Vec<ApproximateMatch>>;

    fn properties(&self, id: &str) -> TerminologyResult<ConceptProperties>;

    fn status(&self, id: &str) -> TerminologyResult<StatusReport>;

    /// Number of real-world distribution records for the identifier.
    fn market_presence(&self, id: &str) -> TerminologyResult<u32>;
}

impl<T: TerminologyService + ?Sized> TerminologyService for Box<T> {
    fn find_exact(&self, name: &str) -> TerminologyResult<Vec<String>> {
        (**self).find_exact(name)
    }

    fn find_approximate(
        &self,
        term: &str,
        max_entries: usize,
    ) -> TerminologyResult<Vec<ApproximateMatch>> {
        (**self).find_approximate(term, max_entries)
    }

    fn properties(&self, id: &str) -> TerminologyResult<ConceptProperties> {
        (**self).properties(id)
    }

    fn status(&self, id: &str) -> TerminologyResult<StatusReport> {
        (**self).status(id)
    }

    fn market_presence(&self, id: &str) -> TerminologyResult<u32> {
        (**self).market_presence(id)
    }
}
