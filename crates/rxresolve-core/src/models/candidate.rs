//! Terminology candidates collected during a resolution.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Concept type code (TTY) from the terminology service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TermType {
    /// Semantic clinical drug
    Scd,
    /// Semantic branded drug
    Sbd,
    /// Generic pack
    Gpck,
    /// Branded pack
    Bpck,
    /// Ingredient
    In,
    /// Multiple ingredients
    Min,
    /// Precise ingredient
    Pin,
    Other(String),
}

impl TermType {
    /// Types that can be dispensed and so may become a resolution result.
    pub fn is_dispensable(&self) -> bool {
        matches!(
            self,
            TermType::Scd | TermType::Sbd | TermType::Gpck | TermType::Bpck
        )
    }

    /// Ingredient-level types, used only as a grouping anchor.
    pub fn is_ingredient(&self) -> bool {
        matches!(self, TermType::In | TermType::Min)
    }

    pub fn as_str(&self) -> &str {
        match self {
            TermType::Scd => "SCD",
            TermType::Sbd => "SBD",
            TermType::Gpck => "GPCK",
            TermType::Bpck => "BPCK",
            TermType::In => "IN",
            TermType::Min => "MIN",
            TermType::Pin => "PIN",
            TermType::Other(s) => s,
        }
    }
}

impl From<&str> for TermType {
    fn from(s: &str) -> Self {
        match s.trim().to_uppercase().as_str() {
            "SCD" => TermType::Scd,
            "SBD" => TermType::Sbd,
            "GPCK" => TermType::Gpck,
            "BPCK" => TermType::Bpck,
            "IN" => TermType::In,
            "MIN" => TermType::Min,
            "PIN" => TermType::Pin,
            other => TermType::Other(other.to_string()),
        }
    }
}

impl From<String> for TermType {
    fn from(s: String) -> Self {
        TermType::from(s.as_str())
    }
}

impl From<TermType> for String {
    fn from(t: TermType) -> Self {
        t.as_str().to_string()
    }
}

impl fmt::Display for TermType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of an identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConceptStatus {
    Active,
    Remapped,
    NotFound,
}

impl ConceptStatus {
    /// Map a terminology status string. Anything that is neither active nor
    /// remapped (obsolete, quantified, unknown) is treated as not found.
    pub fn from_service(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "active" => ConceptStatus::Active,
            "remapped" => ConceptStatus::Remapped,
            _ => ConceptStatus::NotFound,
        }
    }
}

/// A candidate concept, annotated in place as it moves through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    /// Identifier after remap resolution
    pub id: String,
    /// Atom identifier from the approximate lookup, if any
    pub alt_id: Option<String>,
    pub name: String,
    /// Source vocabulary reported by the approximate lookup
    pub source: Option<String>,
    #[serde(rename = "type")]
    pub term_type: Option<TermType>,
    pub approx_score: Option<f64>,
    pub market_presence_count: Option<u32>,
    pub status: Option<ConceptStatus>,
    pub composite_score: Option<f64>,
    pub synonyms: Vec<String>,
}

impl Candidate {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            alt_id: None,
            name: name.into(),
            source: None,
            term_type: None,
            approx_score: None,
            market_presence_count: None,
            status: None,
            composite_score: None,
            synonyms: Vec::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == Some(ConceptStatus::Active)
    }

    pub fn is_dispensable(&self) -> bool {
        self.term_type.as_ref().is_some_and(TermType::is_dispensable)
    }
}

/// Candidates keyed by identifier, kept in first-insertion order.
#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    order: Vec<Candidate>,
    index: HashMap<String, usize>,
}

impl CandidateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a candidate unless its id is already present.
    ///
    /// Returns `false` when the id was a duplicate (first occurrence wins).
    pub fn insert(&mut self, candidate: Candidate) -> bool {
        if self.index.contains_key(&candidate.id) {
            return false;
        }
        self.index.insert(candidate.id.clone(), self.order.len());
        self.order.push(candidate);
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Candidate> {
        self.index.get(id).map(|&i| &self.order[i])
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Candidate> {
        self.index.get(id).map(|&i| &mut self.order[i])
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candidate> {
        self.order.iter()
    }

    pub fn into_vec(self) -> Vec<Candidate> {
        self.order
    }
}
