//! In-memory terminology service for tests and offline runs.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use super::{
    ApproximateMatch, ConceptProperties, StatusReport, TerminologyError, TerminologyResult,
    TerminologyService,
};
use crate::models::{ConceptStatus, TermType};

/// Fixture-backed `TerminologyService` that records every call it receives.
#[derive(Default)]
pub struct InMemoryTerminology {
    properties: HashMap<String, ConceptProperties>,
    /// Successive status replies; the last one repeats
    statuses: HashMap<String, Mutex<VecDeque<StatusReport>>>,
    market: HashMap<String, u32>,
    approximate: HashMap<String, Vec<ApproximateMatch>>,
    failing_terms: HashSet<String>,
    failing_ids: HashSet<String>,
    failing_market: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

impl InMemoryTerminology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an active concept.
    pub fn with_concept(mut self, id: &str, name: &str, tty: &str, synonym: &str) -> Self {
        self.properties.insert(
            id.to_string(),
            ConceptProperties {
                id: id.to_string(),
                name: name.to_string(),
                term_type: TermType::from(tty),
                synonym: synonym.to_string(),
            },
        );
        self.statuses.insert(
            id.to_string(),
            Mutex::new(VecDeque::from([StatusReport {
                status: ConceptStatus::Active,
                successor: None,
            }])),
        );
        self
    }

    /// Mark an identifier as remapped to a successor.
    pub fn with_remap(mut self, id: &str, successor: &str) -> Self {
        self.statuses.insert(
            id.to_string(),
            Mutex::new(VecDeque::from([StatusReport {
                status: ConceptStatus::Remapped,
                successor: Some(successor.to_string()),
            }])),
        );
        self
    }

    /// Replies for successive status checks of one identifier.
    pub fn with_status_sequence(mut self, id: &str, sequence: &[ConceptStatus]) -> Self {
        let replies = sequence
            .iter()
            .map(|&status| StatusReport {
                status,
                successor: None,
            })
            .collect();
        self.statuses.insert(id.to_string(), Mutex::new(replies));
        self
    }

    pub fn with_market_presence(mut self, id: &str, count: u32) -> Self {
        self.market.insert(id.to_string(), count);
        self
    }

    /// Approximate-lookup hits for a term (matched case-insensitively).
    pub fn with_approximate(mut self, term: &str, hits: Vec<ApproximateMatch>) -> Self {
        self.approximate.insert(term.to_lowercase(), hits);
        self
    }

    /// Every lookup for this term fails.
    pub fn with_failing_term(mut self, term: &str) -> Self {
        self.failing_terms.insert(term.to_lowercase());
        self
    }

    /// Every per-identifier lookup for this id fails.
    pub fn with_failing_id(mut self, id: &str) -> Self {
        self.failing_ids.insert(id.to_string());
        self
    }

    /// Market-presence lookups for this id fail.
    pub fn with_failing_market(mut self, id: &str) -> Self {
        self.failing_market.insert(id.to_string());
        self
    }

    /// Calls received so far, as `"<operation>:<argument>"`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Number of calls of one operation.
    pub fn call_count(&self, operation: &str) -> usize {
        let prefix = format!("{}:", operation);
        self.calls().iter().filter(|c| c.starts_with(&prefix)).count()
    }

    fn record(&self, operation: &str, arg: &str) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(format!("{}:{}", operation, arg));
        }
    }

    fn check_term(&self, term: &str) -> TerminologyResult<()> {
        if self.failing_terms.contains(&term.to_lowercase()) {
            return Err(TerminologyError::Http(format!("connection reset for '{}'", term)));
        }
        Ok(())
    }

    fn check_id(&self, id: &str) -> TerminologyResult<()> {
        if self.failing_ids.contains(id) {
            return Err(TerminologyError::Http(format!("connection reset for {}", id)));
        }
        Ok(())
    }
}

impl TerminologyService for InMemoryTerminology {
    fn find_exact(&self, name: &str) -> TerminologyResult<Vec<String>> {
        self.record("exact", name);
        self.check_term(name)?;
        let mut ids: Vec<&String> = self
            .properties
            .values()
            .filter(|p| p.name.eq_ignore_ascii_case(name.trim()))
            .map(|p| &p.id)
            .collect();
        ids.sort();
        Ok(ids.into_iter().cloned().collect())
    }

    fn find_approximate(
        &self,
        term: &str,
        max_entries: usize,
    ) -> TerminologyResult<Vec<ApproximateMatch>> {
        self.record("approximate", term);
        self.check_term(term)?;
        Ok(self
            .approximate
            .get(&term.to_lowercase())
            .map(|hits| hits.iter().take(max_entries).cloned().collect())
            .unwrap_or_default())
    }

    fn properties(&self, id: &str) -> TerminologyResult<ConceptProperties> {
        self.record("properties", id);
        self.check_id(id)?;
        self.properties
            .get(id)
            .cloned()
            .ok_or_else(|| TerminologyError::NotFound(id.to_string()))
    }

    fn status(&self, id: &str) -> TerminologyResult<StatusReport> {
        self.record("status", id);
        self.check_id(id)?;
        let Some(replies) = self.statuses.get(id) else {
            return Ok(StatusReport {
                status: ConceptStatus::NotFound,
                successor: None,
            });
        };
        let mut replies = replies
            .lock()
            .map_err(|_| TerminologyError::Http("status fixture poisoned".into()))?;
        let reply = if replies.len() > 1 {
            replies.pop_front()
        } else {
            replies.front().cloned()
        };
        reply.ok_or_else(|| TerminologyError::NotFound(id.to_string()))
    }

    fn market_presence(&self, id: &str) -> TerminologyResult<u32> {
        self.record("market", id);
        self.check_id(id)?;
        if self.failing_market.contains(id) {
            return Err(TerminologyError::Service {
                status: 503,
                body: "ndc service unavailable".into(),
            });
        }
        Ok(self.market.get(id).copied().unwrap_or(0))
    }
}

/// Shorthand for an approximate hit in fixtures.
pub fn approx_hit(id: &str, name: &str, score: f64, source: &str) -> ApproximateMatch {
    ApproximateMatch {
        id: id.to_string(),
        alt_id: None,
        name: Some(name.to_string()),
        score: Some(score),
        source: Some(source.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_lookup_is_case_insensitive() {
        let service = InMemoryTerminology::new().with_concept(
            "861007",
            "metformin hydrochloride 500 MG Oral Tablet",
            "SCD",
            "",
        );
        assert_eq!(
            service
                .find_exact("METFORMIN HYDROCHLORIDE 500 MG ORAL TABLET")
                .unwrap(),
            vec!["861007"]
        );
        assert!(service.find_exact("aspirin").unwrap().is_empty());
    }

    #[test]
    fn test_status_sequence_repeats_last() {
        let service = InMemoryTerminology::new()
            .with_concept("1", "x", "SCD", "")
            .with_status_sequence("1", &[ConceptStatus::Active, ConceptStatus::NotFound]);
        assert_eq!(service.status("1").unwrap().status, ConceptStatus::Active);
        assert_eq!(service.status("1").unwrap().status, ConceptStatus::NotFound);
        assert_eq!(service.status("1").unwrap().status, ConceptStatus::NotFound);
    }

    #[test]
    fn test_unknown_id_status_is_not_found() {
        let service = InMemoryTerminology::new();
        assert_eq!(service.status("404").unwrap().status, ConceptStatus::NotFound);
    }

    #[test]
    fn test_failures_and_call_log() {
        let service = InMemoryTerminology::new()
            .with_failing_term("bad")
            .with_failing_market("7");
        assert!(service.find_exact("bad").is_err());
        assert!(service.find_approximate("BAD", 5).is_err());
        assert!(service.market_presence("7").is_err());
        assert_eq!(service.call_count("approximate"), 1);
        assert_eq!(service.calls()[0], "exact:bad");
    }

    #[test]
    fn test_approximate_respects_max_entries() {
        let service = InMemoryTerminology::new().with_approximate(
            "metformin",
            vec![
                approx_hit("1", "a", 9.0, "RXNORM"),
                approx_hit("2", "b", 8.0, "RXNORM"),
            ],
        );
        assert_eq!(service.find_approximate("metformin", 1).unwrap().len(), 1);
    }
}
