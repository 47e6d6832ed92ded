//! Resolution output models.

use serde::{Deserialize, Serialize};

use super::{Candidate, ConceptStatus, TermType};

/// Placeholder emitted when no attribute discrepancy was found.
pub const NO_DIFFERENCES: &str = "—";

/// Checks performed on the winning candidate before it was accepted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Verification {
    /// A fresh status lookup confirmed the identifier is active
    pub status_checked: bool,
    /// The concept type is in the dispensable set
    pub properties_checked: bool,
    /// At least one market-presence record exists
    pub market_found: bool,
}

/// The verified winner of a resolution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FinalConcept {
    pub id: String,
    #[serde(rename = "type")]
    pub term_type: TermType,
    pub name: String,
    pub status: ConceptStatus,
    pub verification: Verification,
}

/// Ingredient-level concept seen during collection, kept for grouping.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GroupAnchor {
    pub ingredient_id: Option<String>,
    pub ingredient_name: Option<String>,
}

impl GroupAnchor {
    pub fn is_set(&self) -> bool {
        self.ingredient_id.is_some()
    }
}

/// Complete result of resolving one free-text description.
///
/// Always returned, even on partial failure; callers inspect `final_concept`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub request_id: String,
    /// RFC 3339 timestamp
    pub resolved_at: String,
    pub input: String,
    pub normalized: String,
    #[serde(rename = "final")]
    pub final_concept: Option<FinalConcept>,
    pub group_id: GroupAnchor,
    /// Advisory mismatch notes; `["—"]` when there are none
    pub differences: Vec<String>,
    /// Surviving candidates in ranked order
    pub candidates: Vec<Candidate>,
    /// Pick of the attached hybrid matcher among the ranked candidates
    pub hybrid_pick: Option<String>,
    pub attempts_log: Vec<String>,
}

impl Resolution {
    pub fn is_resolved(&self) -> bool {
        self.final_concept.is_some()
    }

    /// Identifier of the verified winner.
    pub fn final_id(&self) -> Option<&str> {
        self.final_concept.as_ref().map(|f| f.id.as_str())
    }

    pub fn has_differences(&self) -> bool {
        !(self.differences.len() == 1 && self.differences[0] == NO_DIFFERENCES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolution(final_concept: Option<FinalConcept>, differences: Vec<String>) -> Resolution {
        Resolution {
            request_id: "req".into(),
            resolved_at: "2026-01-01T00:00:00Z".into(),
            input: "metformin 500 mg tablet".into(),
            normalized: "metformin 500 MG tablet".into(),
            final_concept,
            group_id: GroupAnchor::default(),
            differences,
            candidates: vec![],
            hybrid_pick: None,
            attempts_log: vec![],
        }
    }

    #[test]
    fn test_unresolved() {
        let r = resolution(None, vec!["no verified candidate".into()]);
        assert!(!r.is_resolved());
        assert!(r.final_id().is_none());
        assert!(r.has_differences());
    }

    #[test]
    fn test_resolved_without_differences() {
        let r = resolution(
            Some(FinalConcept {
                id: "861007".into(),
                term_type: TermType::Scd,
                name: "metformin hydrochloride 500 MG Oral Tablet".into(),
                status: ConceptStatus::Active,
                verification: Verification {
                    status_checked: true,
                    properties_checked: true,
                    market_found: true,
                },
            }),
            vec![NO_DIFFERENCES.into()],
        );
        assert!(r.is_resolved());
        assert_eq!(r.final_id(), Some("861007"));
        assert!(!r.has_differences());
    }

    #[test]
    fn test_serialized_field_names() {
        let r = resolution(None, vec![NO_DIFFERENCES.into()]);
        let json = serde_json::to_value(&r).unwrap();
        assert!(json.get("final").unwrap().is_null());
        assert!(json.get("attemptsLog").is_some());
        assert!(json.get("groupId").is_some());
    }
}
