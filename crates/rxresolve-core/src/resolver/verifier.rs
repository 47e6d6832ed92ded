//! Final verification of the ranked list.

use super::StageOutput;
use crate::models::{Candidate, ConceptStatus, FinalConcept, Verification};
use crate::terminology::TerminologyService;

/// Re-checks candidates, best first, until one is confirmed.
pub struct Verifier<'a, S: TerminologyService + ?Sized> {
    service: &'a S,
}

impl<'a, S: TerminologyService + ?Sized> Verifier<'a, S> {
    pub fn new(service: &'a S) -> Self {
        Self { service }
    }

    /// Accept the first candidate whose fresh status is active and whose type
    /// is dispensable. `None` when every candidate fails.
    pub fn verify(&self, ranked: &[Candidate]) -> StageOutput<Option<FinalConcept>> {
        let mut out = StageOutput::new(None);

        for candidate in ranked {
            let Some(term_type) = candidate.term_type.clone().filter(|t| t.is_dispensable())
            else {
                out.note(format!("[{}] verification: type not dispensable", candidate.id));
                continue;
            };

            let status = match self.service.status(&candidate.id) {
                Ok(report) => report.status,
                Err(e) => {
                    tracing::warn!(id = %candidate.id, error = %e, "verification status check failed");
                    out.note(format!("[{}] verification: status check failed: {}", candidate.id, e));
                    continue;
                }
            };
            if status != ConceptStatus::Active {
                out.note(format!("[{}] verification: status now {:?}", candidate.id, status));
                continue;
            }

            out.note(format!("[{}] verified", candidate.id));
            out.value = Some(FinalConcept {
                id: candidate.id.clone(),
                term_type,
                name: candidate.name.clone(),
                status,
                verification: Verification {
                    status_checked: true,
                    properties_checked: true,
                    market_found: candidate.market_presence_count.unwrap_or(0) > 0,
                },
            });
            return out;
        }

        out.note("verification: no candidate passed".to_string());
        out
    }
}
