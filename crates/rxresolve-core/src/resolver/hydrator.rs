//! Candidate hydration: remap resolution and property fetch.

use super::StageOutput;
use crate::models::{Candidate, ConceptStatus};
use crate::terminology::{ApproximateMatch, TerminologyService};

/// Successor hops followed before a remap chain is abandoned.
pub const MAX_REMAP_HOPS: usize = 3;

/// An identifier after remap resolution, with its final status.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedId {
    pub id: String,
    pub status: ConceptStatus,
}

/// Turns raw identifiers into fully annotated candidates.
pub struct Hydrator<'a, S: TerminologyService + ?Sized> {
    service: &'a S,
}

impl<'a, S: TerminologyService + ?Sized> Hydrator<'a, S> {
    pub fn new(service: &'a S) -> Self {
        Self { service }
    }

    /// Follow remaps from `id` to the identifier that should be used.
    ///
    /// Returns `None` when the chain dead-ends, loops, exceeds
    /// [`MAX_REMAP_HOPS`], or a status lookup fails.
    pub fn resolve_id(&self, id: &str) -> StageOutput<Option<ResolvedId>> {
        let mut out = StageOutput::new(None);
        let mut current = id.to_string();
        let mut chain = vec![current.clone()];

        for _ in 0..=MAX_REMAP_HOPS {
            let report = match self.service.status(&current) {
                Ok(report) => report,
                Err(e) => {
                    tracing::warn!(id = %current, error = %e, "status lookup failed");
                    out.note(format!("[{}] status lookup failed: {}", current, e));
                    return out;
                }
            };

            match (report.status, report.successor) {
                (ConceptStatus::Remapped, Some(next)) => {
                    if chain.contains(&next) {
                        out.note(format!("[{}] remap cycle via {}; dropped", id, next));
                        return out;
                    }
                    out.note(format!("[{}] remapped to {}", current, next));
                    current = next;
                    chain.push(current.clone());
                }
                (ConceptStatus::Remapped, None) => {
                    out.note(format!("[{}] remapped without successor; dropped", current));
                    return out;
                }
                (status, _) => {
                    out.value = Some(ResolvedId {
                        id: current,
                        status,
                    });
                    return out;
                }
            }
        }

        out.note(format!(
            "[{}] remap chain longer than {} hops; dropped",
            id, MAX_REMAP_HOPS
        ));
        out
    }

    /// Resolve remaps for `id`, then hydrate the resulting identifier.
    pub fn hydrate(
        &self,
        id: &str,
        meta: Option<&ApproximateMatch>,
    ) -> StageOutput<Option<Candidate>> {
        let mut out = StageOutput::new(None);
        if let Some(resolved) = out.absorb(self.resolve_id(id)) {
            let candidate = out.absorb(self.hydrate_resolved(&resolved, meta));
            out.value = candidate;
        }
        out
    }

    /// Fetch properties and market presence for an already-resolved identifier.
    ///
    /// The candidate is dropped unless the identifier is active and its
    /// properties can be read. A failed market-presence lookup counts as zero.
    pub fn hydrate_resolved(
        &self,
        resolved: &ResolvedId,
        meta: Option<&ApproximateMatch>,
    ) -> StageOutput<Option<Candidate>> {
        let mut out = StageOutput::new(None);
        let id = resolved.id.as_str();

        if resolved.status != ConceptStatus::Active {
            out.note(format!("[{}] status {:?}; dropped", id, resolved.status));
            return out;
        }

        let props = match self.service.properties(id) {
            Ok(props) => props,
            Err(e) => {
                tracing::warn!(%id, error = %e, "properties lookup failed");
                out.note(format!("[{}] properties lookup failed: {}", id, e));
                return out;
            }
        };

        let market = match self.service.market_presence(id) {
            Ok(count) => count,
            Err(e) => {
                tracing::debug!(%id, error = %e, "market presence lookup failed");
                out.note(format!("[{}] market presence unavailable: {}", id, e));
                0
            }
        };

        out.note(format!(
            "[{}] hydrated {} '{}' (market records: {})",
            id, props.term_type, props.name, market
        ));

        let mut candidate = Candidate::new(id, props.name.clone());
        candidate.synonyms = props.synonyms();
        candidate.term_type = Some(props.term_type);
        candidate.status = Some(resolved.status);
        candidate.market_presence_count = Some(market);
        if let Some(meta) = meta {
            candidate.alt_id = meta.alt_id.clone();
            candidate.source = meta.source.clone();
            candidate.approx_score = meta.score;
        }
        out.value = Some(candidate);
        out
    }
}
