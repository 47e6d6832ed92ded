//! Candidate collection across search terms.

use std::collections::{HashMap, HashSet};

use super::{Hydrator, StageOutput};
use crate::models::{CandidateSet, GroupAnchor};
use crate::terminology::{ApproximateMatch, TerminologyService};

/// Candidates gathered for one resolution, plus the ingredient anchor.
#[derive(Debug, Clone, Default)]
pub struct Collected {
    pub candidates: CandidateSet,
    pub group: GroupAnchor,
}

/// Runs exact and approximate lookups for every term, most specific first.
///
/// Lookups are issued one at a time so the attempts log is deterministic.
/// A failed lookup counts as "no results" for that term.
///
/// The first occurrence of an id decides its place and properties. An exact
/// hit carries no approximate score or source, so the first approximate hit
/// for the same id later fills those in; populated fields are never replaced.
pub struct Collector<'a, S: TerminologyService + ?Sized> {
    service: &'a S,
    max_entries: usize,
}

impl<'a, S: TerminologyService + ?Sized> Collector<'a, S> {
    pub fn new(service: &'a S, max_entries: usize) -> Self {
        Self {
            service,
            max_entries,
        }
    }

    pub fn collect(&self, terms: &[String]) -> StageOutput<Collected> {
        let hydrator = Hydrator::new(self.service);
        let mut out = StageOutput::new(Collected::default());
        let mut visited: HashSet<String> = HashSet::new();
        // looked-up id → key in the candidate set
        let mut keyed: HashMap<String, String> = HashMap::new();

        for term in terms {
            let exact = self.exact_ids(term, &mut out);
            let approximate = self.approximate_hits(term, &mut out);

            let hits = exact
                .into_iter()
                .map(|id| (id, None))
                .chain(approximate.iter().map(|h| (h.id.clone(), Some(h))));

            for (id, meta) in hits {
                if !visited.insert(id.clone()) {
                    if let Some(meta) = meta {
                        let key = keyed.get(&id).map_or(id.as_str(), String::as_str);
                        fill_approximate(&mut out, key, meta);
                    }
                    continue;
                }
                let Some(resolved) = out.absorb(hydrator.resolve_id(&id)) else {
                    continue;
                };
                keyed.insert(id.clone(), resolved.id.clone());
                if resolved.id != id && !visited.insert(resolved.id.clone()) {
                    out.note(format!("[{}] already collected as {}", id, resolved.id));
                    if let Some(meta) = meta {
                        fill_approximate(&mut out, &resolved.id, meta);
                    }
                    continue;
                }
                let Some(candidate) = out.absorb(hydrator.hydrate_resolved(&resolved, meta))
                else {
                    continue;
                };

                let collected = &mut out.value;
                let is_anchor = candidate.term_type.as_ref().is_some_and(|t| t.is_ingredient())
                    && !collected.group.is_set();
                if is_anchor {
                    collected.group = GroupAnchor {
                        ingredient_id: Some(candidate.id.clone()),
                        ingredient_name: Some(candidate.name.clone()),
                    };
                    out.note(format!("[{}] recorded as ingredient anchor", candidate.id));
                } else {
                    collected.candidates.insert(candidate);
                }
            }
        }

        tracing::debug!(
            candidates = out.value.candidates.len(),
            anchor = out.value.group.is_set(),
            "collection finished"
        );
        out
    }

    fn exact_ids<T>(&self, term: &str, out: &mut StageOutput<T>) -> Vec<String> {
        match self.service.find_exact(term) {
            Ok(ids) => {
                out.note(format!("exact '{}': {} hit(s)", term, ids.len()));
                ids
            }
            Err(e) => {
                tracing::warn!(%term, error = %e, "exact lookup failed");
                out.note(format!("exact '{}' failed: {}", term, e));
                Vec::new()
            }
        }
    }

    fn approximate_hits<T>(&self, term: &str, out: &mut StageOutput<T>) -> Vec<ApproximateMatch> {
        match self.service.find_approximate(term, self.max_entries) {
            Ok(hits) => {
                out.note(format!("approximate '{}': {} hit(s)", term, hits.len()));
                hits
            }
            Err(e) => {
                tracing::warn!(%term, error = %e, "approximate lookup failed");
                out.note(format!("approximate '{}' failed: {}", term, e));
                Vec::new()
            }
        }
    }
}

/// Copy approximate-lookup metadata onto a collected candidate that has none.
fn fill_approximate(out: &mut StageOutput<Collected>, id: &str, meta: &ApproximateMatch) {
    let Some(candidate) = out.value.candidates.get_mut(id) else {
        return;
    };
    if candidate.approx_score.is_some() || candidate.source.is_some() {
        return;
    }
    candidate.approx_score = meta.score;
    candidate.source = meta.source.clone();
    if candidate.alt_id.is_none() {
        candidate.alt_id = meta.alt_id.clone();
    }
    out.note(format!("[{}] approximate score filled from later hit", id));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminology::{approx_hit, InMemoryTerminology};

    fn terms(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_first_occurrence_wins_and_anchor_recorded() {
        let service = InMemoryTerminology::new()
            .with_concept("6809", "metformin", "IN", "")
            .with_concept("861007", "metformin hydrochloride 500 MG Oral Tablet", "SCD", "")
            .with_approximate(
                "metformin 500 MG",
                vec![
                    approx_hit("861007", "metformin 500", 10.0, "RXNORM"),
                    approx_hit("6809", "metformin", 5.0, "RXNORM"),
                ],
            )
            .with_approximate(
                "metformin",
                vec![approx_hit("861007", "metformin", 3.0, "MMSL")],
            );

        let out = Collector::new(&service, 20).collect(&terms(&["metformin 500 MG", "metformin"]));
        let collected = out.value;
        assert_eq!(collected.candidates.len(), 1);
        let c = collected.candidates.get("861007").unwrap();
        assert_eq!(c.approx_score, Some(10.0));
        assert_eq!(c.source.as_deref(), Some("RXNORM"));
        assert_eq!(collected.group.ingredient_id.as_deref(), Some("6809"));
        assert_eq!(collected.group.ingredient_name.as_deref(), Some("metformin"));
    }

    #[test]
    fn test_exact_hit_takes_approximate_metadata() {
        let service = InMemoryTerminology::new()
            .with_concept("861007", "metformin 500 MG Oral Tablet", "SCD", "")
            .with_approximate(
                "metformin 500 MG Oral Tablet",
                vec![approx_hit("861007", "metformin 500", 11.0, "RXNORM")],
            )
            .with_approximate(
                "metformin",
                vec![approx_hit("861007", "metformin", 2.0, "MMSL")],
            );

        let out = Collector::new(&service, 20)
            .collect(&terms(&["metformin 500 MG Oral Tablet", "metformin"]));
        assert!(out.log.iter().any(|l| l == "exact 'metformin 500 MG Oral Tablet': 1 hit(s)"));

        let c = out.value.candidates.get("861007").unwrap();
        assert_eq!(c.approx_score, Some(11.0));
        assert_eq!(c.source.as_deref(), Some("RXNORM"));
        assert!(out
            .log
            .iter()
            .any(|l| l == "[861007] approximate score filled from later hit"));
    }

    #[test]
    fn test_remapped_ids_are_keyed_by_successor() {
        let service = InMemoryTerminology::new()
            .with_remap("100", "200")
            .with_concept("200", "aspirin 81 MG Oral Tablet", "SCD", "")
            .with_approximate(
                "aspirin 81 MG",
                vec![
                    approx_hit("100", "aspirin 81", 9.0, "RXNORM"),
                    approx_hit("200", "aspirin 81", 8.0, "RXNORM"),
                ],
            );

        let out = Collector::new(&service, 20).collect(&terms(&["aspirin 81 MG"]));
        let ids: Vec<_> = out.value.candidates.iter().map(|c| c.id.clone()).collect();
        assert_eq!(ids, vec!["200"]);
        assert_eq!(out.value.candidates.get("200").unwrap().approx_score, Some(9.0));
        assert!(!out.value.candidates.contains("100"));
    }

    #[test]
    fn test_failed_term_is_skipped() {
        let service = InMemoryTerminology::new()
            .with_concept("1", "ibuprofen 200 MG Oral Tablet", "SCD", "")
            .with_failing_term("ibuprofen 200 MG Oral Tablet")
            .with_approximate("ibuprofen", vec![approx_hit("1", "ibuprofen", 4.0, "RXNORM")]);

        let out = Collector::new(&service, 20)
            .collect(&terms(&["ibuprofen 200 MG Oral Tablet", "ibuprofen"]));
        assert_eq!(out.value.candidates.len(), 1);
        assert!(out
            .log
            .iter()
            .any(|l| l.starts_with("exact 'ibuprofen 200 MG Oral Tablet' failed")));
    }

    #[test]
    fn test_second_ingredient_goes_to_candidates() {
        let service = InMemoryTerminology::new()
            .with_concept("1", "amlodipine", "IN", "")
            .with_concept("2", "benazepril", "IN", "")
            .with_approximate(
                "amlodipine",
                vec![
                    approx_hit("1", "amlodipine", 9.0, "RXNORM"),
                    approx_hit("2", "benazepril", 2.0, "RXNORM"),
                ],
            );
        let out = Collector::new(&service, 20).collect(&terms(&["amlodipine"]));
        assert_eq!(out.value.group.ingredient_id.as_deref(), Some("1"));
        assert!(out.value.candidates.contains("2"));
    }

    #[test]
    fn test_each_id_is_looked_up_once() {
        let service = InMemoryTerminology::new()
            .with_concept("1", "x 5 MG Oral Tablet", "SCD", "")
            .with_approximate("a", vec![approx_hit("1", "x", 1.0, "RXNORM")])
            .with_approximate("b", vec![approx_hit("1", "x", 1.0, "RXNORM")]);
        Collector::new(&service, 20).collect(&terms(&["a", "b"]));
        assert_eq!(service.call_count("properties"), 1);
        assert_eq!(service.call_count("status"), 1);
    }
}
