//! RxNav REST client.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use super::{
    ApproximateMatch, ConceptProperties, StatusReport, TerminologyError, TerminologyResult,
    TerminologyService,
};
use crate::models::{ConceptStatus, TermType};

/// Blocking HTTP client for the RxNav terminology API.
pub struct RxNavClient {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl RxNavClient {
    /// Create a client rooted at e.g. `https://rxnav.nlm.nih.gov/REST`.
    pub fn new(base_url: &str, timeout_secs: u64) -> TerminologyResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| TerminologyError::Http(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> TerminologyResult<T> {
        let url = format!("{}/{}", self.base_url, path);
        tracing::debug!(%url, ?query, "rxnav request");

        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .map_err(|e| TerminologyError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(TerminologyError::Service {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .map_err(|e| TerminologyError::Parse(e.to_string()))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdGroupResponse {
    #[serde(default)]
    id_group: IdGroup,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct IdGroup {
    #[serde(default)]
    rxnorm_id: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApproximateResponse {
    #[serde(default)]
    approximate_group: ApproximateGroup,
}

#[derive(Deserialize, Default)]
struct ApproximateGroup {
    #[serde(default)]
    candidate: Vec<ApproximateCandidate>,
}

#[derive(Deserialize)]
struct ApproximateCandidate {
    #[serde(default)]
    rxcui: String,
    rxaui: Option<String>,
    name: Option<String>,
    score: Option<Value>,
    source: Option<String>,
}

#[derive(Deserialize)]
struct PropertiesResponse {
    properties: Option<RawProperties>,
}

#[derive(Deserialize)]
struct RawProperties {
    rxcui: String,
    name: String,
    #[serde(default)]
    synonym: String,
    tty: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryResponse {
    rxcui_status_history: Option<StatusHistory>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusHistory {
    meta_data: StatusMetaData,
    #[serde(default)]
    derived_concepts: DerivedConcepts,
}

#[derive(Deserialize)]
struct StatusMetaData {
    #[serde(default)]
    status: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct DerivedConcepts {
    #[serde(default)]
    remapped_concept: Vec<RemappedConcept>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemappedConcept {
    remapped_rx_cui: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NdcResponse {
    #[serde(default)]
    ndc_group: NdcGroup,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct NdcGroup {
    ndc_list: Option<NdcList>,
}

#[derive(Deserialize)]
struct NdcList {
    #[serde(default)]
    ndc: Vec<String>,
}

/// RxNav reports scores as strings in some versions and numbers in others.
fn score_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// `rxcui.json` search mode: 0 is exact name only. Normalized spellings
/// (mode 1 or 2) are left to the approximate lookup.
const EXACT_SEARCH_MODE: &str = "0";

fn exact_query(name: &str) -> [(&str, &str); 2] {
    [("name", name), ("search", EXACT_SEARCH_MODE)]
}

impl TerminologyService for RxNavClient {
    fn find_exact(&self, name: &str) -> TerminologyResult<Vec<String>> {
        let resp: IdGroupResponse = self.get_json("rxcui.json", &exact_query(name))?;
        Ok(resp.id_group.rxnorm_id)
    }

    fn find_approximate(
        &self,
        term: &str,
        max_entries: usize,
    ) -> TerminologyResult<Vec<ApproximateMatch>> {
        let max = max_entries.to_string();
        let resp: ApproximateResponse = self.get_json(
            "approximateTerm.json",
            &[("term", term), ("maxEntries", &max)],
        )?;
        Ok(resp
            .approximate_group
            .candidate
            .into_iter()
            .filter(|c| !c.rxcui.is_empty())
            .map(|c| ApproximateMatch {
                score: c.score.as_ref().and_then(score_value),
                id: c.rxcui,
                alt_id: c.rxaui,
                name: c.name,
                source: c.source,
            })
            .collect())
    }

    fn properties(&self, id: &str) -> TerminologyResult<ConceptProperties> {
        let resp: PropertiesResponse =
            self.get_json(&format!("rxcui/{}/properties.json", id), &[])?;
        let raw = resp
            .properties
            .ok_or_else(|| TerminologyError::NotFound(id.to_string()))?;
        Ok(ConceptProperties {
            id: raw.rxcui,
            name: raw.name,
            term_type: TermType::from(raw.tty.as_str()),
            synonym: raw.synonym,
        })
    }

    fn status(&self, id: &str) -> TerminologyResult<StatusReport> {
        let resp: HistoryResponse =
            self.get_json(&format!("rxcui/{}/historystatus.json", id), &[])?;
        let history = resp
            .rxcui_status_history
            .ok_or_else(|| TerminologyError::NotFound(id.to_string()))?;
        let status = ConceptStatus::from_service(&history.meta_data.status);
        let successor = history
            .derived_concepts
            .remapped_concept
            .into_iter()
            .map(|c| c.remapped_rx_cui)
            .find(|s| !s.is_empty());
        Ok(StatusReport { status, successor })
    }

    fn market_presence(&self, id: &str) -> TerminologyResult<u32> {
        let resp: NdcResponse = self.get_json(&format!("rxcui/{}/ndcs.json", id), &[])?;
        let count = resp.ndc_group.ndc_list.map(|l| l.ndc.len()).unwrap_or(0);
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_value_accepts_strings_and_numbers() {
        assert_eq!(score_value(&Value::String("12.5".into())), Some(12.5));
        assert_eq!(score_value(&serde_json::json!(8)), Some(8.0));
        assert_eq!(score_value(&Value::Null), None);
        assert_eq!(score_value(&Value::String("n/a".into())), None);
    }

    #[test]
    fn test_parse_approximate_payload() {
        let json = r#"{"approximateGroup":{"inputTerm":"metformin 500","candidate":[
            {"rxcui":"861007","rxaui":"2579925","score":"10.53","rank":"1","name":"metformin hydrochloride 500 MG Oral Tablet","source":"RXNORM"},
            {"rxcui":"","rxaui":"1","score":"1","rank":"2","source":"MMSL"}]}}"#;
        let resp: ApproximateResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.approximate_group.candidate.len(), 2);
        assert_eq!(resp.approximate_group.candidate[0].rxcui, "861007");
    }

    #[test]
    fn test_parse_empty_id_group() {
        let resp: IdGroupResponse = serde_json::from_str(r#"{"idGroup":{"name":"xyz"}}"#).unwrap();
        assert!(resp.id_group.rxnorm_id.is_empty());
    }

    #[test]
    fn test_parse_history_with_remap() {
        let json = r#"{"rxcuiStatusHistory":{"metaData":{"status":"Remapped"},
            "derivedConcepts":{"remappedConcept":[{"remappedRxCui":"861007","remappedName":"x","remappedTTY":"SCD"}]}}}"#;
        let resp: HistoryResponse = serde_json::from_str(json).unwrap();
        let history = resp.rxcui_status_history.unwrap();
        assert_eq!(history.meta_data.status, "Remapped");
        assert_eq!(history.derived_concepts.remapped_concept[0].remapped_rx_cui, "861007");
    }

    #[test]
    fn test_parse_ndc_payload() {
        let resp: NdcResponse =
            serde_json::from_str(r#"{"ndcGroup":{"rxcui":null,"ndcList":{"ndc":["a","b"]}}}"#)
                .unwrap();
        assert_eq!(resp.ndc_group.ndc_list.unwrap().ndc.len(), 2);

        let empty: NdcResponse = serde_json::from_str(r#"{"ndcGroup":{"rxcui":null}}"#).unwrap();
        assert!(empty.ndc_group.ndc_list.is_none());
    }

    #[test]
    fn test_exact_lookup_uses_exact_only_mode() {
        let query = exact_query("metformin 500 MG Oral Tablet");
        assert_eq!(query[0], ("name", "metformin 500 MG Oral Tablet"));
        assert_eq!(query[1], ("search", "0"));
    }

    #[test]
    fn test_client_trims_base_url() {
        let client = RxNavClient::new("https://rxnav.nlm.nih.gov/REST/", 5).unwrap();
        assert_eq!(client.base_url, "https://rxnav.nlm.nih.gov/REST");
    }
}
