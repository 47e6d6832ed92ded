//! Tunable tables and weights, plus service endpoints.
//!
//! Everything the pipeline treats as domain knowledge (keyword lists, form
//! labels, scoring bonuses, matcher substitutions) lives here as data so it can
//! be loaded from JSON and tested apart from control flow.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{DoseForm, Route};

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing credential: {0}")]
    MissingCredential(String),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ResolverConfig {
    /// Maximum entries requested from each approximate lookup
    pub approx_max_entries: usize,
    pub scoring: ScoringWeights,
    pub vocabulary: VocabularyTables,
    pub matcher: MatcherConfig,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            approx_max_entries: 20,
            scoring: ScoringWeights::default(),
            vocabulary: VocabularyTables::default(),
            matcher: MatcherConfig::default(),
        }
    }
}

impl ResolverConfig {
    /// Parse a (possibly partial) JSON document; missing keys keep defaults.
    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.approx_max_entries == 0 {
            return Err(ConfigError::InvalidValue {
                key: "approx_max_entries".into(),
                value: "0".into(),
            });
        }
        let m = &self.matcher;
        if m.semantic_weight < 0.0 || m.lexical_weight < 0.0 {
            return Err(ConfigError::InvalidValue {
                key: "matcher weights".into(),
                value: format!("{}/{}", m.semantic_weight, m.lexical_weight),
            });
        }
        Ok(())
    }
}

/// Additive bonuses for the composite scorer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScoringWeights {
    pub primary_source: String,
    pub primary_source_bonus: f64,
    pub secondary_sources: Vec<String>,
    pub secondary_source_penalty: f64,
    pub sbd_bonus: f64,
    pub scd_bonus: f64,
    pub gpck_bonus: f64,
    pub bpck_bonus: f64,
    pub brand_bonus: f64,
    pub route_bonus: f64,
    pub market_presence_bonus: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            primary_source: "RXNORM".into(),
            primary_source_bonus: 10.0,
            secondary_sources: vec![
                "MMSL".into(),
                "GS".into(),
                "MTHSPL".into(),
                "VANDF".into(),
                "NDDF".into(),
                "DRUGBANK".into(),
                "USP".into(),
            ],
            secondary_source_penalty: -10.0,
            sbd_bonus: 8.0,
            scd_bonus: 7.0,
            gpck_bonus: 5.0,
            bpck_bonus: 4.0,
            brand_bonus: 8.0,
            route_bonus: 6.0,
            market_presence_bonus: 6.0,
        }
    }
}

/// Keywords, labels and name synonyms for one dose form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FormEntry {
    pub form: DoseForm,
    /// Whole-word keywords recognized in input text
    pub keywords: Vec<String>,
    /// Label in the target vocabulary's naming convention, e.g. "Oral Tablet"
    pub label: String,
    /// Short synonym, e.g. "Tab"
    pub abbreviation: Option<String>,
    /// Substrings that show a candidate name carries this form
    pub name_synonyms: Vec<String>,
    pub implies_oral: bool,
}

/// Keywords, labels and name synonyms for one route.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteEntry {
    pub route: Route,
    pub keywords: Vec<String>,
    pub label: String,
    pub name_synonyms: Vec<String>,
}

/// Canonical spelling for a family of unit spellings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnitEntry {
    pub canonical: String,
    pub aliases: Vec<String>,
}

/// Vocabulary tables used by the parser, term generator and filter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VocabularyTables {
    /// Ordered by matching priority; the first entry mentioned in the input wins
    pub forms: Vec<FormEntry>,
    pub routes: Vec<RouteEntry>,
    pub units: Vec<UnitEntry>,
    /// Canonical unit that denominates concentrations
    pub volume_unit: String,
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl Default for VocabularyTables {
    fn default() -> Self {
        Self {
            forms: vec![
                FormEntry {
                    form: DoseForm::Tablet,
                    keywords: words(&["tablet", "tablets", "tab", "tabs"]),
                    label: "Oral Tablet".into(),
                    abbreviation: Some("Tab".into()),
                    name_synonyms: words(&["tablet", "tab"]),
                    implies_oral: true,
                },
                FormEntry {
                    form: DoseForm::Capsule,
                    keywords: words(&["capsule", "capsules", "cap", "caps"]),
                    label: "Oral Capsule".into(),
                    abbreviation: Some("Cap".into()),
                    name_synonyms: words(&["capsule", "cap"]),
                    implies_oral: true,
                },
                FormEntry {
                    form: DoseForm::Suspension,
                    keywords: words(&["suspension", "susp"]),
                    label: "Oral Suspension".into(),
                    abbreviation: Some("Susp".into()),
                    name_synonyms: words(&["suspension", "susp"]),
                    implies_oral: true,
                },
                FormEntry {
                    form: DoseForm::Solution,
                    keywords: words(&["solution", "soln"]),
                    label: "Solution".into(),
                    abbreviation: None,
                    name_synonyms: words(&["solution", "soln"]),
                    implies_oral: false,
                },
                FormEntry {
                    form: DoseForm::Injection,
                    keywords: words(&["injection", "injectable", "inj"]),
                    label: "Injection".into(),
                    abbreviation: None,
                    name_synonyms: words(&["inject"]),
                    implies_oral: false,
                },
                FormEntry {
                    form: DoseForm::Patch,
                    keywords: words(&["patch", "patches", "transdermal"]),
                    label: "Transdermal System".into(),
                    abbreviation: None,
                    name_synonyms: words(&["patch", "transdermal"]),
                    implies_oral: false,
                },
                FormEntry {
                    form: DoseForm::Inhalation,
                    keywords: words(&["inhalation", "inhaler", "inhal", "aerosol", "inh"]),
                    label: "Inhalation Aerosol".into(),
                    abbreviation: None,
                    name_synonyms: words(&["inhal", "aerosol"]),
                    implies_oral: false,
                },
            ],
            routes: vec![
                RouteEntry {
                    route: Route::Oral,
                    keywords: words(&["oral", "orally", "by mouth", "po"]),
                    label: "Oral".into(),
                    name_synonyms: words(&["oral"]),
                },
                RouteEntry {
                    route: Route::Topical,
                    keywords: words(&["topical", "topically", "cream", "ointment"]),
                    label: "Topical".into(),
                    name_synonyms: words(&["topical"]),
                },
                RouteEntry {
                    route: Route::Injection,
                    keywords: words(&[
                        "injection",
                        "injectable",
                        "intravenous",
                        "intramuscular",
                        "subcutaneous",
                        "iv",
                        "im",
                    ]),
                    label: "Injectable".into(),
                    name_synonyms: words(&["inject"]),
                },
            ],
            units: vec![
                UnitEntry {
                    canonical: "MG".into(),
                    aliases: words(&["mg", "mgs", "milligram", "milligrams"]),
                },
                UnitEntry {
                    canonical: "MCG".into(),
                    aliases: words(&["mcg", "mcgs", "microgram", "micrograms", "µg", "ug"]),
                },
                UnitEntry {
                    canonical: "G".into(),
                    aliases: words(&["g", "gm", "gram", "grams"]),
                },
                UnitEntry {
                    canonical: "MEQ".into(),
                    aliases: words(&["meq"]),
                },
                UnitEntry {
                    canonical: "UNT".into(),
                    aliases: words(&["unt", "unit", "units", "iu"]),
                },
                UnitEntry {
                    canonical: "ML".into(),
                    aliases: words(&["ml", "mls", "milliliter", "milliliters", "millilitre", "cc"]),
                },
            ],
            volume_unit: "ML".into(),
        }
    }
}

impl VocabularyTables {
    pub fn form(&self, form: DoseForm) -> Option<&FormEntry> {
        self.forms.iter().find(|e| e.form == form)
    }

    pub fn route(&self, route: Route) -> Option<&RouteEntry> {
        self.routes.iter().find(|e| e.route == route)
    }

    /// Canonical units that measure the amount of ingredient (everything but volume).
    pub fn mass_units(&self) -> Vec<&str> {
        self.units
            .iter()
            .map(|u| u.canonical.as_str())
            .filter(|u| *u != self.volume_unit)
            .collect()
    }
}

/// Weights, substitutions and bonuses for the hybrid matcher.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MatcherConfig {
    pub semantic_weight: f64,
    pub lexical_weight: f64,
    /// Whole-word replacements applied after lowercasing, in order
    pub substitutions: Vec<(String, String)>,
    pub brand_tokens: Vec<String>,
    pub clinical_tokens: Vec<String>,
    pub brand_bonus: f64,
    pub clinical_bonus: f64,
    pub numeric_bonus: f64,
    /// Candidates forwarded to the judge
    pub rerank_top_n: usize,
    /// Judge similarity required before its pick overrides the hybrid pick
    pub override_threshold: f64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            semantic_weight: 0.85,
            lexical_weight: 0.15,
            substitutions: vec![
                ("actuations".into(), "inhal".into()),
                ("actuation".into(), "inhal".into()),
                ("actuat".into(), "inhal".into()),
                ("inhalation".into(), "inhal".into()),
                ("aerosol".into(), "inhaler".into()),
            ],
            brand_tokens: words(&[
                "hfa", "ventolin", "proair", "proventil", "diskus", "respimat", "ellipta",
                "flexpen", "kwikpen", "solostar", "epipen",
            ]),
            clinical_tokens: words(&[
                "inhal", "inhaler", "tablet", "capsule", "solution", "suspension", "injection",
                "injectable", "patch", "oral", "topical", "chewable",
            ]),
            brand_bonus: 0.05,
            clinical_bonus: 0.02,
            numeric_bonus: 0.03,
            rerank_top_n: 5,
            override_threshold: 0.9,
        }
    }
}

/// Endpoints and credentials for the HTTP collaborators.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub rxnav_base_url: String,
    pub openai_base_url: String,
    pub openai_api_key: Option<String>,
    pub embedding_model: String,
    pub judge_model: String,
    pub timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            rxnav_base_url: "https://rxnav.nlm.nih.gov/REST".into(),
            openai_base_url: "https://api.openai.com/v1".into(),
            openai_api_key: None,
            embedding_model: "text-embedding-3-small".into(),
            judge_model: "gpt-4o-mini".into(),
            timeout_secs: 30,
        }
    }
}

impl ServiceConfig {
    /// Read overrides from the environment; unset variables keep defaults.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(v) = lookup("RXNAV_BASE_URL") {
            config.rxnav_base_url = v;
        }
        if let Some(v) = lookup("OPENAI_BASE_URL") {
            config.openai_base_url = v;
        }
        config.openai_api_key = lookup("OPENAI_API_KEY").filter(|k| !k.trim().is_empty());
        if let Some(v) = lookup("RXRESOLVE_EMBEDDING_MODEL") {
            config.embedding_model = v;
        }
        if let Some(v) = lookup("RXRESOLVE_JUDGE_MODEL") {
            config.judge_model = v;
        }
        if let Some(v) = lookup("RXRESOLVE_HTTP_TIMEOUT_SECS") {
            config.timeout_secs = v.parse().map_err(|_| ConfigError::InvalidValue {
                key: "RXRESOLVE_HTTP_TIMEOUT_SECS".into(),
                value: v.clone(),
            })?;
        }
        Ok(config)
    }

    /// API key for the embedding and judge services.
    pub fn require_api_key(&self) -> ConfigResult<&str> {
        self.openai_api_key
            .as_deref()
            .ok_or_else(|| ConfigError::MissingCredential("OPENAI_API_KEY".into()))
    }
}
