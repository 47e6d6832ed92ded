//! Parsed medication attributes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Dose form recognized by the parser.
///
/// Declaration order is the keyword-matching priority: when several forms are
/// mentioned, the earliest variant here wins regardless of input order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DoseForm {
    Tablet,
    Capsule,
    Suspension,
    Solution,
    Injection,
    Patch,
    Inhalation,
}

impl DoseForm {
    pub const ALL: [DoseForm; 7] = [
        DoseForm::Tablet,
        DoseForm::Capsule,
        DoseForm::Suspension,
        DoseForm::Solution,
        DoseForm::Injection,
        DoseForm::Patch,
        DoseForm::Inhalation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DoseForm::Tablet => "tablet",
            DoseForm::Capsule => "capsule",
            DoseForm::Suspension => "suspension",
            DoseForm::Solution => "solution",
            DoseForm::Injection => "injection",
            DoseForm::Patch => "patch",
            DoseForm::Inhalation => "inhalation",
        }
    }
}

impl fmt::Display for DoseForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Route of administration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Route {
    Oral,
    Topical,
    Injection,
}

impl Route {
    pub const ALL: [Route; 3] = [Route::Oral, Route::Topical, Route::Injection];

    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Oral => "oral",
            Route::Topical => "topical",
            Route::Injection => "injection",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Amount of active ingredient: either a bare strength or a concentration.
///
/// The two are mutually exclusive, which is why they share one field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Amount {
    /// e.g. "500 MG"
    Strength(String),
    /// e.g. "125 MG/5 ML" or "2 MG/ML"
    Concentration(String),
}

impl Amount {
    pub fn as_str(&self) -> &str {
        match self {
            Amount::Strength(s) | Amount::Concentration(s) => s,
        }
    }
}

/// Structured attributes extracted from a free-text medication description.
///
/// Built once per resolution request and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParsedMedication {
    /// First ingredient token (lowercase)
    pub ingredient: String,
    /// Strength or concentration, canonical unit spelling
    pub amount: Option<Amount>,
    pub dose_form: Option<DoseForm>,
    pub route: Option<Route>,
    /// Text of a trailing `[Brand]` suffix
    pub brand: Option<String>,
    /// Input exactly as received
    pub original: String,
}

impl ParsedMedication {
    pub fn strength(&self) -> Option<&str> {
        match &self.amount {
            Some(Amount::Strength(s)) => Some(s),
            _ => None,
        }
    }

    pub fn concentration(&self) -> Option<&str> {
        match &self.amount {
            Some(Amount::Concentration(c)) => Some(c),
            _ => None,
        }
    }

    pub fn is_concentration(&self) -> bool {
        matches!(self.amount, Some(Amount::Concentration(_)))
    }

    /// Strength or concentration, whichever is set.
    pub fn amount_str(&self) -> Option<&str> {
        self.amount.as_ref().map(Amount::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(amount: Option<Amount>) -> ParsedMedication {
        ParsedMedication {
            ingredient: "amoxicillin".into(),
            amount,
            dose_form: Some(DoseForm::Suspension),
            route: Some(Route::Oral),
            brand: None,
            original: "amoxicillin".into(),
        }
    }

    #[test]
    fn test_strength_and_concentration_are_exclusive() {
        let s = parsed(Some(Amount::Strength("500 MG".into())));
        assert_eq!(s.strength(), Some("500 MG"));
        assert_eq!(s.concentration(), None);
        assert!(!s.is_concentration());

        let c = parsed(Some(Amount::Concentration("125 MG/5 ML".into())));
        assert_eq!(c.strength(), None);
        assert_eq!(c.concentration(), Some("125 MG/5 ML"));
        assert!(c.is_concentration());
        assert_eq!(c.amount_str(), Some("125 MG/5 ML"));
    }

    #[test]
    fn test_form_priority_order() {
        assert_eq!(DoseForm::ALL[0], DoseForm::Tablet);
        assert!(DoseForm::ALL.iter().position(|f| *f == DoseForm::Solution)
            < DoseForm::ALL.iter().position(|f| *f == DoseForm::Injection));
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&DoseForm::Inhalation).unwrap();
        assert_eq!(json, "\"inhalation\"");
        let route: Route = serde_json::from_str("\"topical\"").unwrap();
        assert_eq!(route, Route::Topical);
    }
}
