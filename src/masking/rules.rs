//! Sensitivity rules
//!
//! Column names are classified by an ordered list of patterns. The first rule
//! that matches decides the type, so the order of the list is part of its
//! meaning: `ssn_name` is an ssn column because ssn is checked before name.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sensitivity classification tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensitivityType {
    Email,
    Phone,
    Ssn,
    CreditCard,
    Name,
    Address,
}

impl SensitivityType {
    pub const ALL: [SensitivityType; 6] = [
        SensitivityType::Email,
        SensitivityType::Phone,
        SensitivityType::Ssn,
        SensitivityType::CreditCard,
        SensitivityType::Name,
        SensitivityType::Address,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SensitivityType::Email => "email",
            SensitivityType::Phone => "phone",
            SensitivityType::Ssn => "ssn",
            SensitivityType::CreditCard => "credit_card",
            SensitivityType::Name => "name",
            SensitivityType::Address => "address",
        }
    }
}

impl fmt::Display for SensitivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One name-matching rule
#[derive(Debug, Clone)]
pub struct SensitivityRule {
    pub sensitivity: SensitivityType,
    pattern: String,
    regex: Regex,
}

impl SensitivityRule {
    /// Build a rule; the pattern is anchored at the start of the column name
    pub fn new(sensitivity: SensitivityType, pattern: &str) -> Result<Self, regex::Error> {
        let regex = Regex::new(&format!("^(?:{})", pattern))?;
        Ok(Self {
            sensitivity,
            pattern: pattern.to_string(),
            regex,
        })
    }

    /// Test an already lower-cased column name
    fn matches(&self, folded: &str) -> bool {
        self.regex.is_match(folded)
    }
}

/// Rule listing exposed over the API
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleInfo {
    pub order: usize,
    pub sensitivity: SensitivityType,
    pub pattern: String,
}

const BUILTIN_PATTERNS: [(SensitivityType, &str); 6] = [
    (SensitivityType::Email, r".*email.*|.*mail.*"),
    (SensitivityType::Phone, r".*phone.*|.*mobile.*|.*tel.*"),
    (SensitivityType::Ssn, r".*ssn.*|.*social.*security.*"),
    (SensitivityType::CreditCard, r".*card.*|.*cc.*|.*credit.*"),
    (SensitivityType::Name, r".*name.*|.*first.*|.*last.*"),
    (SensitivityType::Address, r".*address.*|.*addr.*|.*street.*"),
];

static BUILTIN: Lazy<RuleSet> = Lazy::new(|| {
    let rules = BUILTIN_PATTERNS
        .iter()
        .filter_map(|(sensitivity, pattern)| SensitivityRule::new(*sensitivity, pattern).ok())
        .collect();
    RuleSet { rules }
});

/// Ordered rule list; first match wins
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<SensitivityRule>,
}

impl RuleSet {
    pub fn new(rules: Vec<SensitivityRule>) -> Self {
        Self { rules }
    }

    /// email, phone, ssn, credit_card, name, address
    pub fn builtin() -> RuleSet {
        BUILTIN.clone()
    }

    /// Classify a column name (case-insensitive)
    pub fn classify(&self, column_name: &str) -> Option<SensitivityType> {
        let folded = column_name.to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.matches(&folded))
            .map(|rule| rule.sensitivity)
    }

    pub fn describe(&self) -> Vec<RuleInfo> {
        self.rules
            .iter()
            .enumerate()
            .map(|(order, rule)| RuleInfo {
                order,
                sensitivity: rule.sensitivity,
                pattern: rule.pattern.clone(),
            })
            .collect()
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::builtin()
    }
}
