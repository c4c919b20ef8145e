// src/validate/mod.rs
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

pub mod checks;

pub use checks::{
    check_incidence_range, check_new_cases_non_negative, check_no_future_dates,
    check_required_fields_and_uniqueness,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    None,
    Warning,
    Error,
}

/// Result of one data-quality check. Failing a check is data, never an `Err`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckOutcome {
    pub target: String,
    pub passed: bool,
    pub severity: Severity,
    pub metadata: BTreeMap<String, Value>,
}

impl CheckOutcome {
    pub fn new(target: impl Into<String>, passed: bool, severity: Severity) -> Self {
        Self {
            target: target.into(),
            passed,
            severity,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Integer metadata lookup, for callers that alert on counts.
    pub fn count(&self, key: &str) -> Option<u64> {
        self.metadata.get(key).and_then(Value::as_u64)
    }
}
