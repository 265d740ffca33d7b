//! Core data models for the query pipeline

use serde::{Deserialize, Serialize};
use std::fmt;

/// Externally-sourced equity record. Providers disagree on field naming and
/// nesting, so records stay opaque JSON and all access goes through the
/// field resolver in the selector.
pub type StockRecord = serde_json::Value;

//
// ================= Structured Query =================
//

/// Machine-actionable form of a natural-language request.
///
/// Produced by the intent extractor, mutated in place only by the rule-based
/// overrides, then consumed read-only by the validator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StructuredQuery {
    #[serde(default)]
    pub intent: String,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default, alias = "search_term")]
    pub search_term: Option<String>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default, alias = "order_by")]
    pub order_by: Option<String>,
    #[serde(default, alias = "order_direction")]
    pub order_direction: Option<SortDirection>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default, alias = "data_source")]
    pub data_source: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

impl Default for StructuredQuery {
    fn default() -> Self {
        Self {
            intent: "search".to_string(),
            fields: Vec::new(),
            search_term: None,
            conditions: Vec::new(),
            order_by: None,
            order_direction: None,
            limit: None,
            data_source: None,
            confidence: None,
        }
    }
}

/// A single filter condition.
///
/// The operator stays a raw string until validation so unrecognized
/// operators can be reported instead of failing deserialization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Condition {
    pub field: String,
    pub operator: String,
    pub value: ConditionValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl Condition {
    pub fn numeric(field: &str, operator: &str, value: f64) -> Self {
        Self {
            field: field.to_string(),
            operator: operator.to_string(),
            value: ConditionValue::Number(value),
            unit: None,
        }
    }

    pub fn between(field: &str, low: f64, high: f64) -> Self {
        Self {
            field: field.to_string(),
            operator: "BETWEEN".to_string(),
            value: ConditionValue::Range([low, high]),
            unit: None,
        }
    }
}

/// Condition value: a number, a 2-element numeric range, or a symbol list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ConditionValue {
    Number(f64),
    Range([f64; 2]),
    List(Vec<String>),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Desc,
    Asc,
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Desc => write!(f, "desc"),
            SortDirection::Asc => write!(f, "asc"),
        }
    }
}

//
// ================= Extraction =================
//

/// How a structured query was produced.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMode {
    /// Primary or secondary model answered directly.
    Model,
    /// Traffic gate skipped the model; keyword heuristic answered.
    Rules,
    /// All model tiers failed; keyword heuristic rescued the query.
    Fallback,
    /// Low-confidence model output blended with the keyword heuristic.
    Hybrid,
}

/// Resolved output of the intent extractor. Cloneable so concurrent callers
/// deduplicated onto one in-flight request all receive the same outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Extraction {
    pub structured_query: Option<StructuredQuery>,
    pub intent: String,
    pub confidence: f64,
    pub used_model: bool,
    pub mode: ExtractionMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

//
// ================= Validation =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldSuggestion {
    pub invalid: String,
    pub suggestions: Vec<String>,
}

/// Result of schema validation. `clean_query` is the only structure the
/// data selector trusts.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub invalid_fields: Vec<String>,
    pub suggestions: Vec<FieldSuggestion>,
    pub clean_query: StructuredQuery,
    /// Canonical names actually used by fields and conditions.
    pub fields_used: Vec<String>,
}

//
// ================= Selection =================
//

#[derive(Debug, Clone, Serialize)]
pub struct Selection {
    pub results: Vec<StockRecord>,
    pub metadata: SelectionMetadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct SelectionMetadata {
    pub total_fetched: usize,
    pub after_filtering: usize,
    pub returned: usize,
    pub data_source: String,
    /// True when an accepted model ranking ordered the results.
    pub model_ranked: bool,
    /// True when the bundled offline sample substituted for a failed fetch.
    pub degraded_sample: bool,
    pub processing_time_ms: u64,
}

//
// ================= Pipeline Result =================
//

/// Options accepted alongside a raw query.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct QueryOptions {
    #[serde(default)]
    pub skip_cache: bool,
}

/// Final output of a successful pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub original_query: String,
    pub normalized_query: String,
    pub clean_query: StructuredQuery,
    pub results: Vec<StockRecord>,
    pub metadata: PipelineMetadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineMetadata {
    pub intent: String,
    pub confidence: f64,
    pub extraction_mode: ExtractionMode,
    pub used_model: bool,
    pub fields_used: Vec<String>,
    pub total_fetched: usize,
    pub after_filtering: usize,
    pub returned: usize,
    pub data_source: String,
    pub corrected: bool,
    pub warnings: Vec<String>,
    pub processing_time_ms: u64,
}
