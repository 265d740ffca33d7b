//! Field validation against the schema registry
//!
//! Resolves aliases to canonical names, records invalid names with fuzzy
//! suggestions, and produces the clean query the data selector trusts.
//! Validity rule: any invalid field OR any invalid condition (bad field or
//! unrecognized operator) fails the whole query.

use crate::models::{FieldSuggestion, StructuredQuery, ValidationResult};
use crate::schema;
use tracing::{debug, warn};

pub const DEFAULT_LIMIT: u32 = 50;
pub const DEFAULT_CONFIDENCE: f64 = 0.8;

/// Validate a structured query and rewrite every field reference to its
/// canonical name.
pub fn validate(query: &StructuredQuery) -> ValidationResult {
    let mut invalid_fields: Vec<String> = Vec::new();
    let mut suggestions: Vec<FieldSuggestion> = Vec::new();
    let mut fields_used: Vec<String> = Vec::new();
    let mut clean = query.clone();

    let record_invalid = |name: &str,
                          invalid_fields: &mut Vec<String>,
                          suggestions: &mut Vec<FieldSuggestion>| {
        if !invalid_fields.iter().any(|f| f == name) {
            invalid_fields.push(name.to_string());
            suggestions.push(FieldSuggestion {
                invalid: name.to_string(),
                suggestions: schema::suggest_fields(name),
            });
        }
    };

    let track = |canonical: &str, fields_used: &mut Vec<String>| {
        if !fields_used.iter().any(|f| f == canonical) {
            fields_used.push(canonical.to_string());
        }
    };

    clean.fields = query
        .fields
        .iter()
        .filter_map(|field| {
            let normalized = schema::normalize_field_name(field);
            match schema::resolve_field(&normalized) {
                Some(canonical) => {
                    track(canonical, &mut fields_used);
                    Some(canonical.to_string())
                }
                None => {
                    warn!(field = %field, "unknown field in query");
                    record_invalid(field, &mut invalid_fields, &mut suggestions);
                    None
                }
            }
        })
        .collect();

    clean.conditions = query
        .conditions
        .iter()
        .filter_map(|condition| {
            let normalized = schema::normalize_field_name(&condition.field);
            let canonical = match schema::resolve_field(&normalized) {
                Some(canonical) => canonical,
                None => {
                    warn!(field = %condition.field, "unknown field in condition");
                    record_invalid(&condition.field, &mut invalid_fields, &mut suggestions);
                    return None;
                }
            };

            if !schema::is_valid_operator(&condition.operator) {
                // Distinct message from an unknown field: the name is fine,
                // the operator is not.
                warn!(operator = %condition.operator, "unrecognized condition operator");
                let message = format!(
                    "unsupported operator '{}' on field '{}'",
                    condition.operator, canonical
                );
                if !invalid_fields.contains(&message) {
                    invalid_fields.push(message);
                }
                return None;
            }

            track(canonical, &mut fields_used);
            let mut resolved = condition.clone();
            resolved.field = canonical.to_string();
            Some(resolved)
        })
        .collect();

    if let Some(order_by) = &query.order_by {
        let normalized = schema::normalize_field_name(order_by);
        match schema::resolve_field(&normalized) {
            Some(canonical) => {
                track(canonical, &mut fields_used);
                clean.order_by = Some(canonical.to_string());
            }
            None => {
                warn!(field = %order_by, "unknown orderBy field");
                record_invalid(order_by, &mut invalid_fields, &mut suggestions);
                clean.order_by = None;
            }
        }
    }

    if clean.limit.is_none() {
        clean.limit = Some(DEFAULT_LIMIT);
    }
    if clean.confidence.is_none() {
        clean.confidence = Some(DEFAULT_CONFIDENCE);
    }

    let is_valid = invalid_fields.is_empty();
    debug!(is_valid, fields = fields_used.len(), "validation complete");

    ValidationResult {
        is_valid,
        invalid_fields,
        suggestions,
        clean_query: clean,
        fields_used,
    }
}
