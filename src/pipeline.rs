//! Pipeline orchestration
//!
//! Sequences structural validation → normalization → intent extraction →
//! rule overrides → field validation → data selection, short-circuiting on
//! the first failure. Stage tags on errors let callers distinguish "fix
//! your query" from "service unavailable". Retries never cross stage
//! boundaries; they live inside the intent extractor only.

use crate::error::QueryError;
use crate::models::{PipelineMetadata, PipelineResult, QueryOptions};
use crate::normalizer;
use crate::overrides;
use crate::selector::StockSelector;
use crate::validator;
use crate::IntentExtractor;
use std::time::Instant;
use tracing::{info, warn};

const MIN_QUERY_LENGTH: usize = 5;
const LONG_QUERY_LENGTH: usize = 500;

pub struct QueryPipeline {
    extractor: IntentExtractor,
    selector: StockSelector,
}

impl QueryPipeline {
    pub fn new(extractor: IntentExtractor, selector: StockSelector) -> Self {
        Self { extractor, selector }
    }

    pub fn extractor(&self) -> &IntentExtractor {
        &self.extractor
    }

    /// Run the full pipeline for a raw query.
    pub async fn run(
        &self,
        raw_query: &str,
        options: QueryOptions,
    ) -> crate::Result<PipelineResult> {
        let start = Instant::now();

        // Structural validation happens before normalization or any
        // external call.
        let warnings = check_structure(raw_query)?;
        if !warnings.is_empty() {
            warn!(?warnings, "query accepted with warnings");
        }

        let normalized = normalizer::normalize(raw_query);
        let corrected = normalized != raw_query.to_lowercase();
        if corrected {
            info!(original = raw_query, corrected = %normalized, "query auto-corrected");
        }

        let extraction = self.extractor.extract(&normalized, options.skip_cache).await;
        let structured = match (extraction.structured_query, extraction.error) {
            (Some(structured), _) => structured,
            (None, error) => {
                return Err(QueryError::Extraction(
                    error.unwrap_or_else(|| "extraction produced no query".to_string()),
                ));
            }
        };

        let overridden = overrides::apply(&normalized, &structured);

        let validated = validator::validate(&overridden);
        if !validated.is_valid {
            return Err(QueryError::InvalidFields {
                invalid_fields: validated.invalid_fields,
                suggestions: validated.suggestions,
            });
        }

        let selection = self.selector.select(&validated.clean_query).await?;

        let metadata = PipelineMetadata {
            intent: validated.clean_query.intent.clone(),
            confidence: extraction.confidence,
            extraction_mode: extraction.mode,
            used_model: extraction.used_model,
            fields_used: validated.fields_used,
            total_fetched: selection.metadata.total_fetched,
            after_filtering: selection.metadata.after_filtering,
            returned: selection.metadata.returned,
            data_source: selection.metadata.data_source,
            corrected,
            warnings,
            processing_time_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            returned = metadata.returned,
            elapsed_ms = metadata.processing_time_ms,
            "pipeline complete"
        );

        Ok(PipelineResult {
            original_query: raw_query.to_string(),
            normalized_query: normalized,
            clean_query: validated.clean_query,
            results: selection.results,
            metadata,
        })
    }
}

/// Reject structurally hopeless queries; return warnings for borderline
/// ones.
fn check_structure(query: &str) -> crate::Result<Vec<String>> {
    let trimmed = query.trim();
    let mut errors: Vec<String> = Vec::new();
    let mut warnings: Vec<String> = Vec::new();

    if trimmed.is_empty() {
        errors.push("Query cannot be empty.".to_string());
    } else if query.len() < MIN_QUERY_LENGTH {
        errors.push("Query is too short. Please provide more details.".to_string());
    }

    if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
        errors.push(
            "Query contains only numbers. Please add context (e.g., \"stocks with PE less than 15\")."
                .to_string(),
        );
    }

    if matches!(
        trimmed.to_lowercase().as_str(),
        "good" | "best" | "top" | "high" | "low"
    ) {
        errors.push(
            "Query needs more context. Example: \"stocks with high dividend yield\".".to_string(),
        );
    }

    if query.len() > LONG_QUERY_LENGTH {
        warnings
            .push("Query is very long. Consider breaking it into smaller queries.".to_string());
    }

    if errors.is_empty() {
        Ok(warnings)
    } else {
        Err(QueryError::InvalidQuery(errors.join(" ")))
    }
}
