//! Deterministic keyword-based extractor
//!
//! The bottom tier of the extraction fallback chain, and the direct path
//! when the traffic gate skips the model. Produces a low-confidence
//! structured query from fixed cues; never makes an external call.

use crate::models::{Condition, SortDirection, StructuredQuery};
use crate::normalizer;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

pub const KEYWORD_CONFIDENCE: f64 = 0.2;

lazy_static! {
    static ref PRICE_CONDITION_RE: Regex = Regex::new(
        r"\b(less than|under|below|greater than|more than|above|over)\s+(\d+(?:\.\d+)?)"
    )
    .expect("price condition pattern");
}

pub struct KeywordExtraction {
    pub query: StructuredQuery,
    /// False when no actionable cue was found in the text.
    pub signal: bool,
}

/// Extract a structured query from fixed keyword cues.
pub fn extract(normalized: &str) -> KeywordExtraction {
    let mut query = StructuredQuery {
        confidence: Some(KEYWORD_CONFIDENCE),
        ..Default::default()
    };

    query.limit = normalizer::infer_limit(normalized);

    query.data_source = if normalized.contains("nifty 500") {
        Some("nifty500".to_string())
    } else if normalized.contains("nifty 100") {
        Some("nifty100".to_string())
    } else if normalized.contains("nifty 50") {
        Some("nifty50".to_string())
    } else {
        None
    };

    let mut cued = false;

    if normalized.contains("gainer") || normalized.contains("top") || normalized.contains("gain")
    {
        query.order_by = Some("percent_change".to_string());
        query.order_direction = Some(SortDirection::Desc);
        cued = true;
    } else if normalized.contains("loser") || normalized.contains("loss") {
        query.intent = "losers".to_string();
        query.order_by = Some("percent_change".to_string());
        query.order_direction = Some(SortDirection::Asc);
        // Loss-making screen: negative earnings per share.
        query.conditions.push(Condition::numeric("eps", "<", 0.0));
        cued = true;
    } else {
        query.order_by = Some("current_price".to_string());
    }

    for caps in PRICE_CONDITION_RE.captures_iter(normalized) {
        let operator = match &caps[1] {
            "less than" | "under" | "below" => "<",
            _ => ">",
        };
        if let Ok(value) = caps[2].parse::<f64>() {
            debug!(operator, value, "keyword extractor detected price condition");
            query
                .conditions
                .push(Condition::numeric("current_price", operator, value));
        }
    }

    let signal = cued
        || !query.conditions.is_empty()
        || query.data_source.is_some()
        || query.limit.is_some();

    KeywordExtraction { query, signal }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ConditionValue;

    #[test]
    fn test_price_condition_extraction() {
        let extraction = extract("stocks less than 500");
        assert!(extraction.signal);

        let condition = &extraction.query.conditions[0];
        assert_eq!(condition.field, "current_price");
        assert_eq!(condition.operator, "<");
        assert_eq!(condition.value, ConditionValue::Number(500.0));
    }

    #[test]
    fn test_loss_query_emits_negative_eps() {
        let extraction = extract("10 stocks in losses");
        assert!(extraction.signal);
        assert_eq!(extraction.query.intent, "losers");
        assert_eq!(extraction.query.limit, Some(10));

        let eps = extraction
            .query
            .conditions
            .iter()
            .find(|c| c.field == "eps")
            .expect("eps condition");
        assert_eq!(eps.operator, "<");
        assert_eq!(eps.value, ConditionValue::Number(0.0));
    }

    #[test]
    fn test_scope_phrase_selects_tier() {
        let extraction = extract("nifty 50 stocks above 1000");
        assert_eq!(extraction.query.data_source.as_deref(), Some("nifty50"));
    }

    #[test]
    fn test_gainer_cue_is_actionable() {
        let extraction = extract("top gainers today");
        assert!(extraction.signal);
        assert_eq!(extraction.query.order_by.as_deref(), Some("percent_change"));
        assert_eq!(
            extraction.query.order_direction,
            Some(SortDirection::Desc)
        );
    }

    #[test]
    fn test_no_signal_for_vague_text() {
        let extraction = extract("interesting companies");
        assert!(!extraction.signal);
        assert!(extraction.query.conditions.is_empty());
    }

    #[test]
    fn test_confidence_is_low() {
        let extraction = extract("top 5 gainers");
        assert_eq!(extraction.query.confidence, Some(KEYWORD_CONFIDENCE));
        assert_eq!(extraction.query.order_by.as_deref(), Some("percent_change"));
    }
}
