//! Rule-based overrides applied after extraction
//!
//! Deterministic keyword-triggered corrections on the structured query,
//! independent of extractor confidence. Overrides are additive: they append
//! conditions and set intent/ordering but never remove anything the
//! extractor produced.

use crate::models::{Condition, SortDirection, StructuredQuery};
use crate::normalizer;
use tracing::debug;

const UNUSUAL_ACTIVITY_DEFAULT_LIMIT: u32 = 20;
const MIDCAP_RANGE: [f64; 2] = [1e11, 5e11];

/// Apply all rule-based overrides for the normalized query text.
pub fn apply(normalized: &str, query: &StructuredQuery) -> StructuredQuery {
    let mut updated = query.clone();

    // Limit merge keeps the larger of the extractor's and the text's signal.
    if let Some(inferred) = normalizer::infer_limit(normalized) {
        let merged = updated.limit.map_or(inferred, |l| l.max(inferred));
        updated.limit = Some(merged);
    }

    if normalized.contains("nifty 500") {
        updated.data_source = Some("nifty500".to_string());
    } else if normalized.contains("nifty 100") {
        updated.data_source = Some("nifty100".to_string());
    } else if normalized.contains("nifty 50") {
        updated.data_source = Some("nifty50".to_string());
    }

    if normalized.contains("top gainer") || normalized.contains("gainers") {
        debug!("override matched: gainers");
        updated.intent = "gainers".to_string();
        updated.order_by = Some("percent_change".to_string());
        updated.order_direction = Some(SortDirection::Desc);
        updated
            .conditions
            .push(Condition::numeric("percent_change", ">", 0.0));
    }

    if normalized.contains("loser") || normalized.contains("fell the most") {
        debug!("override matched: losers");
        updated.intent = "losers".to_string();
        updated.order_by = Some("percent_change".to_string());
        updated.order_direction = Some(SortDirection::Asc);
        updated
            .conditions
            .push(Condition::numeric("percent_change", "<", 0.0));
    }

    if normalized.contains("most active") || normalized.contains("by volume") {
        updated.intent = "most_active".to_string();
        updated.order_by = Some("volume".to_string());
        updated.order_direction = Some(SortDirection::Desc);
    }

    if normalized.contains("market sentiment") {
        updated.intent = "sentiment".to_string();
        updated.order_by = Some("percent_change".to_string());
        updated.order_direction = Some(SortDirection::Desc);
    }

    // "near 52 week low" also contains "52 week low", so the tighter band
    // must be checked first and suppress the generic one.
    let near_week_low =
        normalized.contains("near 52-week low") || normalized.contains("near 52 week low");

    if normalized.contains("52-week high") || normalized.contains("52 week high") {
        updated.intent = "week_high".to_string();
        updated
            .conditions
            .push(Condition::between("near_week_high", -1.0, 1.0));
    }

    if near_week_low {
        updated.intent = "near_week_low".to_string();
        updated
            .conditions
            .push(Condition::between("near_week_low", -5.0, 5.0));
    } else if normalized.contains("52-week low") || normalized.contains("52 week low") {
        updated.intent = "week_low".to_string();
        updated
            .conditions
            .push(Condition::between("near_week_low", -1.0, 1.0));
    }

    if normalized.contains("unusual trading") || normalized.contains("unusual activity") {
        updated.intent = "unusual_activity".to_string();
        updated.order_by = Some("volume".to_string());
        updated.order_direction = Some(SortDirection::Desc);
        if updated.limit.is_none() {
            updated.limit = Some(UNUSUAL_ACTIVITY_DEFAULT_LIMIT);
        }
    }

    if normalized.contains("midcap") {
        updated.intent = "midcap".to_string();
        updated
            .conditions
            .push(Condition::between("market_cap", MIDCAP_RANGE[0], MIDCAP_RANGE[1]));
    }

    updated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ConditionValue;

    #[test]
    fn test_gainers_pattern() {
        let query = StructuredQuery::default();
        let updated = apply("top gainers today", &query);

        assert_eq!(updated.intent, "gainers");
        assert_eq!(updated.order_by.as_deref(), Some("percent_change"));
        assert_eq!(updated.order_direction, Some(SortDirection::Desc));

        let condition = &updated.conditions[0];
        assert_eq!(condition.field, "percent_change");
        assert_eq!(condition.operator, ">");
    }

    #[test]
    fn test_limit_merge_keeps_larger() {
        let query = StructuredQuery {
            limit: Some(25),
            ..Default::default()
        };
        let updated = apply("top 10 gainers", &query);
        assert_eq!(updated.limit, Some(25));

        let updated = apply("top 100 gainers", &query);
        assert_eq!(updated.limit, Some(100));
    }

    #[test]
    fn test_overrides_are_additive() {
        let query = StructuredQuery {
            conditions: vec![Condition::numeric("pe_ratio", "<", 15.0)],
            ..Default::default()
        };
        let updated = apply("midcap stocks", &query);

        assert_eq!(updated.conditions.len(), 2);
        assert_eq!(updated.conditions[0].field, "pe_ratio");
        assert_eq!(updated.conditions[1].field, "market_cap");
        assert_eq!(
            updated.conditions[1].value,
            ConditionValue::Range([1e11, 5e11])
        );
    }

    #[test]
    fn test_near_week_low_uses_wider_band() {
        let updated = apply("stocks near 52 week low", &StructuredQuery::default());
        assert_eq!(updated.intent, "near_week_low");
        assert_eq!(updated.conditions.len(), 1);
        assert_eq!(
            updated.conditions[0].value,
            ConditionValue::Range([-5.0, 5.0])
        );
    }

    #[test]
    fn test_week_low_band() {
        let updated = apply("stocks at 52 week low", &StructuredQuery::default());
        assert_eq!(updated.intent, "week_low");
        assert_eq!(
            updated.conditions[0].value,
            ConditionValue::Range([-1.0, 1.0])
        );
    }

    #[test]
    fn test_unusual_activity_default_limit() {
        let updated = apply("unusual activity stocks", &StructuredQuery::default());
        assert_eq!(updated.intent, "unusual_activity");
        assert_eq!(updated.limit, Some(20));
        assert_eq!(updated.order_by.as_deref(), Some("volume"));

        let with_limit = StructuredQuery {
            limit: Some(5),
            ..Default::default()
        };
        let updated = apply("unusual activity stocks", &with_limit);
        assert_eq!(updated.limit, Some(5));
    }

    #[test]
    fn test_tier_phrase_sets_data_source() {
        let updated = apply("nifty 100 gainers", &StructuredQuery::default());
        assert_eq!(updated.data_source.as_deref(), Some("nifty100"));
    }

    #[test]
    fn test_no_match_leaves_query_unchanged() {
        let query = StructuredQuery {
            intent: "filter".to_string(),
            conditions: vec![Condition::numeric("roe", ">", 15.0)],
            ..Default::default()
        };
        let updated = apply("companies with high return on equity", &query);
        assert_eq!(updated.intent, "filter");
        assert_eq!(updated.conditions.len(), 1);
    }
}
