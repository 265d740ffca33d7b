//! Data selection: tier resolution, fetch, filter, rank, sort, limit
//!
//! Consumes only the validator's clean query. Filtering is AND-semantics
//! with null-excludes; BETWEEN is inclusive on both ends; unsupported
//! operators exclude the record rather than raising.

use crate::models::{ConditionValue, Selection, SelectionMetadata, SortDirection, StockRecord, StructuredQuery};
use crate::validator::DEFAULT_LIMIT;
use std::time::Instant;
use tracing::{debug, info, warn};

pub mod fields;
pub mod provider;
pub mod ranker;
pub mod sample;

pub use fields::FieldResolver;
pub use provider::{HttpMarketDataProvider, MarketDataProvider, Tier};
pub use ranker::{ModelRanker, NoRanker, RankingCandidate, ResultRanker};

/// Limits above this prefer the broad universe even without conditions.
const BROAD_TIER_LIMIT: u32 = 100;

/// Record keys tried, in order, when matching a free-text search term.
const NAME_KEYS: &[&str] = &[
    "symbol",
    "name",
    "companyName",
    "company",
    "longName",
    "shortName",
    "identifier",
];

pub struct StockSelector {
    provider: Box<dyn MarketDataProvider>,
    ranker: Box<dyn ResultRanker>,
}

impl StockSelector {
    pub fn new(provider: Box<dyn MarketDataProvider>, ranker: Box<dyn ResultRanker>) -> Self {
        Self { provider, ranker }
    }

    /// Select records for a clean query.
    ///
    /// An empty result set after filtering is a valid outcome; only an
    /// unreachable provider or unrecognized payload is an error.
    pub async fn select(&self, clean: &StructuredQuery) -> crate::Result<Selection> {
        let start = Instant::now();
        let limit = clean.limit.unwrap_or(DEFAULT_LIMIT) as usize;
        let tier = resolve_tier(clean);

        let (records, degraded_sample) = match self.provider.fetch(tier).await {
            Ok(records) if records.is_empty() && is_loss_query(clean) => {
                warn!("empty fetch for a loss screen, substituting offline sample");
                (sample::loss_sample(), true)
            }
            Ok(records) if records.is_empty() => {
                return Err(crate::error::QueryError::DataFetch(
                    "no stock data available".to_string(),
                ));
            }
            Ok(records) => (records, false),
            Err(e) if is_loss_query(clean) => {
                warn!(error = %e, "fetch failed for a loss screen, substituting offline sample");
                (sample::loss_sample(), true)
            }
            Err(e) => return Err(e),
        };
        let total_fetched = records.len();
        let data_source = if degraded_sample {
            sample::OFFLINE_SAMPLE_SOURCE.to_string()
        } else {
            tier.name().to_string()
        };

        // Free-text search short-circuit.
        let mut working: Vec<(usize, StockRecord)> = records.into_iter().enumerate().collect();
        if let Some(term) = clean.search_term.as_deref().filter(|t| !t.trim().is_empty()) {
            let matches: Vec<(usize, StockRecord)> = working
                .iter()
                .filter(|(_, record)| matches_search_term(record, term))
                .cloned()
                .collect();

            if !matches.is_empty() {
                if clean.conditions.is_empty() {
                    let results: Vec<StockRecord> = matches
                        .into_iter()
                        .map(|(_, record)| record)
                        .take(limit)
                        .collect();
                    info!(returned = results.len(), "search term matched directly");
                    let returned = results.len();
                    return Ok(Selection {
                        results,
                        metadata: SelectionMetadata {
                            total_fetched,
                            after_filtering: returned,
                            returned,
                            data_source,
                            model_ranked: false,
                            degraded_sample,
                            processing_time_ms: start.elapsed().as_millis() as u64,
                        },
                    });
                }
                working = matches;
            }
        }

        let mut resolver = FieldResolver::new();

        let mut filtered: Vec<(usize, StockRecord)> = working
            .into_iter()
            .filter(|(index, record)| {
                clean.conditions.iter().all(|condition| {
                    match resolver.resolve(*index, record, &condition.field) {
                        // A null field value excludes the record.
                        None => false,
                        Some(value) => evaluate(value, &condition.operator, &condition.value),
                    }
                })
            })
            .collect();
        let after_filtering = filtered.len();
        debug!(total_fetched, after_filtering, "filtering complete");

        let mut model_ranked = false;
        if !filtered.is_empty() {
            match self.try_rank(clean, &filtered, &mut resolver, limit).await {
                Some(order) => {
                    let mut ranked: Vec<(usize, StockRecord)> = Vec::with_capacity(order.len());
                    for index in order {
                        if let Some(pos) = filtered.iter().position(|(i, _)| *i == index) {
                            ranked.push(filtered.swap_remove(pos));
                        }
                    }
                    filtered = ranked;
                    model_ranked = true;
                }
                None => {
                    if let Some(order_by) = &clean.order_by {
                        let ascending = clean.order_direction == Some(SortDirection::Asc);
                        filtered.sort_by(|(ai, a), (bi, b)| {
                            let av = resolver.resolve(*ai, a, order_by).unwrap_or(0.0);
                            let bv = resolver.resolve(*bi, b, order_by).unwrap_or(0.0);
                            let ordering = av.partial_cmp(&bv).unwrap_or(std::cmp::Ordering::Equal);
                            if ascending {
                                ordering
                            } else {
                                ordering.reverse()
                            }
                        });
                    }
                }
            }
        }

        let results: Vec<StockRecord> = filtered
            .into_iter()
            .map(|(_, record)| record)
            .take(limit)
            .collect();
        let returned = results.len();
        info!(returned, data_source = %data_source, model_ranked, "selection complete");

        Ok(Selection {
            results,
            metadata: SelectionMetadata {
                total_fetched,
                after_filtering,
                returned,
                data_source,
                model_ranked,
                degraded_sample,
                processing_time_ms: start.elapsed().as_millis() as u64,
            },
        })
    }

    /// Ask the ranker; a ranker error downgrades to the sort fallback.
    async fn try_rank(
        &self,
        clean: &StructuredQuery,
        filtered: &[(usize, StockRecord)],
        resolver: &mut FieldResolver,
        limit: usize,
    ) -> Option<Vec<usize>> {
        let condition_fields: Vec<&str> =
            clean.conditions.iter().map(|c| c.field.as_str()).collect();

        let candidates: Vec<RankingCandidate> = filtered
            .iter()
            .map(|(index, record)| {
                let mut values = serde_json::Map::new();
                for field in &condition_fields {
                    if let Some(value) = resolver.resolve(*index, record, field) {
                        values.insert(field.to_string(), serde_json::json!(value));
                    }
                }
                RankingCandidate {
                    index: *index,
                    symbol: record
                        .get("symbol")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    values,
                }
            })
            .collect();

        match self.ranker.rank(&clean.intent, &candidates, limit).await {
            Ok(order) => order,
            Err(e) => {
                warn!(error = %e, "ranking failed, using deterministic sort");
                None
            }
        }
    }
}

/// Explicit data source wins; otherwise conditions or a large limit pick
/// the broad universe.
fn resolve_tier(clean: &StructuredQuery) -> Tier {
    if let Some(tier) = clean.data_source.as_deref().and_then(Tier::from_source) {
        return tier;
    }
    if !clean.conditions.is_empty() || clean.limit.unwrap_or(0) > BROAD_TIER_LIMIT {
        return Tier::Nifty500;
    }
    Tier::Nifty100
}

fn is_loss_query(clean: &StructuredQuery) -> bool {
    clean.conditions.iter().any(|c| {
        c.field == "eps"
            && c.operator == "<"
            && matches!(c.value, ConditionValue::Number(v) if v <= 0.0)
    })
}

fn matches_search_term(record: &StockRecord, term: &str) -> bool {
    let needle = term.to_lowercase();
    let matches = |value: Option<&serde_json::Value>| {
        value
            .and_then(|v| v.as_str())
            .map(|s| s.to_lowercase().contains(&needle))
            .unwrap_or(false)
    };

    NAME_KEYS.iter().any(|key| matches(record.get(key)))
        || matches(record.get("info").and_then(|info| info.get("displayName")))
}

/// Evaluate one condition against a resolved numeric value.
fn evaluate(field_value: f64, operator: &str, value: &ConditionValue) -> bool {
    match (operator, value) {
        (">", ConditionValue::Number(v)) => field_value > *v,
        ("<", ConditionValue::Number(v)) => field_value < *v,
        (">=", ConditionValue::Number(v)) => field_value >= *v,
        ("<=", ConditionValue::Number(v)) => field_value <= *v,
        ("=" | "==", ConditionValue::Number(v)) => field_value == *v,
        ("!=", ConditionValue::Number(v)) => field_value != *v,
        ("BETWEEN", ConditionValue::Range([low, high])) => {
            field_value >= *low && field_value <= *high
        }
        // IN/LIKE and malformed value shapes exclude the record.
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QueryError;
    use crate::models::Condition;
    use serde_json::json;

    struct StaticProvider {
        records: Vec<StockRecord>,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl MarketDataProvider for StaticProvider {
        async fn fetch(&self, _tier: Tier) -> crate::Result<Vec<StockRecord>> {
            if self.fail {
                Err(QueryError::DataFetch("provider down".into()))
            } else {
                Ok(self.records.clone())
            }
        }
    }

    fn priced_records() -> Vec<StockRecord> {
        vec![
            json!({"symbol": "A", "lastPrice": 100, "pChange": 1.0}),
            json!({"symbol": "B", "lastPrice": 500, "pChange": 5.0}),
            json!({"symbol": "C", "lastPrice": 1000, "pChange": 3.0}),
            json!({"symbol": "D", "lastPrice": 5000, "pChange": -2.0}),
            json!({"symbol": "E", "lastPrice": 12000, "pChange": 4.0}),
        ]
    }

    fn selector(records: Vec<StockRecord>) -> StockSelector {
        StockSelector::new(
            Box::new(StaticProvider {
                records,
                fail: false,
            }),
            Box::new(NoRanker),
        )
    }

    fn symbols(selection: &Selection) -> Vec<&str> {
        selection
            .results
            .iter()
            .map(|r| r["symbol"].as_str().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_price_filter_returns_exactly_matching_records() {
        let selector = selector(priced_records());
        let clean = StructuredQuery {
            conditions: vec![Condition::numeric("current_price", "<", 1000.0)],
            limit: Some(50),
            ..Default::default()
        };

        let selection = selector.select(&clean).await.unwrap();
        assert_eq!(symbols(&selection), vec!["A", "B"]);
        assert_eq!(selection.metadata.total_fetched, 5);
        assert_eq!(selection.metadata.after_filtering, 2);
    }

    #[tokio::test]
    async fn test_between_is_inclusive_on_both_boundaries() {
        let selector = selector(priced_records());
        let clean = StructuredQuery {
            conditions: vec![Condition::between("current_price", 100.0, 500.0)],
            limit: Some(50),
            ..Default::default()
        };

        let selection = selector.select(&clean).await.unwrap();
        assert_eq!(symbols(&selection), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_limit_and_descending_sort() {
        let selector = selector(priced_records());
        let clean = StructuredQuery {
            order_by: Some("percent_change".to_string()),
            limit: Some(3),
            ..Default::default()
        };

        let selection = selector.select(&clean).await.unwrap();
        assert_eq!(symbols(&selection), vec!["B", "E", "C"]);
    }

    #[tokio::test]
    async fn test_explicit_ascending_sort() {
        let selector = selector(priced_records());
        let clean = StructuredQuery {
            order_by: Some("percent_change".to_string()),
            order_direction: Some(SortDirection::Asc),
            limit: Some(2),
            ..Default::default()
        };

        let selection = selector.select(&clean).await.unwrap();
        assert_eq!(symbols(&selection), vec!["D", "A"]);
    }

    #[tokio::test]
    async fn test_null_field_excludes_record() {
        let mut records = priced_records();
        records.push(json!({"symbol": "F"}));
        let selector = selector(records);
        let clean = StructuredQuery {
            conditions: vec![Condition::numeric("current_price", ">", 0.0)],
            limit: Some(50),
            ..Default::default()
        };

        let selection = selector.select(&clean).await.unwrap();
        assert!(!symbols(&selection).contains(&"F"));
        assert_eq!(selection.metadata.after_filtering, 5);
    }

    #[tokio::test]
    async fn test_unsupported_operator_excludes_rather_than_errors() {
        let selector = selector(priced_records());
        let clean = StructuredQuery {
            conditions: vec![Condition {
                field: "current_price".to_string(),
                operator: "LIKE".to_string(),
                value: ConditionValue::Number(100.0),
                unit: None,
            }],
            limit: Some(50),
            ..Default::default()
        };

        let selection = selector.select(&clean).await.unwrap();
        assert!(selection.results.is_empty());
        assert_eq!(selection.metadata.after_filtering, 0);
    }

    #[tokio::test]
    async fn test_search_term_short_circuits() {
        let records = vec![
            json!({"symbol": "TCS", "companyName": "Tata Consultancy Services", "lastPrice": 3500}),
            json!({"symbol": "INFY", "companyName": "Infosys", "lastPrice": 1500}),
        ];
        let selector = selector(records);
        let clean = StructuredQuery {
            search_term: Some("tata".to_string()),
            limit: Some(10),
            ..Default::default()
        };

        let selection = selector.select(&clean).await.unwrap();
        assert_eq!(symbols(&selection), vec!["TCS"]);
    }

    #[tokio::test]
    async fn test_loss_query_degrades_to_offline_sample() {
        let selector = StockSelector::new(
            Box::new(StaticProvider {
                records: Vec::new(),
                fail: true,
            }),
            Box::new(NoRanker),
        );
        let clean = StructuredQuery {
            intent: "losers".to_string(),
            conditions: vec![Condition::numeric("eps", "<", 0.0)],
            limit: Some(5),
            ..Default::default()
        };

        let selection = selector.select(&clean).await.unwrap();
        assert!(selection.metadata.degraded_sample);
        assert_eq!(selection.metadata.data_source, "offline_sample");
        assert_eq!(selection.results.len(), 5);
    }

    #[tokio::test]
    async fn test_provider_failure_without_loss_screen_is_an_error() {
        let selector = StockSelector::new(
            Box::new(StaticProvider {
                records: Vec::new(),
                fail: true,
            }),
            Box::new(NoRanker),
        );
        let clean = StructuredQuery {
            conditions: vec![Condition::numeric("pe_ratio", "<", 15.0)],
            limit: Some(5),
            ..Default::default()
        };

        let err = selector.select(&clean).await.unwrap_err();
        assert!(matches!(err, QueryError::DataFetch(_)));
    }

    #[tokio::test]
    async fn test_empty_after_filtering_is_valid() {
        let selector = selector(priced_records());
        let clean = StructuredQuery {
            conditions: vec![Condition::numeric("current_price", ">", 1e9)],
            limit: Some(50),
            ..Default::default()
        };

        let selection = selector.select(&clean).await.unwrap();
        assert!(selection.results.is_empty());
        assert_eq!(selection.metadata.total_fetched, 5);
    }

    #[tokio::test]
    async fn test_accepted_ranking_overrides_sort() {
        struct FixedRanker;
        #[async_trait::async_trait]
        impl ResultRanker for FixedRanker {
            async fn rank(
                &self,
                _intent: &str,
                candidates: &[RankingCandidate],
                limit: usize,
            ) -> crate::Result<Option<Vec<usize>>> {
                // Reverse of fetch order.
                let mut indices: Vec<usize> = candidates.iter().map(|c| c.index).collect();
                indices.reverse();
                indices.truncate(limit);
                Ok(Some(indices))
            }
        }

        let selector = StockSelector::new(
            Box::new(StaticProvider {
                records: priced_records(),
                fail: false,
            }),
            Box::new(FixedRanker),
        );
        let clean = StructuredQuery {
            conditions: vec![Condition::numeric("current_price", ">", 0.0)],
            order_by: Some("percent_change".to_string()),
            limit: Some(2),
            ..Default::default()
        };

        let selection = selector.select(&clean).await.unwrap();
        assert!(selection.metadata.model_ranked);
        assert_eq!(symbols(&selection), vec!["E", "D"]);
    }

    #[test]
    fn test_tier_resolution_rules() {
        let explicit = StructuredQuery {
            data_source: Some("nifty50".to_string()),
            conditions: vec![Condition::numeric("pe_ratio", "<", 15.0)],
            ..Default::default()
        };
        assert_eq!(resolve_tier(&explicit), Tier::Nifty50);

        let with_conditions = StructuredQuery {
            conditions: vec![Condition::numeric("pe_ratio", "<", 15.0)],
            ..Default::default()
        };
        assert_eq!(resolve_tier(&with_conditions), Tier::Nifty500);

        let large_limit = StructuredQuery {
            limit: Some(200),
            ..Default::default()
        };
        assert_eq!(resolve_tier(&large_limit), Tier::Nifty500);

        assert_eq!(resolve_tier(&StructuredQuery::default()), Tier::Nifty100);
    }
}
