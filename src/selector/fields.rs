//! Field-value resolution against heterogeneous provider records
//!
//! Providers disagree on naming, casing, and nesting, so every numeric
//! lookup goes through one resolver: direct key, lower-cased key, known
//! provider variants, then nested paths. String values are coerced by
//! stripping currency/percent/thousand-separator symbols.

use crate::models::StockRecord;
use std::collections::HashMap;

/// Canonical field → known provider field variants.
const PROVIDER_VARIANTS: &[(&str, &[&str])] = &[
    ("pe_ratio", &["peratio", "pe", "priceToEarnings", "p_e_ratio"]),
    ("pb_ratio", &["pbratio", "pb", "priceToBook", "p_b_ratio"]),
    ("market_cap", &["marketcap", "marketCap", "mcap", "mktCap"]),
    ("dividend_yield", &["dividendyield", "divyield", "yield"]),
    ("profit_margin", &["profitmargin", "netmargin", "margin"]),
    ("debt_to_equity_ratio", &["debttoequity", "deratio", "d_e_ratio"]),
    ("return_on_equity", &["roe", "returnonequity"]),
    ("return_on_assets", &["roa", "returnonassets"]),
    ("revenue", &["totalrevenue", "sales", "turnover"]),
    ("net_income", &["netincome", "profit", "netprofit"]),
    ("current_price", &["price", "lastPrice", "lastprice", "ltp", "close"]),
    ("percent_change", &["pChange", "pchange", "changePercent", "percentChange"]),
    ("volume", &["totalTradedVolume", "tradedVolume", "vol"]),
    ("eps", &["earningsPerShare", "epsValue"]),
    ("near_week_high", &["nearWkHigh", "near52WeekHigh"]),
    ("near_week_low", &["nearWkLow", "near52WeekLow"]),
    ("promoter_holding_percentage", &["promoterholding", "promoter"]),
    ("revenue_yoy_growth", &["revenuegrowth", "salesgrowth"]),
];

const NESTED_PREFIXES: &[&str] = &["fundamentals", "metrics", "data"];

/// Per-request resolver memoizing record+field lookups.
///
/// Keys are the record's index in the fetched set, so one resolver must not
/// outlive the fetch it was created for.
pub struct FieldResolver {
    memo: HashMap<(usize, String), Option<f64>>,
}

impl FieldResolver {
    pub fn new() -> Self {
        Self {
            memo: HashMap::new(),
        }
    }

    pub fn resolve(&mut self, index: usize, record: &StockRecord, field: &str) -> Option<f64> {
        let key = (index, field.to_string());
        if let Some(cached) = self.memo.get(&key) {
            return *cached;
        }
        let value = resolve_value(record, field);
        self.memo.insert(key, value);
        value
    }
}

impl Default for FieldResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Uncached resolution: direct key, lower-cased key, provider variants,
/// then nested paths.
pub fn resolve_value(record: &StockRecord, field: &str) -> Option<f64> {
    if let Some(value) = record.get(field) {
        if let Some(parsed) = coerce_numeric(value) {
            return Some(parsed);
        }
    }

    let lower = field.to_lowercase();
    if lower != field {
        if let Some(value) = record.get(&lower) {
            if let Some(parsed) = coerce_numeric(value) {
                return Some(parsed);
            }
        }
    }

    if let Some((_, variants)) = PROVIDER_VARIANTS.iter().find(|(f, _)| *f == field) {
        for variant in variants.iter() {
            if let Some(value) = record.get(*variant) {
                if let Some(parsed) = coerce_numeric(value) {
                    return Some(parsed);
                }
            }
            let lower_variant = variant.to_lowercase();
            if lower_variant != *variant {
                if let Some(value) = record.get(&lower_variant) {
                    if let Some(parsed) = coerce_numeric(value) {
                        return Some(parsed);
                    }
                }
            }
        }
    }

    for prefix in NESTED_PREFIXES {
        if let Some(value) = record.get(prefix).and_then(|nested| nested.get(field)) {
            if let Some(parsed) = coerce_numeric(value) {
                return Some(parsed);
            }
        }
    }

    None
}

/// Coerce a JSON value to f64, stripping `,` `₹` `$` `%` from strings.
fn coerce_numeric(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| !matches!(c, ',' | '₹' | '$' | '%'))
                .collect();
            cleaned.trim().parse::<f64>().ok()
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_direct_and_lowercase_lookup() {
        let record = json!({"pe_ratio": 14.2});
        assert_eq!(resolve_value(&record, "pe_ratio"), Some(14.2));

        let record = json!({"market_cap": 5e12});
        assert_eq!(resolve_value(&record, "Market_Cap"), Some(5e12));
    }

    #[test]
    fn test_provider_variant_lookup() {
        let record = json!({"lastPrice": 1520.5});
        assert_eq!(resolve_value(&record, "current_price"), Some(1520.5));

        let record = json!({"pChange": -2.3});
        assert_eq!(resolve_value(&record, "percent_change"), Some(-2.3));
    }

    #[test]
    fn test_nested_path_lookup() {
        let record = json!({"fundamentals": {"pe_ratio": 22.1}});
        assert_eq!(resolve_value(&record, "pe_ratio"), Some(22.1));

        let record = json!({"metrics": {"return_on_equity": 18.0}});
        assert_eq!(resolve_value(&record, "return_on_equity"), Some(18.0));
    }

    #[test]
    fn test_string_coercion_strips_symbols() {
        let record = json!({"market_cap": "₹1,23,456"});
        assert_eq!(resolve_value(&record, "market_cap"), Some(123456.0));

        let record = json!({"dividend_yield": "2.5%"});
        assert_eq!(resolve_value(&record, "dividend_yield"), Some(2.5));
    }

    #[test]
    fn test_unresolvable_field_is_none() {
        let record = json!({"symbol": "TCS"});
        assert_eq!(resolve_value(&record, "pe_ratio"), None);
        // Non-numeric strings coerce to None, not 0.
        assert_eq!(resolve_value(&record, "symbol"), None);
    }

    #[test]
    fn test_memoization_returns_same_value() {
        let record = json!({"lastPrice": 100.0});
        let mut resolver = FieldResolver::new();
        assert_eq!(resolver.resolve(0, &record, "current_price"), Some(100.0));
        assert_eq!(resolver.resolve(0, &record, "current_price"), Some(100.0));
        assert_eq!(resolver.memo.len(), 1);
    }
}
