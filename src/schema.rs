//! Schema registry: canonical fields, aliases, and operators
//!
//! Shared by the validator (accept/reject names) and the extractor
//! (the system instruction lists the canonical fields verbatim).

/// Canonical database fields across all tables.
pub const VALID_FIELDS: &[&str] = &[
    // Fundamentals
    "pe_ratio",
    "peg_ratio",
    "pb_ratio",
    "ps_ratio",
    "dividend_yield",
    "beta",
    "eps",
    "book_value_per_share",
    "profit_margin",
    "operating_margin",
    "return_on_equity",
    "return_on_assets",
    "current_ratio",
    "quick_ratio",
    "interest_coverage",
    "debt_to_equity_ratio",
    "total_debt",
    "free_cash_flow",
    "debt_to_fcf_ratio",
    // Shareholding
    "promoter_holding_percentage",
    "institutional_holding_percentage",
    "public_holding_percentage",
    "foreign_institutional_holding",
    "domestic_institutional_holding",
    "mutual_fund_holding",
    "retail_holding",
    "promoter_pledge_percentage",
    // Stocks
    "market_cap",
    "employees",
    "average_volume",
    "shares_outstanding",
    "insider_ownership_percentage",
    "institutional_ownership_percentage",
    // Market movement (used by intent overrides)
    "current_price",
    "percent_change",
    "volume",
    "near_week_high",
    "near_week_low",
    // Financials
    "revenue",
    "ebitda",
    "revenue_yoy_growth",
    "ebitda_yoy_growth",
    "gross_profit",
    "operating_income",
    "net_income",
    "gross_margin",
    "net_margin",
    "eps_basic",
    "eps_diluted",
    // Earnings
    "earnings_date",
    "estimated_eps",
    "expected_revenue",
    "beat_probability",
    "analyst_target_price_low",
    "analyst_target_price_high",
    "analyst_count",
    "consensus_rating",
];

/// Common alias → canonical field mappings.
const FIELD_ALIASES: &[(&str, &str)] = &[
    ("p/e", "pe_ratio"),
    ("pe", "pe_ratio"),
    ("price_to_earnings", "pe_ratio"),
    ("p/b", "pb_ratio"),
    ("pb", "pb_ratio"),
    ("price_to_book", "pb_ratio"),
    ("roe", "return_on_equity"),
    ("roa", "return_on_assets"),
    ("mcap", "market_cap"),
    ("marketcap", "market_cap"),
    ("div_yield", "dividend_yield"),
    ("dividend", "dividend_yield"),
    ("debt_equity", "debt_to_equity_ratio"),
    ("de_ratio", "debt_to_equity_ratio"),
    ("profit", "profit_margin"),
    ("net_profit", "net_margin"),
    ("promoter_holding", "promoter_holding_percentage"),
    ("institutional_holding", "institutional_holding_percentage"),
    ("price", "current_price"),
    ("lastprice", "current_price"),
    ("last_price", "current_price"),
    ("ltp", "current_price"),
    ("pchange", "percent_change"),
    ("change_percent", "percent_change"),
    ("average_daily_volume", "average_volume"),
];

/// Recognized comparison operators.
pub const VALID_OPERATORS: &[&str] =
    &[">", "<", ">=", "<=", "=", "!=", "BETWEEN", "IN", "LIKE"];

const MAX_SUGGESTIONS: usize = 5;
const SUGGESTION_EDIT_DISTANCE: usize = 3;

/// Lower-case, trim, and underscore-join a field name.
pub fn normalize_field_name(field: &str) -> String {
    field
        .to_lowercase()
        .trim()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

/// Resolve a normalized field name to its canonical form, through the
/// alias table if needed.
pub fn resolve_field(normalized: &str) -> Option<&'static str> {
    if let Some(canonical) = VALID_FIELDS.iter().find(|f| **f == normalized) {
        return Some(canonical);
    }
    FIELD_ALIASES
        .iter()
        .find(|(alias, _)| *alias == normalized)
        .map(|(_, canonical)| *canonical)
}

pub fn is_valid_operator(operator: &str) -> bool {
    VALID_OPERATORS.contains(&operator)
}

/// Suggest similar canonical fields for an invalid name.
///
/// A candidate matches when the de-punctuated forms are mutual substrings
/// or within edit distance 3.
pub fn suggest_fields(field: &str) -> Vec<String> {
    let normalized = depunctuate(field);

    VALID_FIELDS
        .iter()
        .filter(|valid| {
            let valid_normalized = depunctuate(valid);
            valid_normalized.contains(&normalized)
                || normalized.contains(&valid_normalized)
                || levenshtein(&normalized, &valid_normalized) <= SUGGESTION_EDIT_DISTANCE
        })
        .take(MAX_SUGGESTIONS)
        .map(|s| s.to_string())
        .collect()
}

fn depunctuate(field: &str) -> String {
    field
        .to_lowercase()
        .chars()
        .filter(|c| !matches!(c, '_' | ' ' | '-'))
        .collect()
}

/// Classic insert/delete/substitute edit distance, unit cost.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    let mut prev: Vec<usize> = (0..=a.len()).collect();
    let mut curr = vec![0usize; a.len() + 1];

    for i in 1..=b.len() {
        curr[0] = i;
        for j in 1..=a.len() {
            curr[j] = if b[i - 1] == a[j - 1] {
                prev[j - 1]
            } else {
                1 + prev[j - 1].min(prev[j]).min(curr[j - 1])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[a.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_canonical_and_alias() {
        assert_eq!(resolve_field("pe_ratio"), Some("pe_ratio"));
        assert_eq!(resolve_field("roe"), Some("return_on_equity"));
        assert_eq!(resolve_field("mcap"), Some("market_cap"));
        assert_eq!(resolve_field("nonsense_field"), None);
    }

    #[test]
    fn test_normalize_field_name() {
        assert_eq!(normalize_field_name("  PE Ratio "), "pe_ratio");
        assert_eq!(normalize_field_name("Market Cap"), "market_cap");
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("peratio", "peratio"), 0);
        assert_eq!(levenshtein("peration", "peratio"), 1);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
    }

    #[test]
    fn test_suggestions_for_typo() {
        let suggestions = suggest_fields("pe_ration");
        assert!(suggestions.contains(&"pe_ratio".to_string()));
        assert!(suggestions.len() <= 5);
    }

    #[test]
    fn test_no_suggestions_for_distant_name() {
        // Not a substring of anything and > 3 edits from every field.
        let suggestions = suggest_fields("zzqxvwy_unrelated_zz");
        assert!(suggestions.is_empty());
    }

    #[test]
    fn test_operator_set() {
        assert!(is_valid_operator("BETWEEN"));
        assert!(is_valid_operator(">="));
        assert!(!is_valid_operator("~="));
    }
}
