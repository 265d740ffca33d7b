//! Deterministic query text cleanup and mistake correction
//!
//! `normalize` is total: it never fails and normalizing an already
//! normalized string is a fixed point. Corrections that extend a word into
//! a phrase ("find" → "find me") merge with text that already contains the
//! extension instead of duplicating it.

use lazy_static::lazy_static;
use regex::Regex;

/// Common user mistakes and their corrections, matched whole-word.
const COMMON_MISTAKES: &[(&str, &str)] = &[
    // Spelling mistakes
    ("stoks", "stocks"),
    ("stok", "stock"),
    ("companys", "companies"),
    ("compnay", "company"),
    ("companie", "company"),
    ("divident", "dividend"),
    ("dividand", "dividend"),
    ("proft", "profit"),
    ("proffit", "profit"),
    ("revanue", "revenue"),
    ("revenu", "revenue"),
    ("merket", "market"),
    ("markrt", "market"),
    ("capitel", "capital"),
    ("capitol", "capital"),
    ("debit", "debt"),
    ("equty", "equity"),
    ("eqity", "equity"),
    ("rateo", "ratio"),
    ("rasio", "ratio"),
    ("ratoi", "ratio"),
    ("groth", "growth"),
    ("growht", "growth"),
    ("hoding", "holding"),
    ("holdng", "holding"),
    ("promotr", "promoter"),
    ("promter", "promoter"),
    ("institional", "institutional"),
    ("instituional", "institutional"),
    ("margn", "margin"),
    ("margen", "margin"),
    ("ebita", "ebitda"),
    // Field name variants
    ("p/e ratio", "pe ratio"),
    ("p e ratio", "pe ratio"),
    ("pe ratoi", "pe ratio"),
    ("p/b ratio", "pb ratio"),
    ("p b ratio", "pb ratio"),
    ("roe ratio", "roe"),
    ("roa ratio", "roa"),
    ("market capitalisation", "market cap"),
    ("marketcap", "market cap"),
    ("mkt cap", "market cap"),
    ("div yield", "dividend yield"),
    ("dividend yld", "dividend yield"),
    ("debt equity", "debt to equity"),
    ("d/e ratio", "debt to equity ratio"),
    ("promoter hold", "promoter holding"),
    ("institutional hold", "institutional holding"),
    // Phrase variants
    ("show", "show me"),
    ("find", "find me"),
    ("get", "get me"),
    ("list", "show me"),
    ("display", "show me"),
    ("give", "show me"),
    ("want", "show me"),
    ("need", "show me"),
    // Comparison words
    ("less then", "less than"),
    ("lesser than", "less than"),
    ("more then", "more than"),
    ("greater then", "greater than"),
    ("greter than", "greater than"),
    ("above then", "above"),
    ("below then", "below"),
    ("under then", "under"),
    // Unit words
    ("cr", "crores"),
    ("cr.", "crores"),
    ("crore", "crores"),
    ("lakh", "lakhs"),
];

/// Abbreviations expanded when standalone (never at position 0, where the
/// query is usually the abbreviation itself).
const ABBREVIATIONS: &[(&str, &str)] = &[
    ("pe", "pe ratio"),
    ("pb", "pb ratio"),
    ("roe", "return on equity"),
    ("roa", "return on assets"),
    ("eps", "earnings per share"),
    ("mcap", "market cap"),
    ("div", "dividend"),
    ("yoy", "year over year"),
    ("qoq", "quarter over quarter"),
];

const WORD_NUMBERS: &[(&str, u32)] = &[
    ("one", 1),
    ("two", 2),
    ("three", 3),
    ("four", 4),
    ("five", 5),
    ("six", 6),
    ("seven", 7),
    ("eight", 8),
    ("nine", 9),
    ("ten", 10),
    ("eleven", 11),
    ("twelve", 12),
    ("thirteen", 13),
    ("fourteen", 14),
    ("fifteen", 15),
    ("sixteen", 16),
    ("seventeen", 17),
    ("eighteen", 18),
    ("nineteen", 19),
    ("twenty", 20),
    ("thirty", 30),
    ("forty", 40),
    ("fifty", 50),
    ("sixty", 60),
    ("seventy", 70),
    ("eighty", 80),
    ("ninety", 90),
    ("hundred", 100),
];

lazy_static! {
    static ref MAGNITUDE_RE: Regex =
        Regex::new(r"\b(\d+)\s*(k|m|b|thousand|million|billion)\b").expect("magnitude pattern");
    static ref LIMIT_RE: Regex =
        Regex::new(r"\btop\s+(\d+|[a-z]+)\b|\b(\d+|[a-z]+)\s+stocks?\b").expect("limit pattern");
    /// Widest correction window, derived from the table so multi-word keys
    /// can never silently fall out of reach.
    static ref MAX_PHRASE_WORDS: usize = COMMON_MISTAKES
        .iter()
        .map(|(mistake, _)| mistake.split_whitespace().count())
        .max()
        .unwrap_or(1);
}

const EDGE_PUNCTUATION: &[char] = &['.', ',', '!', '?', ';', ':'];

/// Normalize a raw user query. Deterministic and total.
pub fn normalize(text: &str) -> String {
    let mut cleaned = text.trim().to_lowercase();

    cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    cleaned = cleaned
        .trim_matches(|c: char| EDGE_PUNCTUATION.contains(&c))
        .trim()
        .to_string();

    cleaned = apply_mistake_table(&cleaned);
    cleaned = expand_abbreviations(&cleaned);
    cleaned = canonicalize_operators(&cleaned);
    cleaned = expand_magnitudes(&cleaned);

    cleaned
}

/// Infer a result limit from "top N" / "N stocks" phrasing, accepting digits
/// or spelled-out numbers one..hundred.
pub fn infer_limit(text: &str) -> Option<u32> {
    let normalized = text.to_lowercase();
    let captures = LIMIT_RE.captures(&normalized)?;

    let raw = captures
        .get(1)
        .or_else(|| captures.get(2))
        .map(|m| m.as_str())?;

    if let Ok(value) = raw.parse::<u32>() {
        return (value > 0).then_some(value);
    }

    WORD_NUMBERS
        .iter()
        .find(|(word, _)| *word == raw)
        .map(|(_, value)| *value)
}

fn strip_token(token: &str) -> (&str, &str) {
    let trimmed = token.trim_end_matches(|c: char| EDGE_PUNCTUATION.contains(&c));
    (trimmed, &token[trimmed.len()..])
}

/// Whole-word phrase replacement over the mistake table, longest match first.
fn apply_mistake_table(text: &str) -> String {
    rewrite_tokens(text, |tokens, i| {
        for span in (1..=(*MAX_PHRASE_WORDS).min(tokens.len() - i)).rev() {
            let window = &tokens[i..i + span];
            let (last_clean, trailing) = strip_token(window[span - 1]);
            let mut candidate = window[..span - 1].join(" ");
            if !candidate.is_empty() {
                candidate.push(' ');
            }
            candidate.push_str(last_clean);

            if let Some((_, correction)) =
                COMMON_MISTAKES.iter().find(|(k, _)| *k == candidate)
            {
                return Some(Replacement {
                    consumed: span,
                    output: correction,
                    trailing,
                });
            }
        }
        None
    })
}

/// Expand standalone abbreviations, skipping position 0.
fn expand_abbreviations(text: &str) -> String {
    rewrite_tokens(text, |tokens, i| {
        if i == 0 {
            return None;
        }
        let (clean, trailing) = strip_token(tokens[i]);
        ABBREVIATIONS
            .iter()
            .find(|(k, _)| *k == clean)
            .map(|(_, expansion)| Replacement {
                consumed: 1,
                output: expansion,
                trailing,
            })
    })
}

struct Replacement<'a> {
    consumed: usize,
    output: &'a str,
    trailing: &'a str,
}

/// Token-scanning rewriter. After a replacement, input tokens that already
/// spell out the tail of the replacement are merged rather than duplicated,
/// which keeps every rewrite a fixed point.
fn rewrite_tokens<'a, F>(text: &'a str, matcher: F) -> String
where
    F: Fn(&[&'a str], usize) -> Option<Replacement<'a>>,
{
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let mut out: Vec<String> = Vec::with_capacity(tokens.len());
    let mut i = 0;

    while i < tokens.len() {
        match matcher(&tokens, i) {
            Some(replacement) => {
                let correction: Vec<&str> = replacement.output.split_whitespace().collect();
                let mut next = i + replacement.consumed;

                // Merge a duplicated tail: "find me" after "find" → consume "me".
                for split in 1..correction.len() {
                    let tail = &correction[split..];
                    let upcoming: Vec<&str> = tokens
                        .iter()
                        .skip(next)
                        .take(tail.len())
                        .map(|t| strip_token(t).0)
                        .collect();
                    if upcoming == *tail {
                        next += tail.len();
                        break;
                    }
                }

                let mut emitted = correction.join(" ");
                emitted.push_str(replacement.trailing);
                out.push(emitted);
                i = next;
            }
            None => {
                out.push(tokens[i].to_string());
                i += 1;
            }
        }
    }

    out.join(" ")
}

/// Rewrite comparison punctuation to words. Compound operators first.
fn canonicalize_operators(text: &str) -> String {
    let replaced = text
        .replace("<=", " less than or equal ")
        .replace(">=", " greater than or equal ")
        .replace('<', " less than ")
        .replace('>', " greater than ")
        .replace('=', " equals ");

    replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Convert shorthand magnitudes: 10k → 10000, 5m → 5000000, 2b → 2000000000.
fn expand_magnitudes(text: &str) -> String {
    MAGNITUDE_RE
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let zeros = match &caps[2] {
                "k" | "thousand" => "000",
                "m" | "million" => "000000",
                _ => "000000000",
            };
            format!("{}{}", &caps[1], zeros)
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_misspelling_correction() {
        let normalized = normalize("stoks with pe ratoi less then 15");
        assert!(normalized.contains("stocks"));
        assert!(normalized.contains("pe ratio"));
        assert!(normalized.contains("less than 15"));
        assert!(!normalized.contains("stoks"));
        assert!(!normalized.contains("ratoi"));
        assert!(!normalized.contains("less then"));
    }

    #[test]
    fn test_three_word_field_variant_corrected() {
        let normalized = normalize("stocks with p e ratio less than 15");
        assert!(normalized.contains("pe ratio"));
        assert!(!normalized.contains("p e ratio"));
        assert_eq!(normalize(&normalized), normalized);

        let normalized = normalize("companies with p b ratio below 3");
        assert!(normalized.contains("pb ratio"));
    }

    #[test]
    fn test_idempotence() {
        let queries = [
            "stoks with pe ratoi less then 15",
            "find stocks with div yield > 3%",
            "Show me top 10 companys by merket cap over 10k crores",
            "stocks under 5m volume",
            "  list   midcap   stocks!! ",
        ];

        for query in queries {
            let once = normalize(query);
            let twice = normalize(&once);
            assert_eq!(once, twice, "not a fixed point for {:?}", query);
        }
    }

    #[test]
    fn test_operator_canonicalization() {
        // "pe" is at position 0, so the abbreviation stays.
        assert_eq!(normalize("pe<=15"), "pe less than or equal 15");
        assert_eq!(normalize("price < 500"), "price less than 500");
        assert_eq!(normalize("beta = 1"), "beta equals 1");
    }

    #[test]
    fn test_magnitude_expansion() {
        assert_eq!(normalize("volume above 10k"), "volume above 10000");
        assert_eq!(normalize("market cap over 2b"), "market cap over 2000000000");
        assert_eq!(normalize("revenue above 5 million"), "revenue above 5000000");
    }

    #[test]
    fn test_abbreviation_not_expanded_at_start() {
        // Position 0 is left alone; mid-query standalone abbreviations expand.
        let normalized = normalize("roe above 15");
        assert!(normalized.starts_with("roe"));

        let mid = normalize("stocks with roe above 15");
        assert!(mid.contains("return on equity"));
    }

    #[test]
    fn test_phrase_merge_does_not_duplicate() {
        assert_eq!(normalize("find me stocks"), "find me stocks");
        assert_eq!(normalize("find stocks"), "find me stocks");
        assert_eq!(normalize("show me pe ratio"), "show me pe ratio");
    }

    #[test]
    fn test_infer_limit() {
        assert_eq!(infer_limit("top 10 stocks by volume"), Some(10));
        assert_eq!(infer_limit("show me 25 stocks"), Some(25));
        assert_eq!(infer_limit("top five gainers"), Some(5));
        assert_eq!(infer_limit("twenty stocks in loss"), Some(20));
        assert_eq!(infer_limit("stocks with high pe"), None);
    }

    #[test]
    fn test_whitespace_and_punctuation() {
        assert_eq!(normalize("  Stocks   in  LOSS!!  "), "stocks in loss");
    }
}
