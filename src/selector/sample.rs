//! Bundled offline sample for the degraded loss-screen path
//!
//! When the data provider is unreachable and the query is a loss screen
//! (an EPS-below-zero condition), this small static set substitutes for a
//! live fetch so the caller still gets an illustrative answer.

use crate::models::StockRecord;

pub const OFFLINE_SAMPLE_SOURCE: &str = "offline_sample";

const LOSS_SAMPLE_JSON: &str = r#"[
  {"symbol": "SUZLON", "companyName": "Suzlon Energy", "lastPrice": 18.45, "pChange": -4.2, "eps": -1.32, "volume": 48210034},
  {"symbol": "YESBANK", "companyName": "Yes Bank", "lastPrice": 16.20, "pChange": -2.8, "eps": -3.10, "volume": 90211450},
  {"symbol": "IDEA", "companyName": "Vodafone Idea", "lastPrice": 7.85, "pChange": -3.5, "eps": -8.64, "volume": 210443801},
  {"symbol": "RPOWER", "companyName": "Reliance Power", "lastPrice": 12.30, "pChange": -5.1, "eps": -2.05, "volume": 33120458},
  {"symbol": "JPPOWER", "companyName": "Jaiprakash Power", "lastPrice": 6.10, "pChange": -1.9, "eps": -0.45, "volume": 27584412},
  {"symbol": "GTLINFRA", "companyName": "GTL Infrastructure", "lastPrice": 1.15, "pChange": -6.3, "eps": -0.92, "volume": 19985520},
  {"symbol": "SPICEJET", "companyName": "SpiceJet", "lastPrice": 41.70, "pChange": -2.2, "eps": -12.80, "volume": 8804512},
  {"symbol": "INOXWIND", "companyName": "Inox Wind", "lastPrice": 34.25, "pChange": -1.4, "eps": -4.51, "volume": 5120489}
]"#;

/// Parse the bundled sample. The literal is fixed at compile time, so a
/// parse failure is a programming error surfaced in tests.
pub fn loss_sample() -> Vec<StockRecord> {
    serde_json::from_str(LOSS_SAMPLE_JSON).unwrap_or_default()
}
