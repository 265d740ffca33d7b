//! Environment-backed configuration
//!
//! Every knob has a working default so the server starts without a .env;
//! missing model keys degrade the extractor to its deterministic tiers.

use crate::extractor::{DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL, DEFAULT_MODEL_PROBABILITY};

#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub groq_api_key: String,
    pub groq_model: String,
    pub market_api_host: String,
    pub market_api_key: String,
    pub model_probability: f64,
    pub cache_ttl_secs: u64,
    pub cache_capacity: usize,
    pub enable_ranking: bool,
}

impl Settings {
    pub fn from_env() -> Self {
        Self {
            port: read_parsed("PORT", 8080),
            gemini_api_key: read("GEMINI_API_KEY", ""),
            gemini_model: read("GEMINI_MODEL", "gemini-2.5-flash"),
            groq_api_key: read("GROQ_API_KEY", ""),
            groq_model: read("GROQ_MODEL", "llama-3.1-8b-instant"),
            market_api_host: read(
                "MARKET_API_HOST",
                "indian-stock-market.p.rapidapi.com",
            ),
            market_api_key: read("MARKET_API_KEY", ""),
            model_probability: read_parsed("MODEL_PROBABILITY", DEFAULT_MODEL_PROBABILITY),
            cache_ttl_secs: read_parsed("CACHE_TTL_SECS", DEFAULT_CACHE_TTL.as_secs()),
            cache_capacity: read_parsed("CACHE_CAPACITY", DEFAULT_CACHE_CAPACITY),
            enable_ranking: read_parsed("ENABLE_RANKING", false),
        }
    }
}

fn read(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn read_parsed<T: std::str::FromStr + Copy>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
