//! Intent extraction: natural-language query → structured query
//!
//! Tiers, in order: primary model → secondary model → deterministic keyword
//! extractor. Results are cached by normalized text and concurrent callers
//! for the same text share one in-flight extraction. A traffic-shaping gate
//! decides whether the model path is taken at all.

use crate::error::QueryError;
use crate::models::{Extraction, ExtractionMode, StructuredQuery};
use crate::schema;
use lazy_static::lazy_static;
use rand::Rng;
use regex::Regex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub mod cache;
pub mod gemini;
pub mod groq;
pub mod keyword;

pub use cache::{Claim, ExtractionCache, InFlightMap};
pub use gemini::GeminiBackend;
pub use groq::GroqBackend;

const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 1024;
const RETRY_MAX_OUTPUT_TOKENS: u32 = 512;
const HYBRID_CONFIDENCE_THRESHOLD: f64 = 0.6;
const DEFAULT_MODEL_CONFIDENCE: f64 = 0.8;

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);
pub const DEFAULT_CACHE_CAPACITY: usize = 100;
pub const DEFAULT_MODEL_PROBABILITY: f64 = 0.9;

/// A model service in the fallback chain. Implementations return the raw
/// response text, which is expected to contain a single JSON object.
#[async_trait::async_trait]
pub trait ModelBackend: Send + Sync {
    fn name(&self) -> &'static str;
    async fn complete(&self, query: &str, max_output_tokens: u32) -> crate::Result<String>;
}

/// Traffic-shaping decision for the model path. Injectable so tests can
/// force either branch deterministically.
pub trait ModelGate: Send + Sync {
    fn permit_model_call(&self) -> bool;
}

/// Weighted coin-flip gate.
pub struct ProbabilityGate {
    probability: f64,
}

impl ProbabilityGate {
    pub fn new(probability: f64) -> Self {
        Self {
            probability: probability.clamp(0.0, 1.0),
        }
    }
}

impl ModelGate for ProbabilityGate {
    fn permit_model_call(&self) -> bool {
        rand::thread_rng().gen_bool(self.probability)
    }
}

pub struct AlwaysModel;

impl ModelGate for AlwaysModel {
    fn permit_model_call(&self) -> bool {
        true
    }
}

pub struct NeverModel;

impl ModelGate for NeverModel {
    fn permit_model_call(&self) -> bool {
        false
    }
}

/// Fixed system instruction sent to every model tier.
pub(crate) fn system_instruction() -> String {
    format!(
        r#"You are a stock market query preprocessor. Convert natural language queries into structured database queries.

**Available Database Fields:**
{}

**Your Task:**
1. Extract the user's intent (filter, search, analyze, compare)
2. Identify relevant database fields
3. Extract comparison operators (>, <, >=, <=, =, BETWEEN)
4. Extract values or ranges
5. Return structured JSON

**Output Format:**
{{
  "intent": "filter|search|analyze|compare",
  "fields": ["field_name"],
  "conditions": [
    {{
      "field": "field_name",
      "operator": ">|<|>=|<=|=|BETWEEN",
      "value": number or [min, max],
      "unit": "%" or "B" or "M" etc
    }}
  ],
  "orderBy": "field_name",
  "limit": number,
  "confidence": 0.0-1.0
}}

Return ONLY valid JSON. No markdown, no explanation."#,
        schema::VALID_FIELDS.join(", ")
    )
}

lazy_static! {
    static ref TRAILING_COMMA_RE: Regex =
        Regex::new(r",\s*([}\]])").expect("trailing comma pattern");
}

/// Recover a JSON object from free-form model output: strip code fences,
/// take the outermost `{...}` span, drop dangling commas, then parse.
pub(crate) fn recover_json_object(raw: &str) -> crate::Result<serde_json::Value> {
    let text = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let start = text.find('{').ok_or_else(|| {
        QueryError::MalformedModelOutput("no JSON object in model output".to_string())
    })?;
    let end = text.rfind('}').filter(|end| *end > start).ok_or_else(|| {
        QueryError::MalformedModelOutput("unterminated JSON object in model output".to_string())
    })?;

    let cleaned = TRAILING_COMMA_RE.replace_all(&text[start..=end], "$1");

    serde_json::from_str(&cleaned)
        .map_err(|e| QueryError::MalformedModelOutput(format!("JSON parse failed: {}", e)))
}

fn parse_structured(raw: &str) -> crate::Result<StructuredQuery> {
    let value = recover_json_object(raw)?;
    serde_json::from_value(value)
        .map_err(|e| QueryError::MalformedModelOutput(format!("unexpected query shape: {}", e)))
}

/// The intent extractor: owns the cache, the in-flight map, the gate, and
/// the ordered backend chain.
pub struct IntentExtractor {
    inner: Arc<ExtractorInner>,
}

struct ExtractorInner {
    backends: Vec<Box<dyn ModelBackend>>,
    gate: Box<dyn ModelGate>,
    cache: ExtractionCache,
    in_flight: InFlightMap,
    external_calls: AtomicU64,
}

impl IntentExtractor {
    pub fn new(
        backends: Vec<Box<dyn ModelBackend>>,
        gate: Box<dyn ModelGate>,
        cache_ttl: Duration,
        cache_capacity: usize,
    ) -> Self {
        Self {
            inner: Arc::new(ExtractorInner {
                backends,
                gate,
                cache: ExtractionCache::new(cache_ttl, cache_capacity),
                in_flight: InFlightMap::new(),
                external_calls: AtomicU64::new(0),
            }),
        }
    }

    /// Number of external model calls made so far.
    pub fn external_calls(&self) -> u64 {
        self.inner.external_calls.load(Ordering::Relaxed)
    }

    /// Extract a structured query for normalized text.
    ///
    /// Never panics and never returns early with a transport error: failures
    /// surface in the outcome's `error` field with `structured_query: None`.
    pub async fn extract(&self, normalized: &str, skip_cache: bool) -> Extraction {
        if !skip_cache {
            if let Some(hit) = self.inner.cache.get(normalized).await {
                debug!(query = normalized, "extraction cache hit");
                return hit;
            }
        }

        match self.inner.in_flight.try_claim(normalized).await {
            Claim::Waiter(rx) => {
                debug!(query = normalized, "awaiting in-flight extraction");
                match cache::await_shared(rx).await {
                    Some(shared) => shared,
                    // Owner task panicked before publishing; degrade to rules.
                    None => self.inner.keyword_outcome(normalized, ExtractionMode::Rules),
                }
            }
            Claim::Owner(slot) => {
                // The extraction runs detached so an abandoned caller cannot
                // strand the claim: the call still completes, populates the
                // cache, releases the key, and publishes to waiters.
                let inner = self.inner.clone();
                let key = normalized.to_string();
                let task = tokio::spawn(async move {
                    let outcome = inner.resolve(&key).await;
                    inner.cache.put(key.clone(), outcome.clone()).await;
                    inner.in_flight.release(&key).await;
                    slot.publish(outcome.clone());
                    outcome
                });
                match task.await {
                    Ok(outcome) => outcome,
                    // Task panic; the waiter path above covers its waiters.
                    Err(_) => self.inner.keyword_outcome(normalized, ExtractionMode::Rules),
                }
            }
        }
    }
}

impl ExtractorInner {
    async fn resolve(&self, normalized: &str) -> Extraction {
        if !self.gate.permit_model_call() {
            debug!("traffic gate skipped the model path");
            return self.keyword_outcome(normalized, ExtractionMode::Rules);
        }

        for backend in &self.backends {
            match self.call_backend(backend.as_ref(), normalized).await {
                Ok(query) => return self.model_outcome(normalized, query),
                Err(e) if e.is_rate_limited() => {
                    warn!(backend = backend.name(), "rate-limited, trying next tier");
                }
                Err(e) => {
                    warn!(backend = backend.name(), error = %e, "backend failed, trying next tier");
                }
            }
        }

        let fallback = keyword::extract(normalized);
        if fallback.signal {
            info!("all model tiers failed; keyword extractor rescued the query");
            return Extraction {
                intent: fallback.query.intent.clone(),
                confidence: keyword::KEYWORD_CONFIDENCE,
                structured_query: Some(fallback.query),
                used_model: false,
                mode: ExtractionMode::Fallback,
                error: None,
            };
        }

        Extraction {
            structured_query: None,
            intent: String::new(),
            confidence: 0.0,
            used_model: false,
            mode: ExtractionMode::Fallback,
            error: Some("all extraction tiers failed for this query".to_string()),
        }
    }

    /// One backend attempt: full budget, then one retry with a smaller
    /// output budget if the response did not contain parseable JSON.
    async fn call_backend(
        &self,
        backend: &dyn ModelBackend,
        normalized: &str,
    ) -> crate::Result<StructuredQuery> {
        self.external_calls.fetch_add(1, Ordering::Relaxed);
        let raw = backend.complete(normalized, DEFAULT_MAX_OUTPUT_TOKENS).await?;

        match parse_structured(&raw) {
            Ok(query) => Ok(query),
            Err(parse_err) => {
                warn!(
                    backend = backend.name(),
                    error = %parse_err,
                    "unparseable model output, retrying with smaller budget"
                );
                self.external_calls.fetch_add(1, Ordering::Relaxed);
                let retry = backend.complete(normalized, RETRY_MAX_OUTPUT_TOKENS).await?;
                parse_structured(&retry)
            }
        }
    }

    fn model_outcome(&self, normalized: &str, query: StructuredQuery) -> Extraction {
        let confidence = query.confidence.unwrap_or(DEFAULT_MODEL_CONFIDENCE);

        if confidence < HYBRID_CONFIDENCE_THRESHOLD {
            info!(
                confidence,
                "low-confidence model output, blending with keyword extraction"
            );
            let blended = blend_with_keyword(query, normalized);
            let blended_confidence = blended.confidence.unwrap_or(confidence);
            return Extraction {
                intent: blended.intent.clone(),
                confidence: blended_confidence,
                structured_query: Some(blended),
                used_model: true,
                mode: ExtractionMode::Hybrid,
                error: None,
            };
        }

        Extraction {
            intent: query.intent.clone(),
            confidence,
            structured_query: Some(query),
            used_model: true,
            mode: ExtractionMode::Model,
            error: None,
        }
    }

    fn keyword_outcome(&self, normalized: &str, mode: ExtractionMode) -> Extraction {
        let extraction = keyword::extract(normalized);
        Extraction {
            intent: extraction.query.intent.clone(),
            confidence: keyword::KEYWORD_CONFIDENCE,
            structured_query: Some(extraction.query),
            used_model: false,
            mode,
            error: None,
        }
    }
}

/// Blend a low-confidence model query with the keyword extraction:
/// fields are unioned, conditions concatenated, confidence averaged.
fn blend_with_keyword(model: StructuredQuery, normalized: &str) -> StructuredQuery {
    let keyword = keyword::extract(normalized).query;
    let mut blended = model;

    for field in keyword.fields {
        if !blended.fields.contains(&field) {
            blended.fields.push(field);
        }
    }
    for condition in keyword.conditions {
        if !blended.conditions.contains(&condition) {
            blended.conditions.push(condition);
        }
    }

    blended.limit = blended.limit.or(keyword.limit);
    blended.order_by = blended.order_by.or(keyword.order_by);
    blended.order_direction = blended.order_direction.or(keyword.order_direction);
    blended.data_source = blended.data_source.or(keyword.data_source);

    let model_confidence = blended.confidence.unwrap_or(DEFAULT_MODEL_CONFIDENCE);
    blended.confidence = Some((model_confidence + keyword::KEYWORD_CONFIDENCE) / 2.0);

    blended
}
