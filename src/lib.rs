//! Stock Query Engine
//!
//! Turns natural-language stock market questions into validated, executed
//! data queries:
//! - Normalizes free text (misspellings, abbreviations, operator words)
//! - Extracts a structured query via a model fallback chain with caching
//!   and in-flight deduplication
//! - Applies deterministic rule-based overrides
//! - Validates fields against a schema registry with fuzzy suggestions
//! - Selects, filters, ranks, and sorts records from a tiered data provider
//!
//! PIPELINE:
//! RAW QUERY → NORMALIZE → EXTRACT → OVERRIDE → VALIDATE → SELECT → RESULT

pub mod api;
pub mod config;
pub mod error;
pub mod extractor;
pub mod models;
pub mod normalizer;
pub mod overrides;
pub mod pipeline;
pub mod schema;
pub mod selector;
pub mod validator;

pub use error::{ErrorStage, QueryError, Result};
pub use extractor::IntentExtractor;
pub use pipeline::QueryPipeline;

// Re-export common types
pub use models::*;
