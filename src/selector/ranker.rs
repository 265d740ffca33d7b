//! Optional model-assisted ranking of filtered results
//!
//! The ranker sees only compact candidate summaries (index, symbol, and the
//! values behind the active conditions), never whole records. Large sets go
//! to the model in fixed-size batches; a ranking is accepted only above a
//! confidence threshold, otherwise the deterministic sort fallback applies.

use crate::error::QueryError;
use crate::extractor::{recover_json_object, ModelBackend};
use serde::Deserialize;
use tracing::{debug, warn};

pub const RANKING_CONFIDENCE_THRESHOLD: f64 = 0.7;
pub const RANKING_BATCH_SIZE: usize = 50;
const RANKING_MAX_OUTPUT_TOKENS: u32 = 512;

/// One filtered record as seen by the ranker. `index` refers to the
/// caller's filtered set.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RankingCandidate {
    pub index: usize,
    pub symbol: String,
    pub values: serde_json::Map<String, serde_json::Value>,
}

#[async_trait::async_trait]
pub trait ResultRanker: Send + Sync {
    /// Rank candidates for the given intent. `Ok(None)` means no accepted
    /// ranking; the caller falls back to deterministic sorting.
    async fn rank(
        &self,
        intent: &str,
        candidates: &[RankingCandidate],
        limit: usize,
    ) -> crate::Result<Option<Vec<usize>>>;
}

/// Ranker that never ranks; deterministic sorting always applies.
pub struct NoRanker;

#[async_trait::async_trait]
impl ResultRanker for NoRanker {
    async fn rank(
        &self,
        _intent: &str,
        _candidates: &[RankingCandidate],
        _limit: usize,
    ) -> crate::Result<Option<Vec<usize>>> {
        Ok(None)
    }
}

#[derive(Debug, Deserialize)]
struct RankingResponse {
    #[serde(default)]
    indices: Vec<usize>,
    #[serde(default)]
    confidence: f64,
}

/// Model-backed ranker. Batches are ranked in sequence; each batch's
/// survivors feed a final merge when more than one batch was needed.
pub struct ModelRanker {
    backend: Box<dyn ModelBackend>,
}

impl ModelRanker {
    pub fn new(backend: Box<dyn ModelBackend>) -> Self {
        Self { backend }
    }

    async fn rank_one(
        &self,
        intent: &str,
        candidates: &[RankingCandidate],
        limit: usize,
    ) -> crate::Result<RankingResponse> {
        let listing = serde_json::to_string(candidates)?;
        let prompt = format!(
            "Intent: {intent}\nPick the {limit} best-matching stocks from the \
             candidates below and order them best-first.\n\nCandidates:\n{listing}\n\n\
             Respond with ONLY this JSON: {{\"indices\": [..], \"confidence\": 0.0-1.0}} \
             where indices are the candidates' `index` values."
        );

        let raw = self.backend.complete(&prompt, RANKING_MAX_OUTPUT_TOKENS).await?;
        let value = recover_json_object(&raw)?;
        let response: RankingResponse = serde_json::from_value(value)
            .map_err(|e| QueryError::MalformedModelOutput(format!("ranking shape: {}", e)))?;
        Ok(response)
    }
}

#[async_trait::async_trait]
impl ResultRanker for ModelRanker {
    async fn rank(
        &self,
        intent: &str,
        candidates: &[RankingCandidate],
        limit: usize,
    ) -> crate::Result<Option<Vec<usize>>> {
        if candidates.is_empty() {
            return Ok(None);
        }

        let known = |idx: &usize| candidates.iter().any(|c| c.index == *idx);

        // Small sets rank in one call.
        if candidates.len() <= RANKING_BATCH_SIZE {
            let response = self.rank_one(intent, candidates, limit).await?;
            if response.confidence < RANKING_CONFIDENCE_THRESHOLD {
                debug!(
                    confidence = response.confidence,
                    "ranking below confidence threshold, ignoring"
                );
                return Ok(None);
            }
            let mut indices: Vec<usize> = response.indices.into_iter().filter(|i| known(i)).collect();
            indices.dedup();
            indices.truncate(limit);
            return Ok(Some(indices));
        }

        // Batch pass: each batch keeps its best `limit`; survivors merge in a
        // final call. A low-confidence batch discards the whole ranking.
        let mut survivors: Vec<RankingCandidate> = Vec::new();
        for batch in candidates.chunks(RANKING_BATCH_SIZE) {
            let response = self.rank_one(intent, batch, limit).await?;
            if response.confidence < RANKING_CONFIDENCE_THRESHOLD {
                warn!(
                    confidence = response.confidence,
                    "batch ranking below threshold, abandoning model ranking"
                );
                return Ok(None);
            }
            for index in response.indices {
                if let Some(candidate) = batch.iter().find(|c| c.index == index) {
                    survivors.push(candidate.clone());
                }
            }
        }

        if survivors.len() <= limit {
            return Ok(Some(survivors.into_iter().map(|c| c.index).collect()));
        }

        let final_response = self.rank_one(intent, &survivors, limit).await?;
        if final_response.confidence < RANKING_CONFIDENCE_THRESHOLD {
            return Ok(None);
        }
        let mut indices: Vec<usize> = final_response
            .indices
            .into_iter()
            .filter(|i| survivors.iter().any(|c| c.index == *i))
            .collect();
        indices.dedup();
        indices.truncate(limit);
        Ok(Some(indices))
    }
}
