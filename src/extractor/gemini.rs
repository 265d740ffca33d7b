//! Gemini backend for the extraction fallback chain
//!
//! Primary tier. Uses a long-lived reqwest::Client for connection pooling.
//! HTTP 429 maps to the distinguished rate-limited error so the chain can
//! move to the next tier.

use crate::error::QueryError;
use crate::extractor::{system_instruction, ModelBackend};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiBackend {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiBackend {
    pub fn new(api_key: String, model: String) -> Self {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            api_key,
            model,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl ModelBackend for GeminiBackend {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn complete(&self, query: &str, max_output_tokens: u32) -> crate::Result<String> {
        if self.api_key.is_empty() {
            return Err(QueryError::Extraction(
                "GEMINI_API_KEY not configured".to_string(),
            ));
        }

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let request = GeminiRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: format!("User Query: \"{}\"\n\nReturn structured JSON:", query),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.1,
                top_p: 0.8,
                max_output_tokens,
            },
            system_instruction: SystemInstruction {
                parts: vec![Part {
                    text: system_instruction(),
                }],
            },
        };

        info!(model = %self.model, "calling Gemini for query extraction");

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Gemini request failed: {}", e);
                QueryError::Extraction(format!("Gemini request failed: {}", e))
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(QueryError::RateLimited("Gemini returned 429".to_string()));
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!(%status, "Gemini error response: {}", error_text);
            return Err(QueryError::Extraction(format!(
                "Gemini API error {}: {}",
                status, error_text
            )));
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            QueryError::MalformedModelOutput(format!("Gemini parse error: {}", e))
        })?;

        let text = gemini_response
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.clone())
            .ok_or_else(|| {
                QueryError::Extraction("No response from Gemini".to_string())
            })?;

        Ok(text)
    }
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
    #[serde(rename = "systemInstruction")]
    system_instruction: SystemInstruction,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "topP")]
    top_p: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let request = GeminiRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: "stocks with pe ratio less than 15".to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.1,
                top_p: 0.8,
                max_output_tokens: 1024,
            },
            system_instruction: SystemInstruction {
                parts: vec![Part {
                    text: system_instruction(),
                }],
            },
        };

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("pe ratio less than 15"));
        assert!(json.contains("maxOutputTokens"));
    }

    #[tokio::test]
    async fn test_missing_key_is_an_extraction_error() {
        let backend = GeminiBackend::new(String::new(), "gemini-2.5-flash".into());
        let err = backend.complete("stocks", 1024).await.unwrap_err();
        assert!(matches!(err, QueryError::Extraction(_)));
    }
}
