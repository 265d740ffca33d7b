//! Groq backend (OpenAI chat-completions contract)
//!
//! Secondary tier of the extraction fallback chain, used when the primary
//! model is rate-limited or unreachable.

use crate::error::QueryError;
use crate::extractor::{system_instruction, ModelBackend};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";

pub struct GroqBackend {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GroqBackend {
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
impl ModelBackend for GroqBackend {
    fn name(&self) -> &'static str {
        "groq"
    }

    async fn complete(&self, query: &str, max_output_tokens: u32) -> crate::Result<String> {
        if self.api_key.is_empty() {
            return Err(QueryError::Extraction(
                "GROQ_API_KEY not configured".to_string(),
            ));
        }

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system_instruction(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: format!("User Query: \"{}\"\n\nReturn structured JSON:", query),
                },
            ],
            temperature: 0.1,
            max_tokens: max_output_tokens,
        };

        info!(model = %self.model, "calling Groq for query extraction");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Groq request failed: {}", e);
                QueryError::Extraction(format!("Groq request failed: {}", e))
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(QueryError::RateLimited("Groq returned 429".to_string()));
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!(%status, "Groq error response: {}", error_text);
            return Err(QueryError::Extraction(format!(
                "Groq API error {}: {}",
                status, error_text
            )));
        }

        let chat_response: ChatResponse = response.json().await.map_err(|e| {
            QueryError::MalformedModelOutput(format!("Groq parse error: {}", e))
        })?;

        chat_response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| QueryError::Extraction("No response from Groq".to_string()))
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_key_is_an_extraction_error() {
        let backend = GroqBackend::new(String::new(), "mixtral-8x7b-32768".into());
        let err = backend.complete("stocks", 1024).await.unwrap_err();
        assert!(matches!(err, QueryError::Extraction(_)));
    }

    #[test]
    fn test_chat_response_parsing() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":"{\"intent\":\"filter\"}"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.choices[0].message.content, "{\"intent\":\"filter\"}");
    }
}
