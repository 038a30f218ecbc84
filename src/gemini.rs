//! Gemini API client
//!
//! Backs the language-model predictor.
//! Uses a long-lived reqwest::Client for connection pooling.

use crate::error::OrchestrationError;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Reusable Gemini client (connection-pooled)
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String, timeout: Duration) -> crate::Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            api_key,
            model,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Generate a JSON-typed reply from Gemini
    pub async fn generate(&self, system_prompt: &str, prompt: &str) -> crate::Result<String> {
        if self.api_key.is_empty() {
            return Err(OrchestrationError::LlmError(
                "GEMINI_API_KEY not configured".to_string(),
            ));
        }

        let url = format!("{}/{}:generateContent?key={}", BASE_URL, self.model, self.api_key);
        let request = build_request(system_prompt, prompt);

        debug!(model = %self.model, "Calling Gemini API");

        let response = self.client.post(&url).json(&request).send().await.map_err(|e| {
            error!("Gemini API request failed: {}", e);
            OrchestrationError::LlmError(format!("Gemini API error: {}", e))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!(%status, "Gemini API error response: {}", error_text);
            return Err(OrchestrationError::LlmError(format!(
                "Gemini API error ({}): {}",
                status, error_text
            )));
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            error!("Failed to parse Gemini response: {}", e);
            OrchestrationError::LlmError(format!("Gemini parse error: {}", e))
        })?;

        first_text(gemini_response)
    }
}

fn build_request(system_prompt: &str, prompt: &str) -> GeminiRequest {
    GeminiRequest {
        contents: vec![Content {
            parts: vec![Part {
                text: prompt.to_string(),
            }],
        }],
        generation_config: GenerationConfig {
            temperature: 0.0,
            top_p: 0.9,
            top_k: 40,
            max_output_tokens: 1024,
            response_mime_type: Some("application/json".to_string()),
        },
        system_instruction: SystemInstruction {
            parts: vec![Part {
                text: system_prompt.to_string(),
            }],
        },
    }
}

fn first_text(response: GeminiResponse) -> crate::Result<String> {
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| OrchestrationError::LlmError("No response from Gemini API".to_string()))?;

    if let Some(reason) = candidate.finish_reason.as_deref() {
        if reason != "STOP" {
            debug!(finish_reason = reason, "Gemini finished early");
        }
    }

    candidate
        .content
        .parts
        .into_iter()
        .next()
        .map(|part| part.text)
        .ok_or_else(|| OrchestrationError::LlmError("Empty response from Gemini".to_string()))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    system_instruction: SystemInstruction,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: i32,
    max_output_tokens: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
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
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Content,
    finish_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let request = build_request("Return JSON only.", "How many orders in 1997?");
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["contents"][0]["parts"][0]["text"], "How many orders in 1997?");
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "Return JSON only.");
        assert_eq!(json["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 1024);
    }

    #[test]
    fn test_response_text_extraction() {
        let raw = r#"{"candidates":[{"content":{"parts":[{"text":"{\"strategy\":\"sql\"}"}]},"finishReason":"STOP"}]}"#;
        let response: GeminiResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(first_text(response).unwrap(), "{\"strategy\":\"sql\"}");

        let empty: GeminiResponse = serde_json::from_str(r#"{"candidates":[]}"#).unwrap();
        assert!(first_text(empty).is_err());
    }

    #[tokio::test]
    async fn test_missing_api_key_is_an_error() {
        let client = GeminiClient::new(String::new(), "gemini-2.0-flash".to_string(), Duration::from_secs(1)).unwrap();
        let result = client.generate("system", "prompt").await;
        assert!(matches!(result, Err(OrchestrationError::LlmError(_))));
    }
}
