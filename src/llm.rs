//! Language model client
//!
//! Steps that need text generation or query generation go through the
//! [`LanguageModel`] trait. `GeminiModel` is the production implementation;
//! `MockModel` keeps the pipeline functional without an API key.
//! Uses a long-lived reqwest::Client for connection pooling.

use crate::error::AgentError;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

const GEMINI_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent";

/// Capability every LLM-backed step depends on.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// One completion: system instruction + user content → text.
    async fn complete(&self, system: &str, user: &str) -> Result<String>;

    /// Generate up to `limit` search queries for the given input.
    async fn queries(&self, system: &str, user: &str, limit: usize) -> Result<Vec<String>>;
}

/// Reusable Gemini client (connection-pooled)
pub struct GeminiModel {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiModel {
    pub fn new(api_key: String) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            api_key,
            base_url: GEMINI_URL.to_string(),
        })
    }

    async fn generate(&self, request: &GeminiRequest) -> Result<String> {
        if self.api_key.is_empty() {
            return Err(AgentError::Llm("GEMINI_API_KEY not configured".to_string()));
        }

        let url = format!("{}?key={}", self.base_url, self.api_key);

        let response = self.client.post(&url).json(request).send().await.map_err(|e| {
            error!("Gemini API request failed: {}", e);
            AgentError::Llm(format!("Gemini API error: {}", e))
        })?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Gemini API error response: {}", error_text);
            return Err(AgentError::Llm(format!("Gemini API error: {}", error_text)));
        }

        let body: GeminiResponse = response.json().await.map_err(|e| {
            error!("Failed to parse Gemini response: {}", e);
            AgentError::Llm(format!("Gemini parse error: {}", e))
        })?;

        let text = body
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.clone())
            .ok_or_else(|| AgentError::Llm("Empty response from Gemini".to_string()))?;

        info!(chars = text.len(), "Gemini response received");
        Ok(text)
    }
}

#[async_trait]
impl LanguageModel for GeminiModel {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let request = GeminiRequest::text(system, user);
        self.generate(&request).await
    }

    async fn queries(&self, system: &str, user: &str, limit: usize) -> Result<Vec<String>> {
        let request = GeminiRequest::json(system, user);
        let text = self.generate(&request).await?;
        parse_queries(&text, limit)
    }
}

/// Parse a query list out of a JSON-mode response. Accepts a bare array
/// or an object with a "queries" array, and caps the list at `limit`.
fn parse_queries(text: &str, limit: usize) -> Result<Vec<String>> {
    let value: serde_json::Value = serde_json::from_str(text.trim())
        .map_err(|e| AgentError::Llm(format!("Query list is not valid JSON: {}", e)))?;

    let items = match &value {
        serde_json::Value::Array(items) => items.as_slice(),
        serde_json::Value::Object(map) => map
            .get("queries")
            .and_then(|q| q.as_array())
            .map(|a| a.as_slice())
            .unwrap_or(&[]),
        _ => &[],
    };

    let queries: Vec<String> = items
        .iter()
        .filter_map(|v| v.as_str())
        .map(|s| s.to_string())
        .take(limit)
        .collect();

    if queries.is_empty() {
        return Err(AgentError::Llm(format!(
            "No queries in LLM output: {}",
            text.chars().take(120).collect::<String>()
        )));
    }
    Ok(queries)
}

/// Mock model for development & testing.
/// Keeps the pipeline functional without an LLM dependency.
pub struct MockModel;

#[async_trait]
impl LanguageModel for MockModel {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let instruction = system.lines().next().unwrap_or("response");
        let topic: String = user.lines().next().unwrap_or("").chars().take(80).collect();
        Ok(format!("[mock] {} | {}", instruction, topic))
    }

    async fn queries(&self, _system: &str, user: &str, limit: usize) -> Result<Vec<String>> {
        let subject = user.trim();
        Ok((1..=limit)
            .map(|i| format!("{} financial performance {}", subject, i))
            .collect())
    }
}

//
// ================= Wire types =================
//

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    system_instruction: SystemInstruction,
}

impl GeminiRequest {
    fn text(system: &str, user: &str) -> Self {
        Self::build(system, user, None)
    }

    /// JSON response mode, used for structured query generation.
    fn json(system: &str, user: &str) -> Self {
        Self::build(system, user, Some("application/json".to_string()))
    }

    fn build(system: &str, user: &str, response_mime_type: Option<String>) -> Self {
        Self {
            contents: vec![Content {
                parts: vec![Part {
                    text: user.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.3,
                top_p: 0.9,
                top_k: 40,
                max_output_tokens: 2048,
                response_mime_type,
            },
            system_instruction: SystemInstruction {
                parts: vec![Part {
                    text: system.to_string(),
                }],
            },
        }
    }
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
struct Candidate {
    content: Content,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serialization() {
        let request = GeminiRequest::text("You are a financial analyst", "Summarize Q3 revenue");
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("Summarize Q3 revenue"));
        assert!(json.contains("systemInstruction"));
        assert!(!json.contains("responseMimeType"));

        let json_mode = serde_json::to_string(&GeminiRequest::json("sys", "user")).unwrap();
        assert!(json_mode.contains("responseMimeType"));
    }

    #[test]
    fn parse_queries_accepts_both_shapes() {
        let bare = parse_queries(r#"["q1", "q2", "q3"]"#, 2).unwrap();
        assert_eq!(bare, vec!["q1", "q2"]);

        let wrapped = parse_queries(r#"{"queries": ["a", "b"]}"#, 5).unwrap();
        assert_eq!(wrapped, vec!["a", "b"]);

        assert!(parse_queries("not json", 2).is_err());
        assert!(parse_queries(r#"{"other": []}"#, 2).is_err());
    }

    #[tokio::test]
    async fn mock_model_respects_query_limit() {
        let model = MockModel;
        let queries = model.queries("sys", "Acme Corp", 3).await.unwrap();
        assert_eq!(queries.len(), 3);
        assert!(queries[0].contains("Acme Corp"));
    }
}
