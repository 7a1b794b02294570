//! Web search client
//!
//! Research steps go through the [`SearchProvider`] trait. `TavilySearch`
//! calls the Tavily REST API; `MockSearch` returns canned snippets so the
//! pipeline runs offline.

use crate::error::AgentError;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

const TAVILY_URL: &str = "https://api.tavily.com/search";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub content: String,
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Run one query, returning at most `max_results` snippets.
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>>;
}

pub struct TavilySearch {
    client: Client,
    api_key: String,
    base_url: String,
}

impl TavilySearch {
    pub fn new(api_key: String) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            api_key,
            base_url: TAVILY_URL.to_string(),
        })
    }
}

#[async_trait]
impl SearchProvider for TavilySearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        if self.api_key.is_empty() {
            return Err(AgentError::Search(
                "TAVILY_API_KEY not configured".to_string(),
            ));
        }

        let request = TavilyRequest {
            api_key: &self.api_key,
            query,
            max_results,
            search_depth: "basic",
        };

        let response = self
            .client
            .post(&self.base_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| AgentError::Search(format!("Tavily request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, "Tavily returned an error");
            return Err(AgentError::Search(format!(
                "Tavily returned {}: {}",
                status, body
            )));
        }

        let body: TavilyResponse = response
            .json()
            .await
            .map_err(|e| AgentError::Search(format!("Invalid Tavily response: {}", e)))?;

        let results: Vec<SearchResult> = body
            .results
            .into_iter()
            .take(max_results)
            .map(|r| SearchResult {
                title: r.title,
                url: r.url,
                content: r.content,
            })
            .collect();

        info!(query, count = results.len(), "Search completed");
        Ok(results)
    }
}

/// Mock search for development & testing.
pub struct MockSearch;

#[async_trait]
impl SearchProvider for MockSearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        Ok((1..=max_results)
            .map(|i| SearchResult {
                title: format!("Result {} for {}", i, query),
                url: format!("https://example.com/{}", i),
                content: format!("[mock snippet {}] {}", i, query),
            })
            .collect())
    }
}

//
// ================= Wire types =================
//

#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: usize,
    search_depth: &'a str,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_deserialization() {
        let raw = r#"{
            "results": [
                {"title": "Q3 earnings", "url": "https://x.test/a", "content": "Revenue grew 12%"},
                {"title": "Outlook", "url": "https://x.test/b", "content": "Guidance raised"}
            ],
            "response_time": 0.4
        }"#;

        let parsed: TavilyResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.results.len(), 2);
        assert_eq!(parsed.results[0].content, "Revenue grew 12%");
    }

    #[tokio::test]
    async fn mock_search_respects_result_cap() {
        let results = MockSearch.search("Acme revenue", 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].content.contains("Acme revenue"));
    }
}
