//! Environment configuration
//!
//! All process-wide settings are read once at startup; clients built from
//! them are injected into steps, never re-created per call.

use std::env;

/// Bounded fan-out for research steps: per input item, at most
/// `queries_per_item` searches with `results_per_query` snippets each.
#[derive(Debug, Clone, Copy)]
pub struct ResearchLimits {
    pub queries_per_item: usize,
    pub results_per_query: usize,
}

impl Default for ResearchLimits {
    fn default() -> Self {
        Self {
            queries_per_item: 3,
            results_per_query: 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Missing key → binaries fall back to the mock model.
    pub gemini_api_key: Option<String>,
    /// Missing key → binaries fall back to mock search.
    pub tavily_api_key: Option<String>,
    pub research: ResearchLimits,
    pub port: u16,
}

impl AgentConfig {
    /// Read configuration from the environment (after dotenv has run).
    pub fn from_env() -> Self {
        let defaults = ResearchLimits::default();

        Self {
            gemini_api_key: non_empty(env::var("GEMINI_API_KEY").ok()),
            tavily_api_key: non_empty(env::var("TAVILY_API_KEY").ok()),
            research: ResearchLimits {
                queries_per_item: parse_or(
                    "RESEARCH_QUERIES_PER_ITEM",
                    defaults.queries_per_item,
                ),
                results_per_query: parse_or(
                    "RESEARCH_RESULTS_PER_QUERY",
                    defaults.results_per_query,
                ),
            },
            port: parse_or("PORT", 8080),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
