//! Web search via Serper or Tavily.
//!
//! The API key comes from the environment. No key, a transport error,
//! or a non-success status all degrade to an error-shaped result value
//! (the original behavior): search quality problems should not burn a
//! task's retry budget.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::warn;

use taskpipe_core::plugin::{StepContext, TaskPlugin};
use taskpipe_core::task::Task;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchProvider {
    Serper,
    Tavily,
}

pub struct WebSearchPlugin {
    client: reqwest::Client,
    provider: SearchProvider,
    api_key: Option<String>,
    serper_url: String,
    tavily_url: String,
}

impl WebSearchPlugin {
    pub fn new(provider: SearchProvider) -> Self {
        let api_key = match provider {
            SearchProvider::Serper => std::env::var("SERPER_API_KEY").ok(),
            SearchProvider::Tavily => std::env::var("TAVILY_API_KEY").ok(),
        };
        Self::with_key(provider, api_key)
    }

    pub fn with_key(provider: SearchProvider, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            provider,
            api_key,
            serper_url: "https://google.serper.dev/search".to_string(),
            tavily_url: "https://api.tavily.com/search".to_string(),
        }
    }

    #[cfg(test)]
    fn with_endpoints(mut self, serper_url: String, tavily_url: String) -> Self {
        self.serper_url = serper_url;
        self.tavily_url = tavily_url;
        self
    }

    async fn search_serper(&self, key: &str, query: &str) -> Value {
        let result = self
            .client
            .post(&self.serper_url)
            .header("X-API-KEY", key)
            .json(&json!({ "q": query }))
            .send()
            .await;
        Self::decode(result, "serper").await
    }

    async fn search_tavily(&self, key: &str, query: &str) -> Value {
        let result = self
            .client
            .post(&self.tavily_url)
            .json(&json!({
                "api_key": key,
                "query": query,
                "search_depth": "advanced",
            }))
            .send()
            .await;
        Self::decode(result, "tavily").await
    }

    async fn decode(result: Result<reqwest::Response, reqwest::Error>, provider: &str) -> Value {
        match result {
            Ok(response) if response.status().is_success() => {
                response.json().await.unwrap_or_else(|e| {
                    warn!(provider, "failed to decode search response: {e}");
                    json!({})
                })
            }
            Ok(response) => {
                warn!(provider, status = response.status().as_u16(), "search request failed");
                json!({})
            }
            Err(e) => {
                warn!(provider, "search error: {e}");
                json!({})
            }
        }
    }
}

#[async_trait]
impl TaskPlugin for WebSearchPlugin {
    fn name(&self) -> &str {
        "web_search"
    }

    async fn execute(&self, task: &Task, _ctx: &StepContext) -> anyhow::Result<Value> {
        let query = task
            .metadata
            .get("search_query")
            .and_then(|v| v.as_str())
            .unwrap_or(&task.content);

        let Some(key) = self.api_key.as_deref() else {
            warn!("no search API key found, returning mock results");
            return Ok(json!({ "results": format!("Mock search results for: {query}") }));
        };

        let value = match self.provider {
            SearchProvider::Serper => self.search_serper(key, query).await,
            SearchProvider::Tavily => self.search_tavily(key, query).await,
        };
        Ok(value)
    }
}
