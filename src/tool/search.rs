use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{WeftError, WeftResult};
use crate::types::ToolDefinition;

use super::{Tool, ToolOutput};

/// One hit from the search service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

/// Client for a hosted web search API.
pub struct SearchClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl SearchClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: "https://api.tavily.com".into(),
            api_key: api_key.into(),
        }
    }

    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    pub async fn search(&self, query: &str, max_results: usize) -> WeftResult<Vec<SearchResult>> {
        let body = json!({
            "query": query,
            "max_results": max_results,
        });
        let url = format!("{}/search", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            if status.as_u16() == 429 {
                return Err(WeftError::RateLimited {
                    provider: "search".into(),
                    retry_after_ms: 5000,
                });
            }
            if status.as_u16() == 401 || status.as_u16() == 403 {
                return Err(WeftError::Auth(format!("Search auth failed: {body}")));
            }
            return Err(WeftError::Search(format!(
                "Search API error {status}: {body}"
            )));
        }

        let parsed: SearchResponse = response.json().await?;
        Ok(parsed.results)
    }
}

/// Tool that answers questions about current events via web search.
pub struct WebSearchTool {
    client: SearchClient,
    max_results: usize,
}

impl WebSearchTool {
    pub const DEFAULT_MAX_RESULTS: usize = 2;

    pub fn new(client: SearchClient) -> Self {
        Self {
            client,
            max_results: Self::DEFAULT_MAX_RESULTS,
        }
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results.max(1);
        self
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "web_search".into(),
            description: "Search the web for up-to-date information. Returns the most relevant pages with a snippet of their content.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "What to search for"
                    }
                },
                "required": ["query"]
            }),
        }
    }

    async fn execute(
        &self,
        _call_id: &str,
        arguments: serde_json::Value,
    ) -> WeftResult<ToolOutput> {
        let query = match arguments.get("query").and_then(|v| v.as_str()) {
            Some(q) if !q.trim().is_empty() => q,
            _ => {
                return Ok(ToolOutput::error(
                    "Invalid arguments: expected {\"query\": \"search term\"}",
                ));
            }
        };

        let results = self.client.search(query, self.max_results).await?;

        if results.is_empty() {
            return Ok(ToolOutput::success(format!("No results for \"{query}\"")));
        }

        let metadata = json!({ "result_count": results.len() });
        let content = serde_json::to_string_pretty(&results)?;
        Ok(ToolOutput::success(content).with_metadata(metadata))
    }
}
