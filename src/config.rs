//! Environment-variable configuration.
//!
//! Credentials for the completion and search services, endpoint overrides, the
//! default model id, and run-trace enablement all come from the process
//! environment. Nothing here touches the network; clients read the resolved
//! values at construction time.

use std::path::PathBuf;

use crate::error::{WeftError, WeftResult};

/// Default model when `WEFT_MODEL` is unset.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Default directory for JSONL session transcripts.
pub const DEFAULT_HISTORY_DIR: &str = ".weft/history";

/// Resolved configuration snapshot.
#[derive(Debug, Clone)]
pub struct WeftConfig {
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub search_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub anthropic_base_url: Option<String>,
    pub search_base_url: Option<String>,
    pub model: String,
    pub tracing_enabled: bool,
    pub history_dir: PathBuf,
}

impl WeftConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary lookup function.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| get(key).filter(|v| !v.trim().is_empty());

        Self {
            openai_api_key: non_empty("OPENAI_API_KEY"),
            anthropic_api_key: non_empty("ANTHROPIC_API_KEY"),
            search_api_key: non_empty("TAVILY_API_KEY"),
            openai_base_url: non_empty("OPENAI_BASE_URL"),
            anthropic_base_url: non_empty("ANTHROPIC_BASE_URL"),
            search_base_url: non_empty("WEFT_SEARCH_BASE_URL"),
            model: non_empty("WEFT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            tracing_enabled: is_truthy(non_empty("WEFT_TRACING").as_deref()),
            history_dir: non_empty("WEFT_HISTORY_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_HISTORY_DIR)),
        }
    }

    pub fn openai_key(&self) -> WeftResult<&str> {
        self.openai_api_key
            .as_deref()
            .ok_or_else(|| WeftError::Auth("OPENAI_API_KEY not set".into()))
    }

    pub fn anthropic_key(&self) -> WeftResult<&str> {
        self.anthropic_api_key
            .as_deref()
            .ok_or_else(|| WeftError::Auth("ANTHROPIC_API_KEY not set".into()))
    }

    pub fn search_key(&self) -> WeftResult<&str> {
        self.search_api_key
            .as_deref()
            .ok_or_else(|| WeftError::Auth("TAVILY_API_KEY not set".into()))
    }
}

fn is_truthy(value: Option<&str>) -> bool {
    match value {
        Some(v) => {
            let v = v.trim();
            v == "1" || v.eq_ignore_ascii_case("true")
        }
        None => false,
    }
}
