use std::collections::HashMap;
use std::sync::Arc;

use crate::config::WeftConfig;
use crate::error::{WeftError, WeftResult};
use crate::types::ProviderKind;

use super::anthropic::AnthropicChatModel;
use super::openai::OpenAIChatModel;
use super::traits::ChatModel;

/// Registry of configured chat model clients, keyed by API dialect.
pub struct ModelRegistry {
    clients: HashMap<ProviderKind, Arc<dyn ChatModel>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self {
            clients: HashMap::new(),
        }
    }

    /// Build a registry from whatever API keys the config carries.
    pub fn from_config(config: &WeftConfig) -> Self {
        let mut registry = Self::new();
        if let Some(key) = &config.openai_api_key {
            let client = match &config.openai_base_url {
                Some(base) => OpenAIChatModel::with_base_url(key, base),
                None => OpenAIChatModel::new(key),
            };
            registry.register(Arc::new(client));
        }
        if let Some(key) = &config.anthropic_api_key {
            let client = match &config.anthropic_base_url {
                Some(base) => AnthropicChatModel::with_base_url(key, base),
                None => AnthropicChatModel::new(key),
            };
            registry.register(Arc::new(client));
        }
        registry
    }

    pub fn register(&mut self, client: Arc<dyn ChatModel>) {
        self.clients.insert(client.kind(), client);
    }

    pub fn get(&self, kind: &ProviderKind) -> Option<Arc<dyn ChatModel>> {
        self.clients.get(kind).cloned()
    }

    pub fn has(&self, kind: &ProviderKind) -> bool {
        self.clients.contains_key(kind)
    }

    pub fn kinds(&self) -> Vec<ProviderKind> {
        self.clients.keys().cloned().collect()
    }

    /// Resolve the client that serves a given model id.
    pub fn for_model(&self, model_id: &str) -> WeftResult<Arc<dyn ChatModel>> {
        let kind = kind_for_model(model_id).ok_or_else(|| WeftError::NoProviderForModel {
            model: model_id.to_string(),
        })?;
        self.get(&kind).ok_or_else(|| WeftError::NoProviderForModel {
            model: model_id.to_string(),
        })
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Map a model id to the API dialect that serves it.
pub fn kind_for_model(model_id: &str) -> Option<ProviderKind> {
    const OPENAI_PREFIXES: &[&str] = &["gpt-", "chatgpt-", "o1", "o3", "o4"];
    if OPENAI_PREFIXES.iter().any(|p| model_id.starts_with(p)) {
        return Some(ProviderKind::OpenAI);
    }
    if model_id.starts_with("claude") {
        return Some(ProviderKind::Anthropic);
    }
    None
}
