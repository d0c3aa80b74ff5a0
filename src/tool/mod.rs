//! Tools the agent can dispatch to.
//!
//! A tool pairs a JSON-schema definition (what the model sees) with an async
//! `execute` (what runs when the model asks for it). The registry holds the
//! toolbox for one executor; lookup is by name, which must match the
//! definition exactly or the dispatch falls through to an unknown-tool result.

mod retriever;
mod search;

pub use retriever::RetrieverTool;
pub use search::{SearchClient, SearchResult, WebSearchTool};

use async_trait::async_trait;

use crate::error::WeftResult;
use crate::types::ToolDefinition;

/// A capability the model may request by name.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    /// Schema advertised to the model on every call.
    fn definition(&self) -> ToolDefinition;

    /// Run one invocation. `call_id` ties the result back to the request.
    async fn execute(&self, call_id: &str, arguments: serde_json::Value) -> WeftResult<ToolOutput>;
}

/// What a tool invocation produced.
///
/// `is_error` marks results the model should treat as failures; the run
/// itself continues either way. Metadata is for observers, not the model.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub content: String,
    pub is_error: bool,
    pub metadata: serde_json::Value,
}

impl ToolOutput {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// The toolbox one executor dispatches against.
///
/// Registration order is preserved, and with it the order of definitions the
/// model sees. Duplicate names are not rejected; the first registration wins
/// at lookup time.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.iter().map(|t| t.as_ref()).find(|t| t.name() == name)
    }

    /// Definitions for every registered tool, in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
