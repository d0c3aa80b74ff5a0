use async_trait::async_trait;
use serde_json::json;

use crate::error::WeftResult;
use crate::index::Retriever;
use crate::types::ToolDefinition;

use super::{Tool, ToolOutput};

/// Tool that exposes a [`Retriever`] to the agent under a caller-chosen name.
///
/// The name and description tell the model what the indexed corpus contains,
/// so they are part of construction rather than fixed here.
pub struct RetrieverTool {
    retriever: Retriever,
    name: String,
    description: String,
}

impl RetrieverTool {
    pub fn new(
        retriever: Retriever,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            retriever,
            name: name.into(),
            description: description.into(),
        }
    }
}

#[async_trait]
impl Tool for RetrieverTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "What to look up in the indexed documents"
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

        let results = self.retriever.retrieve(query).await?;

        if results.is_empty() {
            return Ok(ToolOutput::success(format!(
                "No matching content for \"{query}\""
            )));
        }

        let sections: Vec<String> = results
            .iter()
            .map(|scored| {
                let source = scored
                    .document
                    .metadata
                    .source
                    .as_deref()
                    .unwrap_or("unknown source");
                format!("--- {source} ---\n{}", scored.document.page_content)
            })
            .collect();

        let metadata = json!({ "count": results.len() });
        Ok(ToolOutput::success(sections.join("\n\n")).with_metadata(metadata))
    }
}
