use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::WeftResult;
use crate::types::*;

/// A single chat completion call: conversation messages, system text,
/// tool definitions offered to the model, and sampling parameters.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub system: String,
    pub tools: Vec<ToolDefinition>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            system: String::new(),
            tools: Vec::new(),
            max_tokens: None,
            temperature: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = system.into();
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Chat model client, abstracting the wire dialect of a completion API
#[async_trait::async_trait]
pub trait ChatModel: Send + Sync {
    /// Which API dialect this client speaks
    fn kind(&self) -> ProviderKind;

    /// Stream a completion, sending deltas through the channel as they arrive
    async fn stream(
        &self,
        request: &ChatRequest,
        delta_tx: mpsc::UnboundedSender<StreamDelta>,
    ) -> WeftResult<Message>;

    /// Non-streaming completion (convenience, default impl collects stream)
    async fn invoke(&self, request: &ChatRequest) -> WeftResult<Message> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let result = self.stream(request, tx).await?;
        // Drain any remaining deltas
        while rx.try_recv().is_ok() {}
        Ok(result)
    }
}

/// A chat model with a fixed set of tool definitions attached to every call.
///
/// Binding replaces whatever tools the individual request carried, so the
/// model always sees the same toolbox regardless of who built the request.
#[derive(Clone)]
pub struct BoundChatModel {
    model: Arc<dyn ChatModel>,
    tools: Vec<ToolDefinition>,
}

impl BoundChatModel {
    pub fn new(model: Arc<dyn ChatModel>, tools: Vec<ToolDefinition>) -> Self {
        Self { model, tools }
    }

    pub fn kind(&self) -> ProviderKind {
        self.model.kind()
    }

    pub fn tools(&self) -> &[ToolDefinition] {
        &self.tools
    }

    pub async fn invoke(&self, request: ChatRequest) -> WeftResult<Message> {
        let request = request.with_tools(self.tools.clone());
        self.model.invoke(&request).await
    }

    pub async fn stream(
        &self,
        request: ChatRequest,
        delta_tx: mpsc::UnboundedSender<StreamDelta>,
    ) -> WeftResult<Message> {
        let request = request.with_tools(self.tools.clone());
        self.model.stream(&request, delta_tx).await
    }
}

/// Attach tool definitions to a model client
pub fn bind_tools(model: Arc<dyn ChatModel>, tools: Vec<ToolDefinition>) -> BoundChatModel {
    BoundChatModel::new(model, tools)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_builder_defaults() {
        let request = ChatRequest::new("gpt-4o-mini", vec![Message::user("hi")]);
        assert_eq!(request.model, "gpt-4o-mini");
        assert_eq!(request.messages.len(), 1);
        assert!(request.system.is_empty());
        assert!(request.tools.is_empty());
        assert!(request.max_tokens.is_none());
        assert!(request.temperature.is_none());
    }

    #[test]
    fn request_builder_chains() {
        let request = ChatRequest::new("gpt-4o", vec![])
            .with_system("You are terse.")
            .with_max_tokens(512)
            .with_temperature(0.2);
        assert_eq!(request.system, "You are terse.");
        assert_eq!(request.max_tokens, Some(512));
        assert_eq!(request.temperature, Some(0.2));
    }

    // Trait object safety check
    #[test]
    fn chat_model_is_object_safe() {
        fn _assert_object_safe(_: &dyn ChatModel) {}
    }

    struct ToolCountingModel;

    #[async_trait::async_trait]
    impl ChatModel for ToolCountingModel {
        fn kind(&self) -> ProviderKind {
            ProviderKind::Custom("test".into())
        }

        async fn stream(
            &self,
            request: &ChatRequest,
            delta_tx: mpsc::UnboundedSender<StreamDelta>,
        ) -> WeftResult<Message> {
            let text = format!("saw {} tools", request.tools.len());
            let _ = delta_tx.send(StreamDelta::TextDelta { text: text.clone() });
            Ok(Message::assistant(text))
        }
    }

    #[tokio::test]
    async fn bound_model_injects_its_tools() {
        let defs = vec![
            ToolDefinition {
                name: "search".into(),
                description: "Search the web".into(),
                input_schema: json!({"type": "object"}),
            },
            ToolDefinition {
                name: "lookup".into(),
                description: "Look things up".into(),
                input_schema: json!({"type": "object"}),
            },
        ];
        let bound = bind_tools(Arc::new(ToolCountingModel), defs);

        // Even a request carrying no tools reaches the model with the bound set.
        let request = ChatRequest::new("test-model", vec![Message::user("go")]);
        let reply = bound.invoke(request).await.unwrap();
        assert_eq!(reply.text_content(), "saw 2 tools");
    }

    #[tokio::test]
    async fn bound_model_replaces_request_tools() {
        let bound = bind_tools(Arc::new(ToolCountingModel), vec![]);
        let request = ChatRequest::new("test-model", vec![]).with_tools(vec![ToolDefinition {
            name: "stray".into(),
            description: "should be dropped".into(),
            input_schema: json!({}),
        }]);
        let reply = bound.invoke(request).await.unwrap();
        assert_eq!(reply.text_content(), "saw 0 tools");
    }
}
