use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tokio::sync::mpsc;

use crate::error::{WeftError, WeftResult};
use crate::types::*;

use super::traits::{ChatModel, ChatRequest};

/// Client for the OpenAI-style `/v1/chat/completions` streaming dialect.
pub struct OpenAIChatModel {
    http: Client,
    base_url: String,
    api_key: String,
}

impl OpenAIChatModel {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, "https://api.openai.com")
    }

    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn request_body(&self, request: &ChatRequest) -> serde_json::Value {
        let mut wire_messages = Vec::with_capacity(request.messages.len() + 1);
        // This dialect takes system text as the leading message
        if !request.system.is_empty() {
            wire_messages.push(json!({"role": "system", "content": request.system}));
        }
        wire_messages.extend(request.messages.iter().map(wire_message));

        let mut body = json!({
            "model": request.model,
            "messages": wire_messages,
            "stream": true,
            "stream_options": {"include_usage": true},
        });
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
        if !request.tools.is_empty() {
            body["tools"] = request.tools.iter().map(wire_tool).collect();
        }
        body
    }
}

fn wire_tool(def: &ToolDefinition) -> serde_json::Value {
    json!({
        "type": "function",
        "function": {
            "name": def.name,
            "description": def.description,
            "parameters": def.input_schema,
        }
    })
}

fn wire_message(msg: &Message) -> serde_json::Value {
    match msg.role {
        Role::Assistant => assistant_wire_message(msg),
        Role::Tool => tool_wire_message(msg),
        Role::User => json!({"role": "user", "content": msg.text_content()}),
        Role::System => json!({"role": "system", "content": msg.text_content()}),
    }
}

fn assistant_wire_message(msg: &Message) -> serde_json::Value {
    let mut out = json!({"role": "assistant"});
    let text = msg.text_content();
    if !text.is_empty() {
        out["content"] = json!(text);
    }

    let calls: Vec<serde_json::Value> = msg
        .content
        .iter()
        .filter_map(|block| match block {
            // Arguments travel as a JSON-encoded string in this dialect
            ContentBlock::ToolCall { id, name, arguments } => Some(json!({
                "id": id,
                "type": "function",
                "function": {"name": name, "arguments": arguments.to_string()},
            })),
            _ => None,
        })
        .collect();
    if !calls.is_empty() {
        out["tool_calls"] = json!(calls);
    }
    out
}

fn tool_wire_message(msg: &Message) -> serde_json::Value {
    match msg.content.first() {
        Some(ContentBlock::ToolResult {
            tool_call_id,
            content,
            ..
        }) => json!({
            "role": "tool",
            "tool_call_id": tool_call_id,
            "content": content,
        }),
        _ => json!({"role": "user", "content": msg.text_content()}),
    }
}

/// A tool call under reassembly: the id and name arrive with the first
/// fragment, the argument string accumulates across the rest.
#[derive(Default)]
struct PartialCall {
    id: String,
    name: String,
    arguments: String,
}

/// Reassembles one assistant message from the chunk stream.
#[derive(Default)]
struct StreamState {
    text: String,
    calls: Vec<PartialCall>,
    usage: TokenUsage,
}

impl StreamState {
    fn apply_chunk(&mut self, chunk: &serde_json::Value, delta_tx: &mpsc::UnboundedSender<StreamDelta>) {
        if let Some(delta) = chunk
            .get("choices")
            .and_then(|v| v.as_array())
            .and_then(|choices| choices.first())
            .and_then(|choice| choice.get("delta"))
        {
            if let Some(text) = delta.get("content").and_then(|v| v.as_str()) {
                self.text.push_str(text);
                let _ = delta_tx.send(StreamDelta::TextDelta {
                    text: text.to_string(),
                });
            }
            if let Some(fragments) = delta.get("tool_calls").and_then(|v| v.as_array()) {
                for fragment in fragments {
                    self.apply_call_fragment(fragment, delta_tx);
                }
            }
        }

        if let Some(usage) = chunk.get("usage") {
            if let Some(n) = usage.get("prompt_tokens").and_then(|v| v.as_u64()) {
                self.usage.input_tokens = n as usize;
            }
            if let Some(n) = usage.get("completion_tokens").and_then(|v| v.as_u64()) {
                self.usage.output_tokens = n as usize;
            }
        }
    }

    fn apply_call_fragment(
        &mut self,
        fragment: &serde_json::Value,
        delta_tx: &mpsc::UnboundedSender<StreamDelta>,
    ) {
        let index = fragment.get("index").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
        while self.calls.len() <= index {
            self.calls.push(PartialCall::default());
        }
        let call = &mut self.calls[index];

        if let Some(id) = fragment.get("id").and_then(|v| v.as_str()) {
            call.id = id.to_string();
        }
        if let Some(function) = fragment.get("function") {
            if let Some(name) = function.get("name").and_then(|v| v.as_str()) {
                call.name = name.to_string();
            }
            if let Some(args) = function.get("arguments").and_then(|v| v.as_str()) {
                call.arguments.push_str(args);
                let _ = delta_tx.send(StreamDelta::ToolCallDelta {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    arguments_delta: args.to_string(),
                });
            }
        }
    }

    fn into_message(self, model: &str) -> Message {
        let mut blocks = Vec::new();
        if !self.text.is_empty() {
            blocks.push(ContentBlock::text(self.text));
        }
        for call in self.calls {
            if call.name.is_empty() {
                continue;
            }
            let arguments = serde_json::from_str(&call.arguments).unwrap_or(json!({}));
            blocks.push(ContentBlock::tool_call(call.id, call.name, arguments));
        }

        let mut message = Message::new(Role::Assistant, blocks);
        message.model = Some(model.to_string());
        message.usage = Some(self.usage);
        message
    }
}

#[async_trait]
impl ChatModel for OpenAIChatModel {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAI
    }

    async fn stream(
        &self,
        request: &ChatRequest,
        delta_tx: mpsc::UnboundedSender<StreamDelta>,
    ) -> WeftResult<Message> {
        let response = self
            .http
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(&self.request_body(request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                429 => WeftError::RateLimited {
                    provider: "openai".into(),
                    retry_after_ms: 5000,
                },
                401 | 403 => WeftError::Auth(format!("OpenAI auth failed: {body}")),
                _ => WeftError::Provider(format!("OpenAI API error {status}: {body}")),
            });
        }

        let payload = response.bytes().await?;
        let payload = String::from_utf8_lossy(&payload);

        let mut state = StreamState::default();
        for data in payload.lines().filter_map(|l| l.strip_prefix("data: ")) {
            if data.trim() == "[DONE]" {
                break;
            }
            if let Ok(chunk) = serde_json::from_str::<serde_json::Value>(data) {
                state.apply_chunk(&chunk, &delta_tx);
            }
        }

        Ok(state.into_message(&request.model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(rx: &mut mpsc::UnboundedReceiver<StreamDelta>) -> Vec<StreamDelta> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    #[test]
    fn kind_is_openai() {
        assert_eq!(OpenAIChatModel::new("sk-test").kind(), ProviderKind::OpenAI);
        let local = OpenAIChatModel::with_base_url("sk-test", "http://localhost:8081");
        assert_eq!(local.base_url, "http://localhost:8081");
    }

    #[test]
    fn body_carries_system_first_and_streams() {
        let model = OpenAIChatModel::new("sk-test");
        let request = ChatRequest::new("gpt-4o", vec![Message::user("question")])
            .with_system("Be terse.")
            .with_max_tokens(2048);

        let body = model.request_body(&request);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "Be terse.");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["max_tokens"], 2048);
        assert_eq!(body["stream"], true);
        assert_eq!(body["stream_options"]["include_usage"], true);
    }

    #[test]
    fn body_omits_unset_fields() {
        let model = OpenAIChatModel::new("sk-test");
        let body = model.request_body(&ChatRequest::new("gpt-4o-mini", vec![Message::user("hi")]));
        assert!(body.get("tools").is_none());
        assert!(body.get("max_tokens").is_none());
        assert!(body.get("temperature").is_none());
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[test]
    fn tools_map_to_function_entries() {
        let model = OpenAIChatModel::new("sk-test");
        let request = ChatRequest::new("gpt-4o", vec![]).with_tools(vec![ToolDefinition {
            name: "web_search".into(),
            description: "Search the web".into(),
            input_schema: json!({"type": "object"}),
        }]);
        let body = model.request_body(&request);
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "web_search");
        assert!(body["tools"][0]["function"]["parameters"].is_object());
    }

    #[test]
    fn assistant_tool_calls_serialize_arguments_as_strings() {
        let msg = Message::new(
            Role::Assistant,
            vec![
                ContentBlock::text("On it"),
                ContentBlock::tool_call("tc1", "web_search", json!({"query": "weather"})),
            ],
        );
        let wire = wire_message(&msg);
        assert_eq!(wire["role"], "assistant");
        assert_eq!(wire["content"], "On it");
        assert_eq!(wire["tool_calls"][0]["function"]["name"], "web_search");
        // The arguments field is an encoded string, not an object
        assert!(wire["tool_calls"][0]["function"]["arguments"].is_string());
    }

    #[test]
    fn tool_results_become_tool_role_messages() {
        let wire = wire_message(&Message::tool_result("tc1", "three results", false));
        assert_eq!(wire["role"], "tool");
        assert_eq!(wire["tool_call_id"], "tc1");
        assert_eq!(wire["content"], "three results");
    }

    #[test]
    fn stream_state_reassembles_split_tool_arguments() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut state = StreamState::default();

        state.apply_chunk(
            &json!({"choices": [{"delta": {"tool_calls": [
                {"index": 0, "id": "call_1", "function": {"name": "web_search", "arguments": "{\"que"}}]}}]}),
            &tx,
        );
        state.apply_chunk(
            &json!({"choices": [{"delta": {"tool_calls": [
                {"index": 0, "function": {"arguments": "ry\":\"rust\"}"}}]}}]}),
            &tx,
        );

        let message = state.into_message("gpt-4o-mini");
        match &message.content[0] {
            ContentBlock::ToolCall { id, name, arguments } => {
                assert_eq!(id, "call_1");
                assert_eq!(name, "web_search");
                assert_eq!(arguments["query"], "rust");
            }
            other => panic!("not a tool call: {other:?}"),
        }
        assert_eq!(drain(&mut rx).len(), 2);
    }

    #[test]
    fn stream_state_collects_text_and_usage() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut state = StreamState::default();

        state.apply_chunk(&json!({"choices": [{"delta": {"content": "Hello"}}]}), &tx);
        state.apply_chunk(&json!({"choices": [{"delta": {"content": " there"}}]}), &tx);
        state.apply_chunk(
            &json!({"choices": [], "usage": {"prompt_tokens": 5, "completion_tokens": 2}}),
            &tx,
        );

        let message = state.into_message("gpt-4o-mini");
        assert_eq!(message.text_content(), "Hello there");
        assert_eq!(message.usage, Some(TokenUsage::new(5, 2)));
        assert_eq!(message.model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(drain(&mut rx).len(), 2);
    }

    #[test]
    fn unnamed_partial_calls_are_dropped() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut state = StreamState::default();
        state.apply_chunk(
            &json!({"choices": [{"delta": {"tool_calls": [
                {"index": 2, "id": "call_3", "function": {"name": "late", "arguments": "{}"}}]}}]}),
            &tx,
        );
        // Indexes 0 and 1 were back-filled empty and must not survive
        let message = state.into_message("gpt-4o-mini");
        assert_eq!(message.tool_calls().len(), 1);
    }
}
