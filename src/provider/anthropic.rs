use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tokio::sync::mpsc;

use crate::error::{WeftError, WeftResult};
use crate::types::*;

use super::traits::{ChatModel, ChatRequest};

const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Client for the Anthropic-style `/v1/messages` streaming dialect.
pub struct AnthropicChatModel {
    http: Client,
    base_url: String,
    api_key: String,
}

impl AnthropicChatModel {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, "https://api.anthropic.com")
    }

    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn request_body(&self, request: &ChatRequest) -> serde_json::Value {
        // System messages never enter the array; system text is top-level
        let wire_messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(wire_message)
            .collect();

        let mut body = json!({
            "model": request.model,
            "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "messages": wire_messages,
            "stream": true,
        });
        if !request.system.is_empty() {
            body["system"] = json!(request.system);
        }
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
        if !request.tools.is_empty() {
            body["tools"] = request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.input_schema,
                    })
                })
                .collect();
        }
        body
    }
}

fn wire_message(msg: &Message) -> serde_json::Value {
    // Tool results travel inside user messages in this dialect
    let role = if msg.role == Role::Assistant {
        "assistant"
    } else {
        "user"
    };
    let content: Vec<serde_json::Value> = msg.content.iter().map(wire_block).collect();
    json!({"role": role, "content": content})
}

fn wire_block(block: &ContentBlock) -> serde_json::Value {
    match block {
        ContentBlock::Text { text } => json!({"type": "text", "text": text}),
        ContentBlock::ToolCall { id, name, arguments } => json!({
            "type": "tool_use",
            "id": id,
            "name": name,
            "input": arguments,
        }),
        ContentBlock::ToolResult {
            tool_call_id,
            content,
            is_error,
        } => json!({
            "type": "tool_result",
            "tool_use_id": tool_call_id,
            "content": content,
            "is_error": is_error,
        }),
    }
}

/// A content block under reassembly from the event stream.
enum OpenBlock {
    Text(String),
    ToolUse {
        id: String,
        name: String,
        partial_json: String,
    },
}

/// Applies the dialect's SSE events in order and yields the final message.
#[derive(Default)]
struct BlockAssembler {
    blocks: Vec<OpenBlock>,
    usage: TokenUsage,
}

impl BlockAssembler {
    fn apply_event(
        &mut self,
        event: &serde_json::Value,
        delta_tx: &mpsc::UnboundedSender<StreamDelta>,
    ) {
        match event.get("type").and_then(|v| v.as_str()).unwrap_or("") {
            "message_start" => {
                if let Some(n) = event
                    .pointer("/message/usage/input_tokens")
                    .and_then(|v| v.as_u64())
                {
                    self.usage.input_tokens = n as usize;
                }
            }
            "content_block_start" => self.open_block(event),
            "content_block_delta" => self.apply_delta(event, delta_tx),
            "message_delta" => {
                if let Some(n) = event
                    .pointer("/usage/output_tokens")
                    .and_then(|v| v.as_u64())
                {
                    self.usage.output_tokens = n as usize;
                }
            }
            _ => {}
        }
    }

    fn open_block(&mut self, event: &serde_json::Value) {
        let Some(block) = event.get("content_block") else {
            return;
        };
        match block.get("type").and_then(|v| v.as_str()).unwrap_or("") {
            "text" => self.blocks.push(OpenBlock::Text(String::new())),
            "tool_use" => self.blocks.push(OpenBlock::ToolUse {
                id: string_field(block, "id"),
                name: string_field(block, "name"),
                partial_json: String::new(),
            }),
            _ => {}
        }
    }

    fn apply_delta(
        &mut self,
        event: &serde_json::Value,
        delta_tx: &mpsc::UnboundedSender<StreamDelta>,
    ) {
        let Some(delta) = event.get("delta") else {
            return;
        };
        match delta.get("type").and_then(|v| v.as_str()).unwrap_or("") {
            "text_delta" => {
                let Some(text) = delta.get("text").and_then(|v| v.as_str()) else {
                    return;
                };
                if let Some(OpenBlock::Text(buffer)) = self.blocks.last_mut() {
                    buffer.push_str(text);
                }
                let _ = delta_tx.send(StreamDelta::TextDelta {
                    text: text.to_string(),
                });
            }
            "input_json_delta" => {
                let Some(fragment) = delta.get("partial_json").and_then(|v| v.as_str()) else {
                    return;
                };
                if let Some(OpenBlock::ToolUse {
                    id,
                    name,
                    partial_json,
                }) = self.blocks.last_mut()
                {
                    partial_json.push_str(fragment);
                    let _ = delta_tx.send(StreamDelta::ToolCallDelta {
                        id: id.clone(),
                        name: name.clone(),
                        arguments_delta: fragment.to_string(),
                    });
                }
            }
            _ => {}
        }
    }

    fn into_message(self, model: &str) -> Message {
        let blocks = self
            .blocks
            .into_iter()
            .map(|block| match block {
                OpenBlock::Text(text) => ContentBlock::Text { text },
                OpenBlock::ToolUse {
                    id,
                    name,
                    partial_json,
                } => {
                    let arguments = serde_json::from_str(&partial_json).unwrap_or(json!({}));
                    ContentBlock::tool_call(id, name, arguments)
                }
            })
            .collect();

        let mut message = Message::new(Role::Assistant, blocks);
        message.model = Some(model.to_string());
        message.usage = Some(self.usage);
        message
    }
}

fn string_field(value: &serde_json::Value, key: &str) -> String {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

#[async_trait]
impl ChatModel for AnthropicChatModel {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    async fn stream(
        &self,
        request: &ChatRequest,
        delta_tx: mpsc::UnboundedSender<StreamDelta>,
    ) -> WeftResult<Message> {
        let response = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&self.request_body(request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                429 => WeftError::RateLimited {
                    provider: "anthropic".into(),
                    retry_after_ms: 5000,
                },
                401 | 403 => WeftError::Auth(format!("Anthropic auth failed: {body}")),
                _ => WeftError::Provider(format!("Anthropic API error {status}: {body}")),
            });
        }

        let payload = response.bytes().await?;
        let payload = String::from_utf8_lossy(&payload);

        let mut assembler = BlockAssembler::default();
        for data in payload.lines().filter_map(|l| l.strip_prefix("data: ")) {
            if let Ok(event) = serde_json::from_str::<serde_json::Value>(data) {
                assembler.apply_event(&event, &delta_tx);
            }
        }

        Ok(assembler.into_message(&request.model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_is_anthropic() {
        assert_eq!(
            AnthropicChatModel::new("sk-ant").kind(),
            ProviderKind::Anthropic
        );
        let local = AnthropicChatModel::with_base_url("sk-ant", "http://localhost:8082");
        assert_eq!(local.base_url, "http://localhost:8082");
    }

    #[test]
    fn system_text_is_top_level_not_a_message() {
        let model = AnthropicChatModel::new("sk-ant");
        let request = ChatRequest::new("claude-sonnet-4", vec![Message::user("hi")])
            .with_system("Be terse.");
        let body = model.request_body(&request);
        assert_eq!(body["system"], "Be terse.");
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
    }

    #[test]
    fn max_tokens_has_a_default() {
        let model = AnthropicChatModel::new("sk-ant");
        let body = model.request_body(&ChatRequest::new("claude-sonnet-4", vec![]));
        assert_eq!(body["max_tokens"], DEFAULT_MAX_TOKENS);
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn tool_definitions_keep_input_schema() {
        let model = AnthropicChatModel::new("sk-ant");
        let request = ChatRequest::new("claude-sonnet-4", vec![]).with_tools(vec![ToolDefinition {
            name: "docs_search".into(),
            description: "Search indexed pages".into(),
            input_schema: json!({"type": "object"}),
        }]);
        let body = model.request_body(&request);
        assert_eq!(body["tools"][0]["name"], "docs_search");
        assert!(body["tools"][0]["input_schema"].is_object());
    }

    #[test]
    fn tool_results_ride_in_user_messages() {
        let wire = wire_message(&Message::tool_result("tc1", "found it", false));
        assert_eq!(wire["role"], "user");
        assert_eq!(wire["content"][0]["type"], "tool_result");
        assert_eq!(wire["content"][0]["tool_use_id"], "tc1");
        assert_eq!(wire["content"][0]["is_error"], false);
    }

    #[test]
    fn tool_calls_become_tool_use_blocks() {
        let msg = Message::new(
            Role::Assistant,
            vec![ContentBlock::tool_call("tc1", "web_search", json!({"query": "q"}))],
        );
        let wire = wire_message(&msg);
        assert_eq!(wire["role"], "assistant");
        assert_eq!(wire["content"][0]["type"], "tool_use");
        // Arguments stay a JSON object in this dialect
        assert_eq!(wire["content"][0]["input"]["query"], "q");
    }

    #[test]
    fn assembler_reassembles_text_blocks() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut assembler = BlockAssembler::default();

        assembler.apply_event(
            &json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}),
            &tx,
        );
        assembler.apply_event(
            &json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "Hello"}}),
            &tx,
        );
        assembler.apply_event(
            &json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": " world"}}),
            &tx,
        );

        let message = assembler.into_message("claude-sonnet-4");
        assert_eq!(message.text_content(), "Hello world");
        let deltas: Vec<StreamDelta> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(deltas.len(), 2);
    }

    #[test]
    fn assembler_parses_accumulated_tool_input() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut assembler = BlockAssembler::default();

        assembler.apply_event(
            &json!({"type": "content_block_start", "index": 0,
                "content_block": {"type": "tool_use", "id": "toolu_1", "name": "docs_search", "input": {}}}),
            &tx,
        );
        assembler.apply_event(
            &json!({"type": "content_block_delta", "index": 0,
                "delta": {"type": "input_json_delta", "partial_json": "{\"query\": \"age"}}),
            &tx,
        );
        assembler.apply_event(
            &json!({"type": "content_block_delta", "index": 0,
                "delta": {"type": "input_json_delta", "partial_json": "nts\"}"}}),
            &tx,
        );

        let message = assembler.into_message("claude-sonnet-4");
        match &message.content[0] {
            ContentBlock::ToolCall { id, name, arguments } => {
                assert_eq!(id, "toolu_1");
                assert_eq!(name, "docs_search");
                assert_eq!(arguments["query"], "agents");
            }
            other => panic!("not a tool call: {other:?}"),
        }
    }

    #[test]
    fn assembler_tracks_usage_from_both_ends() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut assembler = BlockAssembler::default();

        assembler.apply_event(
            &json!({"type": "message_start", "message": {"usage": {"input_tokens": 11, "output_tokens": 1}}}),
            &tx,
        );
        assembler.apply_event(
            &json!({"type": "message_delta", "delta": {"stop_reason": "end_turn"}, "usage": {"output_tokens": 8}}),
            &tx,
        );

        let message = assembler.into_message("claude-sonnet-4");
        assert_eq!(message.usage, Some(TokenUsage::new(11, 8)));
    }
}
