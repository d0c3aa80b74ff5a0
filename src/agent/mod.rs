//! Tool-calling agent and its executor loop.
//!
//! A [`ToolCallingAgent`] is a chat model bound to tool definitions plus a
//! prompt. The [`AgentExecutor`] drives it: each turn streams one model
//! step and runs any tools it requested, feeding the results back into the
//! next turn until the model answers in plain text or the iteration cap is
//! reached.

use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::WeftResult;
use crate::history::HistoryStore;
use crate::prompt::ChatPrompt;
use crate::provider::{bind_tools, BoundChatModel, ChatModel, ChatRequest};
use crate::tool::{ToolOutput, ToolRegistry};
use crate::trace::{RunTracer, TraceKind};
use crate::types::*;

/// Iteration cap applied when the caller does not set one.
pub const DEFAULT_MAX_ITERATIONS: usize = 15;

/// Canned reply returned when a run hits the iteration cap.
pub const STOPPED_RESPONSE: &str = "Agent stopped due to iteration limit or time limit.";

/// A chat model bound to tools, with the prompt that frames each call.
pub struct ToolCallingAgent {
    model: BoundChatModel,
    model_id: String,
    prompt: ChatPrompt,
}

/// One planning step: either the model wants tools run, or it is done.
#[derive(Debug, Clone)]
pub enum AgentStep {
    /// The assistant message carries one or more tool calls
    Act { message: Message },
    /// The assistant message is the final answer
    Finish { message: Message },
}

/// What a finished run produced.
#[derive(Debug, Clone)]
pub struct AgentOutcome {
    /// Final answer text, or the canned stopped reply
    pub output: String,
    /// Messages produced during the run: assistant turns and tool results
    pub new_messages: Vec<Message>,
    /// Model turns taken
    pub turns: usize,
}

impl ToolCallingAgent {
    pub fn new(
        model: Arc<dyn ChatModel>,
        model_id: impl Into<String>,
        tools: Vec<ToolDefinition>,
        prompt: ChatPrompt,
    ) -> Self {
        Self {
            model: bind_tools(model, tools),
            model_id: model_id.into(),
            prompt,
        }
    }

    /// Build an agent whose bound tool definitions come from a registry.
    pub fn from_registry(
        model: Arc<dyn ChatModel>,
        model_id: impl Into<String>,
        registry: &ToolRegistry,
        prompt: ChatPrompt,
    ) -> Self {
        Self::new(model, model_id, registry.definitions(), prompt)
    }

    /// Tool definitions the model sees on every call.
    pub fn tools(&self) -> &[ToolDefinition] {
        self.model.tools()
    }

    /// One planning step: stream a model turn over history, input, and the
    /// scratchpad of this run, and classify the reply.
    pub async fn plan(
        &self,
        history: &[Message],
        input: &str,
        scratchpad: &[Message],
        delta_tx: mpsc::UnboundedSender<StreamDelta>,
    ) -> WeftResult<AgentStep> {
        let messages = self.prompt.render_messages(history, input, scratchpad);
        let request = ChatRequest::new(self.model_id.as_str(), messages)
            .with_system(self.prompt.system_text());

        let message = self.model.stream(request, delta_tx).await?;

        if message.has_tool_calls() {
            Ok(AgentStep::Act { message })
        } else {
            Ok(AgentStep::Finish { message })
        }
    }
}

/// Drives a [`ToolCallingAgent`] to completion.
pub struct AgentExecutor {
    agent: ToolCallingAgent,
    registry: ToolRegistry,
    max_iterations: usize,
    tracer: Option<Arc<RunTracer>>,
}

impl AgentExecutor {
    pub fn new(agent: ToolCallingAgent, registry: ToolRegistry) -> Self {
        Self {
            agent,
            registry,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tracer: None,
        }
    }

    /// Cap on model turns per run. Clamped to at least one.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    pub fn with_tracer(mut self, tracer: Arc<RunTracer>) -> Self {
        self.tracer = Some(tracer);
        self
    }

    /// Pair this executor with a history store; runs become session-keyed.
    pub fn with_history(self, store: Arc<dyn HistoryStore>) -> SessionAgent {
        SessionAgent {
            executor: self,
            store,
        }
    }

    fn trace(&self, kind: TraceKind) {
        if let Some(tracer) = &self.tracer {
            tracer.emit(kind);
        }
    }

    /// Run the agent loop over `input` with prior conversation `history`.
    ///
    /// Events stream through `event_tx` as the run progresses. Hitting the
    /// iteration cap is a normal outcome with the canned stopped reply, not
    /// an error.
    pub async fn run(
        &self,
        input: &str,
        history: &[Message],
        event_tx: mpsc::UnboundedSender<AgentEvent>,
    ) -> WeftResult<AgentOutcome> {
        let _ = event_tx.send(AgentEvent::RunStart {
            input: input.to_string(),
        });
        self.trace(TraceKind::RunStart {
            input: input.to_string(),
        });

        let mut scratchpad: Vec<Message> = Vec::new();
        let mut turn = 0;

        while turn < self.max_iterations {
            let _ = event_tx.send(AgentEvent::TurnStart { turn });
            self.trace(TraceKind::ModelCall {
                turn,
                message_count: history.len() + 1 + scratchpad.len(),
            });

            // Forward streaming deltas as events while the model call runs
            let (delta_tx, mut delta_rx) = mpsc::unbounded_channel();
            let event_tx_clone = event_tx.clone();
            let delta_forwarder = tokio::spawn(async move {
                while let Some(delta) = delta_rx.recv().await {
                    if let StreamDelta::TextDelta { text } = delta {
                        let _ = event_tx_clone.send(AgentEvent::MessageDelta { text });
                    }
                }
            });

            let planned = self.agent.plan(history, input, &scratchpad, delta_tx).await;
            delta_forwarder.await.ok();

            let step = match planned {
                Ok(step) => step,
                Err(e) => {
                    let _ = event_tx.send(AgentEvent::Error {
                        message: e.to_string(),
                    });
                    return Err(e);
                }
            };

            match step {
                AgentStep::Finish { message } => {
                    let _ = event_tx.send(AgentEvent::MessageEnd {
                        message: message.clone(),
                    });

                    let output = message.text_content();
                    scratchpad.push(message);
                    let turns = turn + 1;

                    let _ = event_tx.send(AgentEvent::RunEnd {
                        output: output.clone(),
                        turns,
                    });
                    self.trace(TraceKind::RunEnd { turns });

                    return Ok(AgentOutcome {
                        output,
                        new_messages: scratchpad,
                        turns,
                    });
                }
                AgentStep::Act { message } => {
                    let _ = event_tx.send(AgentEvent::MessageEnd {
                        message: message.clone(),
                    });

                    let calls: Vec<(String, String, serde_json::Value)> = message
                        .tool_calls()
                        .iter()
                        .filter_map(|block| match block {
                            ContentBlock::ToolCall {
                                id,
                                name,
                                arguments,
                            } => Some((id.clone(), name.clone(), arguments.clone())),
                            _ => None,
                        })
                        .collect();
                    scratchpad.push(message);

                    for (id, name, arguments) in calls {
                        let _ = event_tx.send(AgentEvent::ToolStart {
                            tool_call_id: id.clone(),
                            tool_name: name.clone(),
                        });
                        self.trace(TraceKind::ToolInvoked {
                            tool_call_id: id.clone(),
                            tool_name: name.clone(),
                        });

                        let output = match self.registry.get(&name) {
                            Some(tool) => match tool.execute(&id, arguments).await {
                                Ok(output) => output,
                                Err(e) => ToolOutput::error(format!("Tool error: {e}")),
                            },
                            None => ToolOutput::error(format!("Unknown tool: {name}")),
                        };

                        let _ = event_tx.send(AgentEvent::ToolEnd {
                            tool_call_id: id.clone(),
                            content: output.content.clone(),
                            is_error: output.is_error,
                        });
                        self.trace(TraceKind::ToolCompleted {
                            tool_call_id: id.clone(),
                            tool_name: name.clone(),
                            is_error: output.is_error,
                        });

                        scratchpad.push(Message::tool_result(id, output.content, output.is_error));
                    }

                    turn += 1;
                }
            }
        }

        // Iteration cap reached without a final answer
        let output = STOPPED_RESPONSE.to_string();
        let _ = event_tx.send(AgentEvent::RunEnd {
            output: output.clone(),
            turns: turn,
        });
        self.trace(TraceKind::RunEnd { turns: turn });

        Ok(AgentOutcome {
            output,
            new_messages: scratchpad,
            turns: turn,
        })
    }

    /// Run without streaming; events are discarded.
    pub async fn invoke(&self, input: &str, history: &[Message]) -> WeftResult<AgentOutcome> {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let outcome = self.run(input, history, event_tx).await;
        while event_rx.try_recv().is_ok() {}
        outcome
    }
}

/// An executor paired with a history store.
///
/// Each call is keyed by session ID: prior messages are loaded before the
/// run, and afterwards the user input plus the final reply are appended.
/// Intermediate tool traffic stays out of the stored transcript.
pub struct SessionAgent {
    executor: AgentExecutor,
    store: Arc<dyn HistoryStore>,
}

impl SessionAgent {
    /// Run one exchange in the given session, streaming events.
    pub async fn run(
        &self,
        session_id: &str,
        input: &str,
        event_tx: mpsc::UnboundedSender<AgentEvent>,
    ) -> WeftResult<AgentOutcome> {
        let history = self.store.get(session_id).await?;
        let outcome = self
            .executor
            .run(input, &history.messages, event_tx)
            .await?;

        // A stopped run ends mid-tool-exchange; store the canned reply instead
        // of a dangling tool-call message.
        let reply = match outcome.new_messages.last() {
            Some(m) if m.role == Role::Assistant && !m.has_tool_calls() => m.clone(),
            _ => Message::assistant(&outcome.output),
        };
        self.store
            .append(session_id, &[Message::user(input), reply])
            .await?;

        Ok(outcome)
    }

    /// Run one exchange without streaming; events are discarded.
    pub async fn invoke(&self, session_id: &str, input: &str) -> WeftResult<AgentOutcome> {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let outcome = self.run(session_id, input, event_tx).await;
        while event_rx.try_recv().is_ok() {}
        outcome
    }

    pub fn store(&self) -> &Arc<dyn HistoryStore> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WeftError;
    use crate::history::MemoryHistoryStore;
    use crate::tool::Tool;
    use crate::trace::MemorySink;
    use async_trait::async_trait;
    use serde_json::json;

    // Scripted model that pops canned responses and records what it saw
    struct ScriptedChatModel {
        responses: std::sync::Mutex<Vec<Message>>,
        seen_message_counts: std::sync::Mutex<Vec<usize>>,
    }

    impl ScriptedChatModel {
        fn new(responses: Vec<Message>) -> Self {
            Self {
                responses: std::sync::Mutex::new(responses),
                seen_message_counts: std::sync::Mutex::new(Vec::new()),
            }
        }

        fn seen_message_counts(&self) -> Vec<usize> {
            self.seen_message_counts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl crate::provider::ChatModel for ScriptedChatModel {
        fn kind(&self) -> ProviderKind {
            ProviderKind::Custom("scripted".into())
        }

        async fn stream(
            &self,
            request: &ChatRequest,
            delta_tx: mpsc::UnboundedSender<StreamDelta>,
        ) -> WeftResult<Message> {
            self.seen_message_counts
                .lock()
                .unwrap()
                .push(request.messages.len());

            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(WeftError::Provider("script exhausted".into()));
            }
            let msg = responses.remove(0);

            for block in &msg.content {
                if let ContentBlock::Text { text } = block {
                    let _ = delta_tx.send(StreamDelta::TextDelta { text: text.clone() });
                }
            }
            Ok(msg)
        }
    }

    struct UppercaseTool;

    #[async_trait]
    impl Tool for UppercaseTool {
        fn name(&self) -> &str {
            "uppercase"
        }

        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "uppercase".into(),
                description: "Convert text to uppercase".into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {"text": {"type": "string"}},
                    "required": ["text"]
                }),
            }
        }

        async fn execute(
            &self,
            _call_id: &str,
            arguments: serde_json::Value,
        ) -> WeftResult<ToolOutput> {
            let text = arguments.get("text").and_then(|v| v.as_str()).unwrap_or("");
            Ok(ToolOutput::success(text.to_uppercase()))
        }
    }

    fn executor_with(responses: Vec<Message>, registry: ToolRegistry) -> AgentExecutor {
        let model = Arc::new(ScriptedChatModel::new(responses));
        let agent = ToolCallingAgent::from_registry(
            model,
            "scripted-model",
            &registry,
            ChatPrompt::default(),
        );
        AgentExecutor::new(agent, registry)
    }

    fn tool_call_message(id: &str, text: &str) -> Message {
        Message::new(
            Role::Assistant,
            vec![ContentBlock::tool_call(
                id,
                "uppercase",
                json!({"text": text}),
            )],
        )
    }

    #[tokio::test]
    async fn simple_response_finishes_in_one_turn() {
        let executor = executor_with(
            vec![Message::assistant("Hello! How can I help?")],
            ToolRegistry::new(),
        );

        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let outcome = executor.run("hi", &[], event_tx).await.unwrap();

        assert_eq!(outcome.output, "Hello! How can I help?");
        assert_eq!(outcome.turns, 1);
        assert_eq!(outcome.new_messages.len(), 1);

        let mut events = Vec::new();
        while let Ok(event) = event_rx.try_recv() {
            events.push(event);
        }
        assert!(events
            .iter()
            .any(|e| matches!(e, AgentEvent::RunStart { .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, AgentEvent::RunEnd { output, .. } if output == "Hello! How can I help?")));
    }

    #[tokio::test]
    async fn deltas_stream_before_the_final_message() {
        let executor = executor_with(
            vec![Message::assistant("streamed answer")],
            ToolRegistry::new(),
        );

        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        executor.run("hi", &[], event_tx).await.unwrap();

        let mut streamed = String::new();
        let mut saw_message_end = false;
        while let Ok(event) = event_rx.try_recv() {
            match event {
                AgentEvent::MessageDelta { text } => {
                    assert!(!saw_message_end, "delta arrived after MessageEnd");
                    streamed.push_str(&text);
                }
                AgentEvent::MessageEnd { .. } => saw_message_end = true,
                _ => {}
            }
        }
        assert_eq!(streamed, "streamed answer");
        assert!(saw_message_end);
    }

    #[tokio::test]
    async fn tool_call_round_trip() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(UppercaseTool));

        let executor = executor_with(
            vec![
                tool_call_message("tc1", "hello world"),
                Message::assistant("The uppercase is: HELLO WORLD"),
            ],
            registry,
        );

        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let outcome = executor
            .run("uppercase hello world", &[], event_tx)
            .await
            .unwrap();

        // tool-call message, tool result, final answer
        assert_eq!(outcome.new_messages.len(), 3);
        assert_eq!(outcome.output, "The uppercase is: HELLO WORLD");
        assert_eq!(outcome.turns, 2);

        let result_msg = &outcome.new_messages[1];
        assert_eq!(result_msg.role, Role::Tool);
        match &result_msg.content[0] {
            ContentBlock::ToolResult {
                content, is_error, ..
            } => {
                assert_eq!(content, "HELLO WORLD");
                assert!(!is_error);
            }
            other => panic!("unexpected block: {other:?}"),
        }

        let mut events = Vec::new();
        while let Ok(event) = event_rx.try_recv() {
            events.push(event);
        }
        assert!(events
            .iter()
            .any(|e| matches!(e, AgentEvent::ToolStart { tool_name, .. } if tool_name == "uppercase")));
        assert!(events
            .iter()
            .any(|e| matches!(e, AgentEvent::ToolEnd { is_error, .. } if !is_error)));
    }

    #[tokio::test]
    async fn tool_results_feed_the_next_model_call() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(UppercaseTool));

        let model = Arc::new(ScriptedChatModel::new(vec![
            tool_call_message("tc1", "abc"),
            Message::assistant("done"),
        ]));
        let agent = ToolCallingAgent::from_registry(
            model.clone(),
            "scripted-model",
            &registry,
            ChatPrompt::default(),
        );
        let executor = AgentExecutor::new(agent, registry);

        executor.invoke("go", &[]).await.unwrap();

        // First call: just the input. Second: input + tool call + tool result.
        assert_eq!(model.seen_message_counts(), vec![1, 3]);
    }

    #[tokio::test]
    async fn unknown_tool_becomes_error_result() {
        let executor = executor_with(
            vec![
                Message::new(
                    Role::Assistant,
                    vec![ContentBlock::tool_call("tc1", "nonexistent_tool", json!({}))],
                ),
                Message::assistant("I see, that tool doesn't exist"),
            ],
            ToolRegistry::new(),
        );

        let outcome = executor.invoke("call nonexistent", &[]).await.unwrap();

        assert_eq!(outcome.new_messages.len(), 3);
        let error_msg = &outcome.new_messages[1];
        assert_eq!(error_msg.role, Role::Tool);
        match &error_msg.content[0] {
            ContentBlock::ToolResult {
                content, is_error, ..
            } => {
                assert!(is_error);
                assert!(content.contains("Unknown tool: nonexistent_tool"));
            }
            other => panic!("unexpected block: {other:?}"),
        }
    }

    #[tokio::test]
    async fn iteration_cap_yields_stopped_response() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(UppercaseTool));

        // The model keeps asking for tools, never answering
        let responses: Vec<Message> = (0..5)
            .map(|i| tool_call_message(&format!("tc{i}"), "test"))
            .collect();
        let executor = executor_with(responses, registry).with_max_iterations(3);

        let outcome = executor.invoke("loop forever", &[]).await.unwrap();

        assert_eq!(outcome.output, STOPPED_RESPONSE);
        assert_eq!(outcome.turns, 3);
        // Three turns, each a tool-call message plus its result
        assert_eq!(outcome.new_messages.len(), 6);
    }

    #[tokio::test]
    async fn model_errors_propagate() {
        // Empty script: the first model call fails
        let executor = executor_with(Vec::new(), ToolRegistry::new());

        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let result = executor.run("hi", &[], event_tx).await;
        assert!(result.is_err());

        let mut saw_error_event = false;
        while let Ok(event) = event_rx.try_recv() {
            if matches!(event, AgentEvent::Error { .. }) {
                saw_error_event = true;
            }
        }
        assert!(saw_error_event);
    }

    #[tokio::test]
    async fn tracer_records_the_run_lifecycle() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(UppercaseTool));

        let sink = Arc::new(MemorySink::new());
        let mut tracer = RunTracer::new();
        tracer.add_sink(sink.clone());

        let executor = executor_with(
            vec![
                tool_call_message("tc1", "traced"),
                Message::assistant("TRACED"),
            ],
            registry,
        )
        .with_tracer(Arc::new(tracer));

        executor.invoke("trace me", &[]).await.unwrap();

        let kinds: Vec<TraceKind> = sink.events().into_iter().map(|e| e.kind).collect();
        assert!(matches!(kinds[0], TraceKind::RunStart { .. }));
        assert!(kinds
            .iter()
            .any(|k| matches!(k, TraceKind::ToolInvoked { tool_name, .. } if tool_name == "uppercase")));
        assert!(kinds
            .iter()
            .any(|k| matches!(k, TraceKind::ToolCompleted { is_error, .. } if !is_error)));
        assert!(matches!(kinds.last(), Some(TraceKind::RunEnd { turns: 2 })));
    }

    #[tokio::test]
    async fn session_agent_records_input_and_reply() {
        let store = Arc::new(MemoryHistoryStore::new());
        let executor = executor_with(
            vec![Message::assistant("Nice to meet you, Ada")],
            ToolRegistry::new(),
        );
        let session = executor.with_history(store.clone());

        let outcome = session.invoke("alice", "hi, I'm Ada").await.unwrap();
        assert_eq!(outcome.output, "Nice to meet you, Ada");

        let history = store.get("alice").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history.messages[0].role, Role::User);
        assert_eq!(history.messages[0].text_content(), "hi, I'm Ada");
        assert_eq!(history.messages[1].role, Role::Assistant);
        assert_eq!(history.messages[1].text_content(), "Nice to meet you, Ada");
    }

    #[tokio::test]
    async fn session_agent_threads_history_into_later_calls() {
        let store = Arc::new(MemoryHistoryStore::new());
        let model = Arc::new(ScriptedChatModel::new(vec![
            Message::assistant("Hello Ada"),
            Message::assistant("Your name is Ada"),
        ]));
        let registry = ToolRegistry::new();
        let agent = ToolCallingAgent::from_registry(
            model.clone(),
            "scripted-model",
            &registry,
            ChatPrompt::default(),
        );
        let session = AgentExecutor::new(agent, registry).with_history(store);

        session.invoke("alice", "hi, I'm Ada").await.unwrap();
        let outcome = session.invoke("alice", "what's my name?").await.unwrap();

        assert_eq!(outcome.output, "Your name is Ada");
        // Second call saw two history messages plus the new input
        assert_eq!(model.seen_message_counts(), vec![1, 3]);
    }

    #[tokio::test]
    async fn session_agent_keeps_sessions_separate() {
        let store = Arc::new(MemoryHistoryStore::new());
        let executor = executor_with(
            vec![
                Message::assistant("reply for alice"),
                Message::assistant("reply for bob"),
            ],
            ToolRegistry::new(),
        );
        let session = executor.with_history(store.clone());

        session.invoke("alice", "from alice").await.unwrap();
        session.invoke("bob", "from bob").await.unwrap();

        let alice = store.get("alice").await.unwrap();
        let bob = store.get("bob").await.unwrap();
        assert_eq!(alice.len(), 2);
        assert_eq!(bob.len(), 2);
        assert_eq!(alice.messages[1].text_content(), "reply for alice");
        assert_eq!(bob.messages[1].text_content(), "reply for bob");
    }

    #[tokio::test]
    async fn session_agent_creates_sessions_lazily() {
        let store = Arc::new(MemoryHistoryStore::new());
        let executor = executor_with(vec![Message::assistant("hello")], ToolRegistry::new());
        let session = executor.with_history(store.clone());

        assert!(store.sessions().await.unwrap().is_empty());
        session.invoke("carol", "hi").await.unwrap();
        assert_eq!(store.sessions().await.unwrap(), vec!["carol".to_string()]);
    }

    #[tokio::test]
    async fn stopped_run_still_records_a_reply() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(UppercaseTool));

        let store = Arc::new(MemoryHistoryStore::new());
        let executor = executor_with(vec![tool_call_message("tc1", "x")], registry)
            .with_max_iterations(1);
        let session = executor.with_history(store.clone());

        let outcome = session.invoke("dave", "spin").await.unwrap();
        assert_eq!(outcome.output, STOPPED_RESPONSE);

        // The transcript stays a user/assistant pair even without a real answer
        let history = store.get("dave").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history.messages[1].role, Role::Assistant);
        assert_eq!(history.messages[1].text_content(), STOPPED_RESPONSE);
    }

    #[tokio::test]
    async fn default_iteration_cap_applies() {
        let executor = executor_with(Vec::new(), ToolRegistry::new());
        assert_eq!(executor.max_iterations, DEFAULT_MAX_ITERATIONS);

        let clamped = executor_with(Vec::new(), ToolRegistry::new()).with_max_iterations(0);
        assert_eq!(clamped.max_iterations, 1);
    }
}
