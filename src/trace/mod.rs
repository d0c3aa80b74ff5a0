//! Run tracing. Every model call, tool invocation, and run boundary flows
//! through a single pipeline with pluggable output sinks.
//!
//! ```text
//! AgentExecutor
//!      │
//!      ▼
//! RunTracer::emit(kind)
//!      │
//!   ┌──┼──┐
//!   ▼  ▼  ▼
//! stdout memory callback
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What happened at one point in an agent run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TraceKind {
    RunStart {
        input: String,
    },
    ModelCall {
        turn: usize,
        message_count: usize,
    },
    ToolInvoked {
        tool_call_id: String,
        tool_name: String,
    },
    ToolCompleted {
        tool_call_id: String,
        tool_name: String,
        is_error: bool,
    },
    RunEnd {
        turns: usize,
    },
}

impl TraceKind {
    /// Short human-readable summary for line-oriented sinks.
    pub fn summary(&self) -> String {
        match self {
            TraceKind::RunStart { input } => format!("run start: {input}"),
            TraceKind::ModelCall {
                turn,
                message_count,
            } => format!("model call: turn {turn}, {message_count} messages"),
            TraceKind::ToolInvoked {
                tool_call_id,
                tool_name,
            } => format!("tool start: {tool_name} ({tool_call_id})"),
            TraceKind::ToolCompleted {
                tool_call_id,
                tool_name,
                is_error,
            } => {
                let status = if *is_error { "failed" } else { "ok" };
                format!("tool end: {tool_name} ({tool_call_id}) {status}")
            }
            TraceKind::RunEnd { turns } => format!("run end: {turns} turns"),
        }
    }
}

/// A timestamped trace record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEvent {
    pub timestamp: DateTime<Utc>,
    /// Session ID if the run belongs to one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub kind: TraceKind,
}

impl TraceEvent {
    pub fn new(kind: TraceKind) -> Self {
        Self {
            timestamp: Utc::now(),
            session_id: None,
            kind,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Format as a single-line trace string.
    pub fn format_line(&self) -> String {
        let mut line = self
            .timestamp
            .format("%Y-%m-%dT%H:%M:%S%.3fZ")
            .to_string();
        if let Some(session) = self.session_id.as_deref() {
            line.push_str(&format!(" [{session}]"));
        }
        line.push(' ');
        line.push_str(&self.kind.summary());
        line
    }
}

/// Trait for trace output sinks.
///
/// Sinks receive events and write them to their target (stdout, memory, etc.).
/// Must be `Send + Sync` for concurrent use.
pub trait TraceSink: Send + Sync {
    /// Write a trace event. Implementations should be non-blocking where possible.
    fn record(&self, event: &TraceEvent);

    /// Flush any buffered output.
    fn flush(&self) {}
}

/// Dispatches trace events to any number of sinks.
pub struct RunTracer {
    sinks: Vec<Arc<dyn TraceSink>>,
}

impl RunTracer {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn add_sink(&mut self, sink: Arc<dyn TraceSink>) {
        self.sinks.push(sink);
    }

    /// Record an event to all sinks.
    pub fn record(&self, event: &TraceEvent) {
        for sink in &self.sinks {
            sink.record(event);
        }
    }

    /// Convenience: stamp a kind with the current time and record it.
    pub fn emit(&self, kind: TraceKind) {
        self.record(&TraceEvent::new(kind));
    }

    /// Flush all sinks.
    pub fn flush(&self) {
        for sink in &self.sinks {
            sink.flush();
        }
    }

    /// Number of attached sinks.
    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }
}

impl Default for RunTracer {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Built-in Sinks ────────────────────────────────────────────────────────

/// Sink that writes formatted lines to stdout.
pub struct StdoutSink;

impl TraceSink for StdoutSink {
    fn record(&self, event: &TraceEvent) {
        println!("{}", event.format_line());
    }
}

/// Sink that collects events in memory (for testing / inspection).
pub struct MemorySink {
    events: std::sync::Mutex<Vec<TraceEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self {
            events: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().unwrap().is_empty()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl TraceSink for MemorySink {
    fn record(&self, event: &TraceEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// Sink that hands each event to a callback.
///
/// Bridges the synchronous `TraceSink` trait into whatever the caller wants,
/// e.g. forwarding into `tracing` spans or queueing for async processing.
pub struct CallbackSink {
    callback: Box<dyn Fn(&TraceEvent) + Send + Sync>,
}

impl CallbackSink {
    pub fn new(callback: impl Fn(&TraceEvent) + Send + Sync + 'static) -> Self {
        Self {
            callback: Box::new(callback),
        }
    }
}

impl TraceSink for CallbackSink {
    fn record(&self, event: &TraceEvent) {
        (self.callback)(event);
    }
}
