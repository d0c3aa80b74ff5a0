//! # weft-core
//!
//! Composable agent toolkit for Rust: chat-model clients with streaming tool
//! calls, web retrieval, and session memory, driven by a tool-calling agent
//! loop.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use weft_core::agent::{AgentExecutor, ToolCallingAgent};
//! use weft_core::history::MemoryHistoryStore;
//! use weft_core::prompt::ChatPrompt;
//! use weft_core::provider::OpenAIChatModel;
//! use weft_core::tool::{SearchClient, ToolRegistry, WebSearchTool};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Tools the model may call
//!     let mut tools = ToolRegistry::new();
//!     tools.register(Box::new(WebSearchTool::new(SearchClient::new("tvly-..."))));
//!
//!     // A model bound to those tool definitions
//!     let model = Arc::new(OpenAIChatModel::new("sk-..."));
//!     let agent =
//!         ToolCallingAgent::from_registry(model, "gpt-4o-mini", &tools, ChatPrompt::default());
//!
//!     // Executor with session-keyed memory
//!     let executor = AgentExecutor::new(agent, tools);
//!     let session = executor.with_history(Arc::new(MemoryHistoryStore::new()));
//!
//!     let outcome = session.invoke("thread-1", "What is task decomposition?").await?;
//!     println!("{}", outcome.output);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! The crate is organized into these modules:
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`types`] | Core types: `Message`, `Role`, `ContentBlock`, `ToolDefinition`, run events |
//! | [`provider`] | Chat-model clients (OpenAI, Anthropic) with SSE streaming and model-id routing |
//! | [`prompt`] | System templates with variable slots; assembles the per-call message list |
//! | [`agent`] | Tool-calling agent and the executor loop that drives it |
//! | [`tool`] | Async tool trait and registry; web search and retriever tools |
//! | [`document`] | Web page loading and recursive character text splitting |
//! | [`embedding`] | Embedder trait with API-backed and deterministic lexical implementations |
//! | [`index`] | In-memory cosine vector index and the retriever over it |
//! | [`history`] | Session-keyed chat history stores: in-memory map and JSONL files |
//! | [`trace`] | Run tracing pipeline with pluggable sinks |
//! | [`config`] | Environment configuration: credentials, endpoints, model default |
//! | [`error`] | Error types with thiserror: Provider, RateLimited, Auth, etc. |
//! | [`versioning`] | Release versioning policy for the package family |
//!
//! ## The agent loop
//!
//! [`agent::AgentExecutor::run`] repeats a simple cycle:
//!
//! - Render history, the user input, and this run's scratchpad into one
//!   message list and stream a model turn, forwarding text deltas as events
//! - If the reply carries tool calls, execute each against the registry.
//!   Unknown tools and tool failures become error-flagged results rather
//!   than aborting the run
//! - Feed the results back through the scratchpad and go again, until the
//!   model answers in plain text or the iteration cap is reached
//!
//! Wrapping the executor with a history store makes runs session-keyed:
//! prior messages are loaded before each run, and the user input plus the
//! final reply are appended after. Histories are created lazily on first
//! use and never evicted.

pub mod agent;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod history;
pub mod index;
pub mod prompt;
pub mod provider;
pub mod tool;
pub mod trace;
pub mod types;
pub mod versioning;

pub use error::WeftError;
pub use types::*;
