//! Session-keyed chat histories.
//!
//! A session id maps to an ordered transcript. Histories come into existence
//! the first time a session id is used and are kept for the lifetime of the
//! store, so repeat calls with the same id continue the same conversation.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::WeftResult;
use crate::types::Message;

/// Ordered transcript of one session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatHistory {
    pub messages: Vec<Message>,
}

impl ChatHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Keyed storage of chat histories
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// History for a session, created empty on first access
    async fn get(&self, session_id: &str) -> WeftResult<ChatHistory>;

    /// Append messages to a session's transcript
    async fn append(&self, session_id: &str, messages: &[Message]) -> WeftResult<()>;

    /// Ids of all sessions the store knows about
    async fn sessions(&self) -> WeftResult<Vec<String>>;
}

/// In-process history store backed by a concurrent map.
///
/// Nothing is ever evicted; the map lives as long as the store does.
pub struct MemoryHistoryStore {
    histories: DashMap<String, ChatHistory>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self {
            histories: DashMap::new(),
        }
    }
}

impl Default for MemoryHistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn get(&self, session_id: &str) -> WeftResult<ChatHistory> {
        let history = self
            .histories
            .entry(session_id.to_string())
            .or_default()
            .clone();
        Ok(history)
    }

    async fn append(&self, session_id: &str, messages: &[Message]) -> WeftResult<()> {
        let mut entry = self.histories.entry(session_id.to_string()).or_default();
        entry.messages.extend_from_slice(messages);
        Ok(())
    }

    async fn sessions(&self) -> WeftResult<Vec<String>> {
        let mut ids: Vec<String> = self.histories.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        Ok(ids)
    }
}

/// Durable history store, one JSONL transcript file per session.
pub struct JsonlHistoryStore {
    base_dir: PathBuf,
}

impl JsonlHistoryStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn history_path(&self, session_id: &str) -> PathBuf {
        self.base_dir.join(format!("{}.jsonl", sanitize_id(session_id)))
    }
}

/// Session ids become file names, so anything path-like is flattened
fn sanitize_id(session_id: &str) -> String {
    session_id
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[async_trait]
impl HistoryStore for JsonlHistoryStore {
    async fn get(&self, session_id: &str) -> WeftResult<ChatHistory> {
        let path = self.history_path(session_id);
        if !path.exists() {
            return Ok(ChatHistory::new());
        }

        let content = tokio::fs::read_to_string(&path).await?;
        let messages: Vec<Message> = content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect();
        Ok(ChatHistory { messages })
    }

    async fn append(&self, session_id: &str, messages: &[Message]) -> WeftResult<()> {
        tokio::fs::create_dir_all(&self.base_dir).await?;
        let path = self.history_path(session_id);

        let mut lines = String::new();
        for message in messages {
            lines.push_str(&serde_json::to_string(message)?);
            lines.push('\n');
        }

        use tokio::io::AsyncWriteExt;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(lines.as_bytes()).await?;
        Ok(())
    }

    async fn sessions(&self) -> WeftResult<Vec<String>> {
        if !self.base_dir.exists() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.base_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("jsonl") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}
