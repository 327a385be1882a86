use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agent::{AgentError, AgentState};
use crate::Message;

/// Snapshot of a thread's state after one agent step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub thread_id: String,
    /// The checkpoint this one was derived from
    pub parent_id: Option<String>,
    /// Position in the thread, starting at 0
    pub step: u32,
    pub created_at: DateTime<Utc>,
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_response: Option<Value>,
}

impl Checkpoint {
    /// Create the checkpoint that follows `parent` for the given state
    pub fn next(thread_id: &str, parent: Option<&Checkpoint>, state: &AgentState) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            thread_id: thread_id.to_string(),
            parent_id: parent.map(|p| p.id.clone()),
            step: parent.map(|p| p.step + 1).unwrap_or(0),
            created_at: Utc::now(),
            messages: state.messages.clone(),
            structured_response: state.structured_response.clone(),
        }
    }

    /// The agent state this checkpoint holds
    pub fn state(&self) -> AgentState {
        AgentState {
            messages: self.messages.clone(),
            structured_response: self.structured_response.clone(),
        }
    }
}

/// Persists conversation state per thread
#[async_trait]
pub trait Checkpointer: Send + Sync {
    /// Latest checkpoint of a thread
    async fn get(&self, thread_id: &str) -> Result<Option<Checkpoint>, AgentError>;

    /// Store a checkpoint as the newest of its thread
    async fn put(&self, checkpoint: Checkpoint) -> Result<(), AgentError>;

    /// Checkpoints of a thread, newest first
    async fn list(&self, thread_id: &str, limit: Option<usize>) -> Result<Vec<Checkpoint>, AgentError>;

    /// Remove every checkpoint of a thread
    async fn delete_thread(&self, thread_id: &str) -> Result<(), AgentError>;
}
