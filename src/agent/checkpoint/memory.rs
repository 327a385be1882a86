use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{Checkpoint, Checkpointer};
use crate::agent::AgentError;

/// Checkpointer that keeps every thread in process memory
///
/// Clones share the same storage.
#[derive(Clone, Default)]
pub struct InMemorySaver {
    threads: Arc<RwLock<HashMap<String, Vec<Checkpoint>>>>,
    history_limit: Option<usize>,
}

impl InMemorySaver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `limit` checkpoints per thread, dropping the oldest
    pub fn with_history_limit(limit: usize) -> Self {
        Self {
            threads: Arc::default(),
            history_limit: Some(limit.max(1)),
        }
    }

    /// Ids of all threads with at least one checkpoint
    pub async fn thread_ids(&self) -> Vec<String> {
        let threads = self.threads.read().await;
        let mut ids: Vec<String> = threads.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl Checkpointer for InMemorySaver {
    async fn get(&self, thread_id: &str) -> Result<Option<Checkpoint>, AgentError> {
        let threads = self.threads.read().await;
        Ok(threads.get(thread_id).and_then(|history| history.last().cloned()))
    }

    async fn put(&self, checkpoint: Checkpoint) -> Result<(), AgentError> {
        let mut threads = self.threads.write().await;
        let history = threads.entry(checkpoint.thread_id.clone()).or_default();
        history.push(checkpoint);

        if let Some(limit) = self.history_limit {
            if history.len() > limit {
                let excess = history.len() - limit;
                history.drain(..excess);
            }
        }
        Ok(())
    }

    async fn list(&self, thread_id: &str, limit: Option<usize>) -> Result<Vec<Checkpoint>, AgentError> {
        let threads = self.threads.read().await;
        let history = match threads.get(thread_id) {
            Some(history) => history,
            None => return Ok(Vec::new()),
        };
        Ok(history
            .iter()
            .rev()
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<(), AgentError> {
        self.threads.write().await.remove(thread_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentState;
    use crate::Message;

    fn state(text: &str) -> AgentState {
        AgentState {
            messages: vec![Message::user(text)],
            structured_response: None,
        }
    }

    #[tokio::test]
    async fn test_history_limit_drops_oldest() {
        let saver = InMemorySaver::with_history_limit(2);
        let first = Checkpoint::next("t", None, &state("a"));
        let second = Checkpoint::next("t", Some(&first), &state("b"));
        let third = Checkpoint::next("t", Some(&second), &state("c"));

        for checkpoint in [first, second, third.clone()] {
            saver.put(checkpoint).await.unwrap();
        }

        let history = saver.list("t", None).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0], third);
        assert_eq!(saver.thread_ids().await, vec!["t".to_string()]);
    }
}
