//! Conversation threads: an append-only message log keyed by thread id.
//!
//! Threads are created implicitly by the first [`ConversationLog::append`]
//! and live until purged outside the application. There is no edit or
//! delete operation.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::{Message, Role};

/// Durable, append-only message log.
#[async_trait]
pub trait ConversationLog: Send + Sync {
    /// Append `message` to the end of `thread_id`.
    async fn append(&self, thread_id: &str, message: &Message) -> Result<()>;

    /// All messages of `thread_id` in insertion order; empty if unknown.
    async fn history(&self, thread_id: &str) -> Result<Vec<Message>>;

    /// Known thread ids, most recently active first.
    async fn threads(&self) -> Result<Vec<String>>;
}

/// The last `max_messages` human/assistant messages of `history`.
///
/// Tool messages are dropped; the generator only sees the dialogue.
pub fn recent_window(history: &[Message], max_messages: usize) -> Vec<Message> {
    let dialogue: Vec<&Message> = history
        .iter()
        .filter(|m| matches!(m.role, Role::Human | Role::Assistant))
        .collect();
    let skip = dialogue.len().saturating_sub(max_messages);
    dialogue.into_iter().skip(skip).cloned().collect()
}

/// In-memory log for tests and one-shot sessions.
#[derive(Default)]
pub struct InMemoryConversationLog {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    threads: HashMap<String, Vec<Message>>,
    // thread id → sequence number of its latest append, for ordering
    last_touch: HashMap<String, u64>,
    clock: u64,
}

impl InMemoryConversationLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationLog for InMemoryConversationLog {
    async fn append(&self, thread_id: &str, message: &Message) -> Result<()> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| anyhow!("conversation log lock poisoned"))?;
        inner.clock += 1;
        let now = inner.clock;
        inner
            .threads
            .entry(thread_id.to_string())
            .or_default()
            .push(message.clone());
        inner.last_touch.insert(thread_id.to_string(), now);
        Ok(())
    }

    async fn history(&self, thread_id: &str) -> Result<Vec<Message>> {
        let inner = self
            .inner
            .read()
            .map_err(|_| anyhow!("conversation log lock poisoned"))?;
        Ok(inner.threads.get(thread_id).cloned().unwrap_or_default())
    }

    async fn threads(&self) -> Result<Vec<String>> {
        let inner = self
            .inner
            .read()
            .map_err(|_| anyhow!("conversation log lock poisoned"))?;
        let mut ids: Vec<(&String, &u64)> = inner.last_touch.iter().collect();
        ids.sort_by(|a, b| b.1.cmp(a.1));
        Ok(ids.into_iter().map(|(id, _)| id.clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn history_preserves_insertion_order() {
        let log = InMemoryConversationLog::new();
        let msgs = [
            Message::human("Do I need a visa for India?"),
            Message::tool("visa_requirements_search", "Citizens of ..."),
            Message::assistant("Yes, a visa is required."),
        ];
        for m in &msgs {
            log.append("t1", m).await.unwrap();
        }
        assert_eq!(log.history("t1").await.unwrap(), msgs.to_vec());
    }

    #[tokio::test]
    async fn threads_do_not_interfere() {
        let log = InMemoryConversationLog::new();
        log.append("a", &Message::human("one")).await.unwrap();
        log.append("b", &Message::human("two")).await.unwrap();
        log.append("a", &Message::assistant("three")).await.unwrap();

        assert_eq!(log.history("a").await.unwrap().len(), 2);
        assert_eq!(log.history("b").await.unwrap(), vec![Message::human("two")]);
        assert!(log.history("missing").await.unwrap().is_empty());
        assert_eq!(log.threads().await.unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn window_keeps_latest_dialogue_only() {
        let history = vec![
            Message::human("h1"),
            Message::assistant("a1"),
            Message::tool("visa_requirements_search", "facts"),
            Message::human("h2"),
            Message::assistant("a2"),
            Message::human("h3"),
        ];
        let window = recent_window(&history, 3);
        let contents: Vec<_> = window.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["h2", "a2", "h3"]);

        assert_eq!(recent_window(&history, 100).len(), 5);
        assert!(recent_window(&history, 0).is_empty());
    }
}
