//! The conversation transcript and its durable mirror.

use services::{KeyValueStore, StorageError};
use shared::{HistoryTurn, Message};
use std::sync::Arc;

struct Durable {
    storage: Arc<dyn KeyValueStore>,
    key: String,
}

/// Append-only transcript, optionally mirrored to a key-value store
pub struct MessageStore {
    messages: Vec<Message>,
    durable: Option<Durable>,
}

impl MessageStore {
    /// Transcript that lives only as long as the process.
    pub fn ephemeral() -> Self {
        Self {
            messages: Vec::new(),
            durable: None,
        }
    }

    /// Transcript mirrored under `key`; restored immediately.
    pub fn durable(storage: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        let mut store = Self {
            messages: Vec::new(),
            durable: Some(Durable {
                storage,
                key: key.into(),
            }),
        };
        store.restore();
        store
    }

    pub fn is_durable(&self) -> bool {
        self.durable.is_some()
    }

    /// Returns the index of the new entry.
    pub fn append(&mut self, message: Message) -> usize {
        self.messages.push(message);
        self.messages.len() - 1
    }

    /// Drop the loading placeholder, if any. Returns whether one was removed.
    pub fn remove_transient(&mut self) -> bool {
        let before = self.messages.len();
        self.messages.retain(|m| !m.is_transient());
        before != self.messages.len()
    }

    pub fn has_transient(&self) -> bool {
        self.messages.iter().any(Message::is_transient)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn history(&self) -> Vec<HistoryTurn> {
        HistoryTurn::from_transcript(&self.messages)
    }

    /// Write every non-transient entry to storage. No-op for an ephemeral
    /// store.
    ///
    /// Error entries are written too, so a restored transcript matches the
    /// one that was shown. Callers decide when to write: an error reply on
    /// its own does not trigger a write.
    pub fn persist(&self) -> Result<(), StorageError> {
        let Some(durable) = &self.durable else {
            return Ok(());
        };
        let kept: Vec<&Message> = self.messages.iter().filter(|m| !m.is_transient()).collect();
        // Serializing plain data with string keys cannot fail.
        let json = serde_json::to_string(&kept).unwrap_or_else(|_| "[]".to_string());
        durable.storage.set(&durable.key, &json)?;
        tracing::debug!(key = %durable.key, messages = kept.len(), "transcript persisted");
        Ok(())
    }

    /// Replace the transcript with the stored one. Missing, unreadable or
    /// malformed data gives an empty transcript. Returns the restored length.
    pub fn restore(&mut self) -> usize {
        let Some(durable) = &self.durable else {
            return self.messages.len();
        };

        let raw = match durable.storage.get(&durable.key) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(key = %durable.key, error = %e, "could not read stored transcript");
                None
            }
        };

        self.messages = match raw {
            None => Vec::new(),
            Some(raw) => match serde_json::from_str::<Vec<Message>>(&raw) {
                Ok(mut messages) => {
                    messages.retain(|m| !m.is_transient());
                    messages
                }
                Err(e) => {
                    tracing::warn!(key = %durable.key, error = %e, "discarding malformed stored transcript");
                    Vec::new()
                }
            },
        };
        self.messages.len()
    }

    /// Start a new session: clear the transcript and durable copy, then add the
    /// boundary marker. Returns the marker's index.
    pub fn reset(&mut self) -> usize {
        self.messages.clear();
        if let Some(durable) = &self.durable {
            if let Err(e) = durable.storage.remove(&durable.key) {
                tracing::warn!(key = %durable.key, error = %e, "could not clear stored transcript");
            }
        }
        self.append(Message::boundary())
    }
}
