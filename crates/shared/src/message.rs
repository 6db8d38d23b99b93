//! Conversation entries and their wire representation.

use serde::{Deserialize, Serialize};

/// Who (or what) produced a transcript entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    /// Backend-reported or locally surfaced failure
    Error,
    /// Transient "typing" placeholder, never persisted
    Loading,
    /// Marker inserted when a new session starts
    Boundary,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Error => "error",
            Role::Loading => "loading",
            Role::Boundary => "boundary",
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Role::Loading)
    }

    /// Roles that form the conversation sent back to the model.
    pub fn is_conversational(&self) -> bool {
        matches!(self, Role::User | Role::Assistant)
    }
}

/// Token accounting reported by completion endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// A single transcript entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            model: None,
            usage: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self::new(Role::Error, content)
    }

    pub fn loading() -> Self {
        Self::new(Role::Loading, "")
    }

    pub fn boundary() -> Self {
        Self::new(Role::Boundary, "New session started")
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn is_transient(&self) -> bool {
        self.role.is_transient()
    }
}

/// `{role, content}` pair sent as the `history` field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: Role,
    pub content: String,
}

impl HistoryTurn {
    /// Project a transcript onto the turns the backend understands.
    pub fn from_transcript(messages: &[Message]) -> Vec<HistoryTurn> {
        messages
            .iter()
            .filter(|m| m.role.is_conversational())
            .map(|m| HistoryTurn {
                role: m.role,
                content: m.content.clone(),
            })
            .collect()
    }
}
