use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

/// Per-conversation state owned by the caller and lent to the orchestrator for each turn.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionContext {
    pub id: Uuid,
    pub history: Vec<ChatMessage>,
    pub created_at: DateTime<Utc>,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionContext {
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4())
    }

    pub fn with_id(id: Uuid) -> Self {
        Self { id, history: Vec::new(), created_at: Utc::now() }
    }

    pub fn record(&mut self, role: ChatRole, content: impl Into<String>) {
        self.history.push(ChatMessage { role, content: content.into() });
    }

    pub fn turns(&self) -> usize {
        self.history.iter().filter(|message| message.role == ChatRole::User).count()
    }
}
