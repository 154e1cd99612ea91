//! Dialog history model.

use serde::{Deserialize, Serialize};

/// Who wrote a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// How the message reached us.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Voice,
    Image,
}

/// One turn of a user's conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub user_id: u64,
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub kind: MessageKind,
    /// Unix timestamp in milliseconds, orders the history.
    pub created_at: i64,
}
