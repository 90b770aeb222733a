//! Question and conversation turn domain types.
//!
//! These are the value objects that flow through a request:
//! the client asks a [`Question`] → the pipeline records it as a user
//! [`ConversationTurn`] → the answer is recorded as an assistant turn.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for one gateway request, used for log correlation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a prompt segment sent to the completion model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Static policy instructions
    System,
    /// The end user
    User,
    /// The model
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// The author of a stored conversation turn. System text is configuration
/// and is never stored, so it has no variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
        }
    }

    /// Parse the stored representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(TurnRole::User),
            "assistant" => Some(TurnRole::Assistant),
            _ => None,
        }
    }
}

impl From<TurnRole> for Role {
    fn from(role: TurnRole) -> Self {
        match role {
            TurnRole::User => Role::User,
            TurnRole::Assistant => Role::Assistant,
        }
    }
}

/// An accepted question. Immutable once constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub text: String,
    pub user_id: String,
    pub chat_id: String,
    pub request_id: RequestId,
}

impl Question {
    /// Create a question with a fresh request id.
    pub fn new(
        text: impl Into<String>,
        user_id: impl Into<String>,
        chat_id: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            user_id: user_id.into(),
            chat_id: chat_id.into(),
            request_id: RequestId::new(),
        }
    }
}

/// One message of a user's dialogue. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub user_id: String,
    pub chat_id: String,
    pub role: TurnRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    /// A user turn stamped with the current time.
    pub fn user(
        user_id: impl Into<String>,
        chat_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::at(user_id, chat_id, TurnRole::User, content, Utc::now())
    }

    /// An assistant turn stamped with the current time.
    pub fn assistant(
        user_id: impl Into<String>,
        chat_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::at(user_id, chat_id, TurnRole::Assistant, content, Utc::now())
    }

    /// A turn with an explicit timestamp.
    pub fn at(
        user_id: impl Into<String>,
        chat_id: impl Into<String>,
        role: TurnRole,
        content: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            chat_id: chat_id.into(),
            role,
            content: content.into(),
            timestamp,
        }
    }
}
