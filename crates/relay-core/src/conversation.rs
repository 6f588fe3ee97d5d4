//! Conversation log data model: users own messages, a message owns at most
//! one response.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A platform user, created on first sight and never updated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct User {
    pub user_id: String,
    pub username: String,
    pub creation_time: DateTime<Utc>,
}

/// Lightweight user listing row with the number of messages the user owns.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UserSummary {
    pub user_id: String,
    pub username: String,
    pub creation_time: DateTime<Utc>,
    pub message_count: i64,
}

/// A stored message joined with its response (if any).
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConversationRecord {
    pub message_id: String,
    pub user_id: String,
    pub command: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub response_id: Option<String>,
    pub response_content: Option<String>,
}

/// Everything needed to persist one conversation turn.
#[derive(Clone, Debug)]
pub struct NewConversation {
    pub user_id: String,
    pub username: String,
    pub message_id: String,
    pub command: String,
    pub user_text: String,
    pub response_id: String,
    pub response_text: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordOutcome {
    /// True when this call created the user row.
    pub user_created: bool,
}
