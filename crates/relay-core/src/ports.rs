use async_trait::async_trait;

use crate::{
    conversation::{ConversationRecord, NewConversation, RecordOutcome, User, UserSummary},
    Result,
};

/// Repository port for the conversation log.
///
/// Each call is its own unit of work; nothing is shared between calls.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Persist one user/message/response triple atomically.
    ///
    /// The user row is created only if the id is unseen; an existing user's
    /// username is left untouched. Reusing a message or response id fails with
    /// [`crate::Error::Conflict`].
    async fn record_conversation(&self, turn: &NewConversation) -> Result<RecordOutcome>;

    async fn list_users(&self) -> Result<Vec<UserSummary>>;

    /// Messages owned by `user_id`. Unknown users yield an empty list.
    async fn list_messages_for_user(&self, user_id: &str) -> Result<Vec<ConversationRecord>>;

    /// Unknown ids yield `None`.
    async fn get_message(&self, message_id: &str) -> Result<Option<ConversationRecord>>;

    /// Case-insensitive substring match on usernames.
    async fn search_users_by_username(&self, query: &str) -> Result<Vec<User>>;
}
