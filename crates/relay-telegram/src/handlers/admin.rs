//! Read-only inspection commands over the conversation store.

use tracing::error;

use relay_core::{
    formatting::{format_conversation, format_history, format_user_summaries, format_users},
    ports::ConversationStore,
};

/// Run an admin command and render its result (or the failure) as text.
pub(crate) async fn report(store: &dyn ConversationStore, cmd: &str, args: &str) -> String {
    let arg = args.split_whitespace().next().unwrap_or("");

    let result = match cmd {
        "users" => store
            .list_users()
            .await
            .map(|users| format_user_summaries(&users)),
        "history" if arg.is_empty() => return "Usage: /history <user_id>".to_string(),
        "history" => store
            .list_messages_for_user(arg)
            .await
            .map(|records| format_history(arg, &records)),
        "message" if arg.is_empty() => return "Usage: /message <message_id>".to_string(),
        "message" => store.get_message(arg).await.map(|record| match record {
            Some(r) => format_conversation(&r),
            None => format!("Message {arg} not found."),
        }),
        "search" if args.trim().is_empty() => return "Usage: /search <text>".to_string(),
        "search" => store
            .search_users_by_username(args.trim())
            .await
            .map(|users| format_users(&users)),
        other => return format!("Unknown command: /{other}"),
    };

    result.unwrap_or_else(|e| {
        error!(command = cmd, "admin command failed: {e}");
        format!("❌ Error: {e}")
    })
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use relay_core::{
        conversation::{ConversationRecord, NewConversation, RecordOutcome, User, UserSummary},
        errors::Error,
        Result,
    };

    use super::*;

    /// Store with no rows whose user listing always fails.
    struct EmptyStore;

    #[async_trait]
    impl ConversationStore for EmptyStore {
        async fn record_conversation(&self, _turn: &NewConversation) -> Result<RecordOutcome> {
            Ok(RecordOutcome { user_created: true })
        }

        async fn list_users(&self) -> Result<Vec<UserSummary>> {
            Err(Error::Storage("database is locked".to_string()))
        }

        async fn list_messages_for_user(&self, _user_id: &str) -> Result<Vec<ConversationRecord>> {
            Ok(Vec::new())
        }

        async fn get_message(&self, _message_id: &str) -> Result<Option<ConversationRecord>> {
            Ok(None)
        }

        async fn search_users_by_username(&self, _query: &str) -> Result<Vec<User>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn requires_arguments() {
        assert_eq!(
            report(&EmptyStore, "history", "").await,
            "Usage: /history <user_id>"
        );
        assert_eq!(
            report(&EmptyStore, "message", "  ").await,
            "Usage: /message <message_id>"
        );
        assert_eq!(report(&EmptyStore, "search", "").await, "Usage: /search <text>");
    }

    #[tokio::test]
    async fn reports_empty_results() {
        assert_eq!(
            report(&EmptyStore, "history", "42").await,
            "No messages for user 42."
        );
        assert_eq!(
            report(&EmptyStore, "message", "7:1").await,
            "Message 7:1 not found."
        );
        assert_eq!(
            report(&EmptyStore, "search", "ann").await,
            "No matching users."
        );
    }

    #[tokio::test]
    async fn surfaces_store_errors() {
        let out = report(&EmptyStore, "users", "").await;
        assert!(out.starts_with("❌ Error:"));
        assert!(out.contains("database is locked"));
    }
}
