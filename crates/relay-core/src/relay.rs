//! Conversation relay: prompt the upstream model, persist the turn, send the
//! reply back in platform-sized chunks.

use std::{future::Future, sync::Arc};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    conversation::NewConversation,
    domain::ChatId,
    errors::Error,
    formatting::render_blocks,
    messaging::port::MessagingPort,
    model::client::ModelClient,
    ports::ConversationStore,
    Result,
};

/// User-visible text used whenever the upstream output cannot be read.
pub const FALLBACK_REPLY: &str = "Sorry, I couldn't process the response properly.";

/// One inbound command invocation, already validated by the platform adapter.
#[derive(Clone, Debug)]
pub struct CommandInvocation {
    pub chat_id: ChatId,
    pub user_id: String,
    pub username: String,
    pub message_id: String,
    pub command: String,
    pub text: String,
}

/// What a completed relay produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelayOutcome {
    pub response_id: String,
    pub used_fallback: bool,
    pub user_created: bool,
    pub chunks_sent: usize,
}

pub struct ConversationRelay {
    model: Arc<dyn ModelClient>,
    store: Arc<dyn ConversationStore>,
    chunk_limit: usize,
    shutdown: CancellationToken,
}

impl ConversationRelay {
    pub fn new(
        model: Arc<dyn ModelClient>,
        store: Arc<dyn ConversationStore>,
        chunk_limit: usize,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            model,
            store,
            chunk_limit: chunk_limit.max(1),
            shutdown,
        }
    }

    pub fn store(&self) -> Arc<dyn ConversationStore> {
        self.store.clone()
    }

    /// Prompt sent upstream: the username followed by the raw message.
    pub fn build_prompt(username: &str, text: &str) -> String {
        format!("User: {username} | {text}")
    }

    /// Handle one `/ai` invocation end to end.
    ///
    /// Suspends at the upstream call and at the store write; both race the
    /// shutdown token and fail with [`Error::Cancelled`] once it fires.
    pub async fn handle(
        &self,
        cmd: &CommandInvocation,
        messenger: &dyn MessagingPort,
    ) -> Result<RelayOutcome> {
        info!(
            user_id = %cmd.user_id,
            username = %cmd.username,
            chat_id = cmd.chat_id.0,
            message_id = %cmd.message_id,
            model = self.model.model(),
            "relaying message upstream"
        );

        let prompt = Self::build_prompt(&cmd.username, &cmd.text);
        let generation = self
            .until_shutdown("upstream call", self.model.generate(&prompt))
            .await?;
        debug!(?generation, "upstream generation");

        let (content, used_fallback) = match generation.primary_text() {
            Some(text) => (text.to_string(), false),
            None => {
                warn!(
                    response_id = %generation.response_id,
                    "upstream output missing text, using fallback reply"
                );
                (FALLBACK_REPLY.to_string(), true)
            }
        };

        let turn = NewConversation {
            user_id: cmd.user_id.clone(),
            username: cmd.username.clone(),
            message_id: cmd.message_id.clone(),
            command: cmd.command.clone(),
            user_text: cmd.text.clone(),
            response_id: generation.response_id.clone(),
            response_text: content,
        };
        let recorded = self
            .until_shutdown("conversation write", self.store.record_conversation(&turn))
            .await?;

        let limit = self
            .chunk_limit
            .min(messenger.capabilities().max_message_len.max(1));
        let mut outbound = render_blocks(&generation.blocks, limit);
        if outbound.is_empty() {
            outbound.push(FALLBACK_REPLY.to_string());
        }

        let mut chunks_sent = 0usize;
        for chunk in &outbound {
            messenger.send_text(cmd.chat_id, chunk).await?;
            chunks_sent += 1;
        }

        Ok(RelayOutcome {
            response_id: generation.response_id,
            used_fallback,
            user_created: recorded.user_created,
            chunks_sent,
        })
    }

    async fn until_shutdown<T>(
        &self,
        what: &str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::select! {
            res = fut => res,
            _ = self.shutdown.cancelled() => {
                warn!(stage = what, "shutdown requested, abandoning in-flight work");
                Err(Error::Cancelled(what.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;

    use super::*;
    use crate::{
        conversation::{ConversationRecord, RecordOutcome, User, UserSummary},
        domain::{MessageId, MessageRef},
        messaging::types::{ChatAction, MessagingCapabilities},
        model::types::{ContentBlock, Generation},
    };

    struct FakeModel {
        blocks: Vec<ContentBlock>,
        hang: bool,
    }

    #[async_trait]
    impl ModelClient for FakeModel {
        fn model(&self) -> &str {
            "fake"
        }

        async fn generate(&self, _prompt: &str) -> Result<Generation> {
            if self.hang {
                std::future::pending::<()>().await;
            }
            Ok(Generation {
                response_id: "resp_1".to_string(),
                blocks: self.blocks.clone(),
            })
        }
    }

    #[derive(Default)]
    struct FakeStore {
        turns: Mutex<Vec<NewConversation>>,
    }

    #[async_trait]
    impl ConversationStore for FakeStore {
        async fn record_conversation(&self, turn: &NewConversation) -> Result<RecordOutcome> {
            let mut turns = self.turns.lock().unwrap();
            if turns.iter().any(|t| t.message_id == turn.message_id) {
                return Err(Error::Conflict(turn.message_id.clone()));
            }
            let user_created = !turns.iter().any(|t| t.user_id == turn.user_id);
            turns.push(turn.clone());
            Ok(RecordOutcome { user_created })
        }

        async fn list_users(&self) -> Result<Vec<UserSummary>> {
            Ok(Vec::new())
        }

        async fn list_messages_for_user(&self, _user_id: &str) -> Result<Vec<ConversationRecord>> {
            Ok(Vec::new())
        }

        async fn get_message(&self, _message_id: &str) -> Result<Option<ConversationRecord>> {
            Ok(None)
        }

        async fn search_users_by_username(&self, _query: &str) -> Result<Vec<User>> {
            Ok(vec![User {
                user_id: "1".to_string(),
                username: "ann".to_string(),
                creation_time: Utc::now(),
            }])
        }
    }

    struct FakeMessenger {
        max_len: usize,
        sent: Mutex<Vec<String>>,
    }

    impl FakeMessenger {
        fn new(max_len: usize) -> Self {
            Self {
                max_len,
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl MessagingPort for FakeMessenger {
        fn capabilities(&self) -> MessagingCapabilities {
            MessagingCapabilities {
                supports_chat_actions: false,
                max_message_len: self.max_len,
            }
        }

        async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef> {
            let mut sent = self.sent.lock().unwrap();
            sent.push(text.to_string());
            Ok(MessageRef {
                chat_id,
                message_id: MessageId(sent.len() as i32),
            })
        }

        async fn send_chat_action(&self, _chat_id: ChatId, _action: ChatAction) -> Result<()> {
            Ok(())
        }
    }

    fn invocation(message_id: &str) -> CommandInvocation {
        CommandInvocation {
            chat_id: ChatId(10),
            user_id: "42".to_string(),
            username: "ann".to_string(),
            message_id: message_id.to_string(),
            command: "/ai".to_string(),
            text: "/ai hello".to_string(),
        }
    }

    fn relay(model: FakeModel, store: Arc<FakeStore>, token: CancellationToken) -> ConversationRelay {
        ConversationRelay::new(Arc::new(model), store, 2000, token)
    }

    #[test]
    fn builds_prompt_with_username() {
        assert_eq!(
            ConversationRelay::build_prompt("ann", "/ai hi"),
            "User: ann | /ai hi"
        );
    }

    #[tokio::test]
    async fn records_and_sends_reply() {
        let store = Arc::new(FakeStore::default());
        let model = FakeModel {
            blocks: vec![ContentBlock::new("output_text", "hi there")],
            hang: false,
        };
        let relay = relay(model, store.clone(), CancellationToken::new());
        let messenger = FakeMessenger::new(4096);

        let out = relay.handle(&invocation("m1"), &messenger).await.unwrap();

        assert_eq!(out.response_id, "resp_1");
        assert!(!out.used_fallback);
        assert!(out.user_created);
        assert_eq!(out.chunks_sent, 1);
        assert_eq!(*messenger.sent.lock().unwrap(), vec!["hi there".to_string()]);

        let turns = store.turns.lock().unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].response_text, "hi there");
        assert_eq!(turns[0].user_text, "/ai hello");
    }

    #[tokio::test]
    async fn malformed_output_falls_back() {
        let store = Arc::new(FakeStore::default());
        let model = FakeModel {
            blocks: vec![],
            hang: false,
        };
        let relay = relay(model, store.clone(), CancellationToken::new());
        let messenger = FakeMessenger::new(4096);

        let out = relay.handle(&invocation("m1"), &messenger).await.unwrap();

        assert!(out.used_fallback);
        assert_eq!(
            *messenger.sent.lock().unwrap(),
            vec![FALLBACK_REPLY.to_string()]
        );
        assert_eq!(store.turns.lock().unwrap()[0].response_text, FALLBACK_REPLY);
    }

    #[tokio::test]
    async fn respects_messenger_limit() {
        let store = Arc::new(FakeStore::default());
        let model = FakeModel {
            blocks: vec![ContentBlock::new("output_text", "y".repeat(25))],
            hang: false,
        };
        let relay = relay(model, store, CancellationToken::new());
        let messenger = FakeMessenger::new(10);

        let out = relay.handle(&invocation("m1"), &messenger).await.unwrap();

        assert_eq!(out.chunks_sent, 3);
        let sent = messenger.sent.lock().unwrap();
        assert!(sent.iter().all(|c| c.chars().count() <= 10));
        assert_eq!(sent.concat(), "y".repeat(25));
    }

    #[tokio::test]
    async fn duplicate_message_id_propagates_conflict() {
        let store = Arc::new(FakeStore::default());
        let model = FakeModel {
            blocks: vec![ContentBlock::new("output_text", "ok")],
            hang: false,
        };
        let relay = relay(model, store, CancellationToken::new());
        let messenger = FakeMessenger::new(4096);

        relay.handle(&invocation("m1"), &messenger).await.unwrap();
        let err = relay.handle(&invocation("m1"), &messenger).await.unwrap_err();

        assert!(matches!(err, Error::Conflict(_)));
        assert_eq!(messenger.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn shutdown_cancels_pending_upstream_call() {
        let store = Arc::new(FakeStore::default());
        let model = FakeModel {
            blocks: vec![],
            hang: true,
        };
        let token = CancellationToken::new();
        let relay = relay(model, store.clone(), token.clone());
        let messenger = FakeMessenger::new(4096);

        token.cancel();
        let err = relay.handle(&invocation("m1"), &messenger).await.unwrap_err();

        assert!(matches!(err, Error::Cancelled(_)));
        assert!(store.turns.lock().unwrap().is_empty());
        assert!(messenger.sent.lock().unwrap().is_empty());
    }
}
