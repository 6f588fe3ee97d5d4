use std::{sync::Arc, time::Duration};

use teloxide::types::{Message, User};
use tokio::{sync::oneshot, task::JoinHandle};
use tracing::{error, info, warn};

use relay_core::{
    domain::ChatId,
    errors::Error,
    messaging::{port::MessagingPort, types::ChatAction},
    relay::CommandInvocation,
};

use crate::router::AppState;

use super::commands::{display_name, reply};

/// Command label persisted with every relayed message.
pub(crate) const AI_COMMAND: &str = "/ai";

/// Telegram message ids are only unique per chat, so the stored id carries both.
pub(crate) fn stored_message_id(chat_id: i64, message_id: i32) -> String {
    format!("{chat_id}:{message_id}")
}

const TYPING_INTERVAL: Duration = Duration::from_secs(4);

/// Repeats the typing indicator until stopped.
struct Typing {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl Typing {
    /// `None` when the platform has no chat actions.
    fn start(messenger: Arc<dyn MessagingPort>, chat_id: ChatId) -> Option<Self> {
        if !messenger.capabilities().supports_chat_actions {
            return None;
        }

        let (stop, mut stop_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let mut tick = tokio::time::interval(TYPING_INTERVAL);
            loop {
                tokio::select! {
                  _ = tick.tick() => {
                    let _ = messenger.send_chat_action(chat_id, ChatAction::Typing).await;
                  }
                  _ = &mut stop_rx => break,
                }
            }
        });

        Some(Self { stop, task })
    }

    async fn stop(self) {
        let _ = self.stop.send(());
        let _ = self.task.await;
    }
}

pub(crate) async fn handle_ai(msg: &Message, user: &User, args: &str, state: Arc<AppState>) {
    let chat_id = ChatId(msg.chat.id.0);

    if args.trim().is_empty() {
        reply(&state, chat_id, "Usage: /ai <text>").await;
        return;
    }

    let invocation = CommandInvocation {
        chat_id,
        user_id: user.id.0.to_string(),
        username: display_name(user),
        message_id: stored_message_id(msg.chat.id.0, msg.id.0),
        command: AI_COMMAND.to_string(),
        text: msg.text().unwrap_or_default().to_string(),
    };

    let typing = Typing::start(state.messenger.clone(), chat_id);

    let result = state
        .relay
        .handle(&invocation, state.messenger.as_ref())
        .await;

    if let Some(typing) = typing {
        typing.stop().await;
    }

    match result {
        Ok(out) => info!(
            message_id = %invocation.message_id,
            response_id = %out.response_id,
            chunks = out.chunks_sent,
            fallback = out.used_fallback,
            "ai command completed"
        ),
        Err(Error::Cancelled(stage)) => {
            warn!(message_id = %invocation.message_id, %stage, "ai command cancelled by shutdown");
        }
        Err(err) => {
            error!(
                user_id = %invocation.user_id,
                message_id = %invocation.message_id,
                "ai command failed: {err}"
            );
            let msg_txt = err.to_string();
            let truncated = if msg_txt.chars().count() > 200 {
                format!("{}...", msg_txt.chars().take(200).collect::<String>())
            } else {
                msg_txt
            };
            reply(&state, chat_id, &format!("❌ Error: {truncated}")).await;
        }
    }
}
