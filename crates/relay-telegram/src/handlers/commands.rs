use std::sync::Arc;

use teloxide::{prelude::*, types::User};
use tracing::warn;

use relay_core::{domain::ChatId, formatting::split_message};

use crate::router::AppState;

use super::{admin, ai};

const HELP_TEXT: &str = "Commands:\n\
/ai <text> - ask the assistant\n\
/hello - say hello\n\
/help - show this message\n\
\n\
Admin only:\n\
/users - list known users\n\
/history <user_id> - messages of a user\n\
/message <message_id> - one message and its response\n\
/search <text> - find users by username";

pub(crate) fn parse_command(text: &str) -> (String, String) {
    // Telegram may send `/cmd@botname arg1 ...`
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

/// Name stored and shown for a Telegram user: the @handle, else the full name.
pub(crate) fn display_name(user: &User) -> String {
    user.username.clone().unwrap_or_else(|| user.full_name())
}

/// Send `text`, split to the configured chunk limit. Failures are logged only.
pub(crate) async fn reply(state: &AppState, chat_id: ChatId, text: &str) {
    let limit = state
        .cfg
        .chunk_limit
        .min(state.messenger.capabilities().max_message_len);
    for chunk in split_message(text, limit) {
        if let Err(e) = state.messenger.send_text(chat_id, &chunk).await {
            warn!(chat_id = chat_id.0, "failed to send reply: {e}");
            return;
        }
    }
}

pub async fn handle_command(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let Some(user) = msg.from() else {
        return Ok(());
    };

    let (cmd, args) = parse_command(text);
    let chat_id = ChatId(msg.chat.id.0);

    match cmd.as_str() {
        "start" | "help" => reply(&state, chat_id, HELP_TEXT).await,
        "hello" => {
            let greeting = format!("Hello, {}!", display_name(user));
            reply(&state, chat_id, &greeting).await;
        }
        "ai" => ai::handle_ai(&msg, user, &args, state.clone()).await,
        "users" | "history" | "message" | "search" => {
            if !state.cfg.is_admin(user.id.0 as i64) {
                warn!(user_id = user.id.0, command = %cmd, "non-admin used an admin command");
                reply(&state, chat_id, "This command is restricted to bot admins.").await;
                return Ok(());
            }
            let report = admin::report(state.store.as_ref(), &cmd, &args).await;
            reply(&state, chat_id, &report).await;
        }
        _ => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_command() {
        assert_eq!(
            parse_command("/ai what is rust?"),
            ("ai".to_string(), "what is rust?".to_string())
        );
    }

    #[test]
    fn strips_bot_mention_and_lowercases() {
        assert_eq!(
            parse_command("/History@relay_bot  12345 "),
            ("history".to_string(), "12345".to_string())
        );
    }

    #[test]
    fn command_without_args() {
        assert_eq!(parse_command("/users"), ("users".to_string(), String::new()));
    }
}
