//! Telegram update handlers.
//!
//! Only slash commands are handled; plain chat messages are ignored.

use std::sync::Arc;

use teloxide::{prelude::*, types::Message};

use crate::router::AppState;

mod admin;
mod ai;
mod commands;

pub async fn handle_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    match msg.text() {
        Some(text) if text.starts_with('/') => commands::handle_command(msg, state).await,
        _ => Ok(()),
    }
}
