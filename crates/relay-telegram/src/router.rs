use std::{fmt::Display, sync::Arc, time::Duration};

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use relay_core::{
    config::Config, messaging::port::MessagingPort, ports::ConversationStore,
    relay::ConversationRelay,
};

use crate::handlers;
use crate::TelegramMessenger;

/// Dependencies shared by every update handler.
#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub relay: Arc<ConversationRelay>,
    pub store: Arc<dyn ConversationStore>,
    pub messenger: Arc<dyn MessagingPort>,
}

/// How often a shutdown request is retried while the dispatcher is still starting.
const SHUTDOWN_RETRY: Duration = Duration::from_millis(50);

/// Call `attempt` until it succeeds, sleeping `every` between failures.
pub(crate) async fn retry_until_ok<T, E: Display>(
    mut attempt: impl FnMut() -> std::result::Result<T, E>,
    every: Duration,
) -> T {
    loop {
        match attempt() {
            Ok(v) => return v,
            Err(e) => {
                debug!("retrying shutdown: {e}");
                tokio::time::sleep(every).await;
            }
        }
    }
}

/// Long-poll Telegram until `shutdown` fires.
pub async fn run_polling(
    cfg: Arc<Config>,
    relay: Arc<ConversationRelay>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    let me = bot.get_me().await?;
    if shutdown.is_cancelled() {
        info!("shutdown requested before polling started");
        return Ok(());
    }
    info!(
        username = %me.username(),
        bot_id = me.id.0,
        admins = cfg.admin_user_ids.len(),
        "logged in"
    );

    let messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let state = Arc::new(AppState {
        cfg,
        store: relay.store(),
        relay,
        messenger,
    });

    let handler = dptree::entry().branch(Update::filter_message().endpoint(handlers::handle_message));

    let mut dispatcher = Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build();

    let token = dispatcher.shutdown_token();
    let watcher = tokio::spawn(async move {
        shutdown.cancelled().await;
        // Fails with IdleShutdownError until dispatch() has started.
        let done = retry_until_ok(|| token.shutdown(), SHUTDOWN_RETRY).await;
        done.await;
    });

    dispatcher.dispatch().await;
    watcher.abort();
    info!("dispatcher stopped");

    Ok(())
}
