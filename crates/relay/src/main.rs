use std::{fmt::Display, sync::Arc};

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use relay_core::{config::Config, relay::ConversationRelay};
use relay_openai::OpenAiClient;
use relay_store::SqliteConversationStore;

#[tokio::main]
async fn main() -> Result<(), relay_core::Error> {
    let cfg = Arc::new(Config::load()?);
    relay_core::logging::init("relay", cfg.log_file.as_deref())?;

    let store = Arc::new(SqliteConversationStore::connect(&cfg.database_url).await?);
    info!(database_url = %cfg.database_url, "conversation store ready");

    let model = Arc::new(OpenAiClient::new(
        cfg.openai_api_key.clone(),
        cfg.openai_model.clone(),
        cfg.openai_base_url.clone(),
        cfg.openai_timeout,
    )?);
    info!(model = %cfg.openai_model, "model client ready");

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    let relay = Arc::new(ConversationRelay::new(
        model,
        store.clone(),
        cfg.chunk_limit,
        shutdown.clone(),
    ));

    let outcome = relay_telegram::router::run_polling(cfg, relay, shutdown.clone()).await;
    stop(outcome, &shutdown, &store).await;

    Ok(())
}

/// Log a polling failure, then stop in order: cancel in-flight work, close the
/// store.
async fn stop<E: Display>(
    outcome: Result<(), E>,
    shutdown: &CancellationToken,
    store: &SqliteConversationStore,
) {
    if let Err(e) = outcome {
        error!("telegram bot failed: {e:#}");
    }
    shutdown.cancel();

    info!("bot has stopped");
    store.close().await;
}

/// Cancel `token` on Ctrl+C or SIGTERM.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
        () = token.cancelled() => return,
    }

    info!("received shutdown signal");
    token.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn polling_failure_still_stops_in_order() {
        let store = SqliteConversationStore::connect("sqlite::memory:")
            .await
            .unwrap();
        let shutdown = CancellationToken::new();

        stop(Err("network unreachable"), &shutdown, &store).await;

        assert!(shutdown.is_cancelled());
        assert!(store.pool().is_closed());
    }
}
