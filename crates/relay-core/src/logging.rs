use std::{fs, fs::OpenOptions, path::Path, sync::Mutex};

use tracing_subscriber::{
    filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

use crate::{errors::Error, Result};

/// Initialize logging/tracing for the bot.
///
/// Console output defaults to `info` (override with `RUST_LOG`). When
/// `log_file` is given, a second plain-text layer appends everything at
/// `debug` and above to that file.
pub fn init(service_name: &str, log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "info,relay_core=info,relay_store=info,relay_openai=info,relay_telegram=info,{service_name}=info"
        ))
    });

    let console = fmt::layer()
        .with_target(true)
        .with_ansi(true)
        .with_filter(filter);

    let file = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            let f = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(f))
                    .with_filter(LevelFilter::DEBUG),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| Error::Config(format!("failed to initialize logging: {e}")))?;

    tracing::info!(service = service_name, "logging initialized");
    Ok(())
}
