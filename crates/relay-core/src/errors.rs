/// Core error type for the relay bot.
///
/// Adapter crates map their specific errors (sqlx, reqwest, teloxide) into this
/// type so the handlers can report failures consistently.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage error: {0}")]
    Storage(String),

    /// A message or response id that already exists was written again.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("external error: {0}")]
    External(String),

    #[error("operation cancelled: {0}")]
    Cancelled(String),
}

pub type Result<T> = std::result::Result<T, Error>;
