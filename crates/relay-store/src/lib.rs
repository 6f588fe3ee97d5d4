//! Conversation store over SQLite.
//!
//! ## Modules
//!
//! - [`pool`] – connection pool setup and schema creation
//! - [`store`] – `SqliteConversationStore`, the `ConversationStore` implementation

mod pool;
mod store;

pub use pool::connect_pool;
pub use store::SqliteConversationStore;
