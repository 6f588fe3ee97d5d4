use async_trait::async_trait;

use crate::Result;

use super::types::Generation;

/// Model client interface used by the relay.
///
/// Implementations return the upstream response id and its content segments
/// without interpreting them; fallback handling lives in the relay.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Model name, for logs.
    fn model(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<Generation>;
}
