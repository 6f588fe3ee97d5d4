//! Upstream language-model port and its provider-agnostic types.

pub mod client;
pub mod types;
