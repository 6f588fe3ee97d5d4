//! Core domain + application logic for the conversation relay bot.
//!
//! This crate is intentionally framework-agnostic. Telegram / OpenAI / SQLite
//! live behind ports (traits) implemented in adapter crates.

pub mod config;
pub mod conversation;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod logging;
pub mod messaging;
pub mod model;
pub mod ports;
pub mod relay;

pub use errors::{Error, Result};
