//! Core domain + application logic for the Telegram webhook gateway.
//!
//! This crate is intentionally framework-agnostic. Telegram (teloxide) and the
//! tunnel broker (ngrok) live behind ports (traits) implemented in adapter crates.

pub mod config;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod logging;
pub mod messaging;
pub mod notify;
pub mod ports;

pub use errors::{Error, Result};
