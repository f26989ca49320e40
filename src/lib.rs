//! Relays relevant posts from followed X accounts to a Telegram chat.

pub mod analysis;
pub mod config;
pub mod db;
pub mod error;
pub mod feed;
pub mod models;
pub mod notify;
pub mod pipeline;

pub use error::{AppError, Result};
