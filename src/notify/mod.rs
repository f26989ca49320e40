mod format;
mod telegram;

use async_trait::async_trait;

use crate::error::Result;

pub use format::{escape_html, format_message, CAPTION_LIMIT, MESSAGE_LIMIT};
pub use telegram::TelegramNotifier;

/// Delivers a formatted message to the configured destination.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Fails with `DeliveryFailed`; retrying across runs is the caller's call.
    async fn send(&self, message: &str, image: Option<&[u8]>) -> Result<()>;
}
