mod fetcher;
mod parser;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::RawPost;

pub use fetcher::{MirrorFetcher, MAX_IMAGE_BYTES};
pub use parser::canonical_status_url;

/// Source of an account's recent posts.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Up to `limit` posts, newest first. Fails with `AllMirrorsExhausted`
    /// when no source could produce a usable feed.
    async fn fetch_recent(&self, handle: &str, limit: usize) -> Result<Vec<RawPost>>;
}
