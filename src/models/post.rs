use chrono::{DateTime, Utc};

/// A post as returned by a mirror, before it touches the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPost {
    pub tweet_id: String,
    pub url: String,
    pub text: String,
    pub image: Option<Vec<u8>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CachedPost {
    pub id: i64,
    pub follower_id: i64,
    pub tweet_id: String,
    pub url: String,
    pub content: String,
    pub image: Option<Vec<u8>>,
    pub created_at: DateTime<Utc>,
    pub inserted_at: DateTime<Utc>,
    pub is_analyzed: bool,
    pub analysis_result: Option<String>,
    pub is_relevant: Option<bool>,
    pub is_sent: bool,
    pub sent_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostState {
    New,
    Irrelevant,
    Relevant,
    Sent,
}

impl CachedPost {
    pub fn state(&self) -> PostState {
        match (self.is_analyzed, self.is_relevant, self.is_sent) {
            (false, _, _) => PostState::New,
            (true, _, true) => PostState::Sent,
            (true, Some(true), false) => PostState::Relevant,
            (true, _, false) => PostState::Irrelevant,
        }
    }
}
