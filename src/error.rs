use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("all {attempts} mirrors failed for @{handle}")]
    AllMirrorsExhausted { handle: String, attempts: usize },

    #[error("post {tweet_id} already cached for follower {follower_id}")]
    DuplicateKey { follower_id: i64, tweet_id: String },

    #[error("analysis unavailable: {0}")]
    AnalysisUnavailable(String),

    #[error("delivery failed: {0}")]
    DeliveryFailed(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{provider} backend error: {message}")]
    AiBackend {
        provider: &'static str,
        message: String,
        retryable: bool,
    },

    #[error("Database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Feed parse error: {0}")]
    FeedParse(#[from] feed_rs::parser::ParseFeedError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Errors worth retrying later: nothing about the request itself was wrong.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::AllMirrorsExhausted { .. }
            | AppError::AnalysisUnavailable(_)
            | AppError::DeliveryFailed(_) => true,
            AppError::AiBackend { retryable, .. } => *retryable,
            AppError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
