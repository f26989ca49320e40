pub const SCHEMA: &str = r#"
-- followers table
CREATE TABLE IF NOT EXISTS followers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    enabled BOOLEAN DEFAULT 1
);

-- tweets_cache table
CREATE TABLE IF NOT EXISTS tweets_cache (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    follower_id INTEGER REFERENCES followers(id),
    tweet_id TEXT,
    tweet_url TEXT,
    tweet_content TEXT,
    tweet_image BLOB,
    created_at DATETIME,
    inserted_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    is_analyzed BOOLEAN DEFAULT 0,
    analysis_result TEXT,
    is_relevant BOOLEAN,
    is_sent_to_telegram BOOLEAN DEFAULT 0,
    sent_at DATETIME
);

CREATE INDEX IF NOT EXISTS idx_tweet_id ON tweets_cache(tweet_id);
CREATE INDEX IF NOT EXISTS idx_follower_id ON tweets_cache(follower_id);
CREATE INDEX IF NOT EXISTS idx_is_analyzed ON tweets_cache(is_analyzed);
CREATE INDEX IF NOT EXISTS idx_is_sent ON tweets_cache(is_sent_to_telegram);

-- dedup key
CREATE UNIQUE INDEX IF NOT EXISTS idx_tweets_cache_dedup ON tweets_cache(follower_id, tweet_id);
"#;

/// Column added after the first release; older databases get it through
/// `Repository::migrate`.
pub const ADD_RELEVANCE_COLUMN: &str = "ALTER TABLE tweets_cache ADD COLUMN is_relevant BOOLEAN";
