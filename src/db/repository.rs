use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, ErrorCode, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use crate::analysis::interpret_reply;
use crate::error::{AppError, Result};
use crate::models::{CachedPost, Follower, RawPost, Verdict};

use super::schema::{ADD_RELEVANCE_COLUMN, SCHEMA};

const POST_COLUMNS: &str = "id, follower_id, tweet_id, tweet_url, tweet_content, tweet_image, \
     created_at, inserted_at, is_analyzed, analysis_result, is_relevant, is_sent_to_telegram, sent_at";

/// Durable cache of followers and seen posts. The only shared mutable state
/// of a run; every write is a single statement or a single transaction.
pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path).await?;
        Self::init(conn).await
    }

    pub async fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        let repo = Self { conn };
        repo.migrate().await?;
        Ok(repo)
    }

    /// Bring databases created before `is_relevant` existed up to date and
    /// derive the flag for rows that were analyzed back then.
    async fn migrate(&self) -> Result<()> {
        let backfilled = self
            .conn
            .call(|conn| {
                let has_column = {
                    let mut stmt = conn.prepare("PRAGMA table_info(tweets_cache)")?;
                    let names = stmt
                        .query_map([], |row| row.get::<_, String>(1))?
                        .collect::<std::result::Result<Vec<_>, _>>()?;
                    names.iter().any(|n| n == "is_relevant")
                };
                if !has_column {
                    conn.execute(ADD_RELEVANCE_COLUMN, [])?;
                }

                let tx = conn.transaction()?;
                let legacy: Vec<(i64, Option<String>)> = {
                    let mut stmt = tx.prepare(
                        "SELECT id, analysis_result FROM tweets_cache
                         WHERE is_analyzed = 1 AND is_relevant IS NULL",
                    )?;
                    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
                    rows.collect::<std::result::Result<_, _>>()?
                };
                for (id, text) in &legacy {
                    let relevant = interpret_reply(text.as_deref().unwrap_or_default()).is_relevant;
                    tx.execute(
                        "UPDATE tweets_cache SET is_relevant = ?1 WHERE id = ?2",
                        params![relevant, id],
                    )?;
                }
                tx.commit()?;
                Ok(legacy.len())
            })
            .await?;

        if backfilled > 0 {
            tracing::info!(rows = backfilled, "Back-filled relevance for previously analyzed posts");
        }
        Ok(())
    }

    // Follower operations

    pub async fn add_follower(&self, username: &str) -> Result<Follower> {
        let name = username.to_string();
        let result = self
            .conn
            .call(move |conn| {
                conn.execute("INSERT INTO followers (username) VALUES (?1)", params![name])?;
                Ok(conn.last_insert_rowid())
            })
            .await;

        match result {
            Ok(id) => Ok(Follower {
                id,
                username: username.to_string(),
                enabled: true,
            }),
            Err(e) if is_constraint_violation(&e) => Err(AppError::InvalidState(format!(
                "@{username} is already followed"
            ))),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn list_followers(&self, enabled_only: bool) -> Result<Vec<Follower>> {
        let followers = self
            .conn
            .call(move |conn| {
                let sql = if enabled_only {
                    "SELECT id, username, enabled FROM followers WHERE enabled = 1 ORDER BY id"
                } else {
                    "SELECT id, username, enabled FROM followers ORDER BY id"
                };
                let mut stmt = conn.prepare(sql)?;
                let followers = stmt
                    .query_map([], follower_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(followers)
            })
            .await?;
        Ok(followers)
    }

    pub async fn get_follower(&self, username: &str) -> Result<Option<Follower>> {
        let name = username.to_string();
        let follower = self
            .conn
            .call(move |conn| {
                let follower = conn
                    .query_row(
                        "SELECT id, username, enabled FROM followers WHERE username = ?1",
                        params![name],
                        follower_from_row,
                    )
                    .optional()?;
                Ok(follower)
            })
            .await?;
        Ok(follower)
    }

    pub async fn set_follower_enabled(&self, username: &str, enabled: bool) -> Result<()> {
        let name = username.to_string();
        let changed = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE followers SET enabled = ?1 WHERE username = ?2",
                    params![enabled, name],
                )?;
                Ok(changed)
            })
            .await?;

        if changed == 0 {
            return Err(AppError::NotFound(format!("follower @{username}")));
        }
        Ok(())
    }

    /// Delete a follower together with its cached posts. Returns how many
    /// posts went with it.
    pub async fn remove_follower(&self, username: &str) -> Result<usize> {
        let name = username.to_string();
        let removed = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let id: Option<i64> = tx
                    .query_row(
                        "SELECT id FROM followers WHERE username = ?1",
                        params![name],
                        |row| row.get(0),
                    )
                    .optional()?;
                let Some(id) = id else {
                    return Ok(None);
                };
                let posts =
                    tx.execute("DELETE FROM tweets_cache WHERE follower_id = ?1", params![id])?;
                tx.execute("DELETE FROM followers WHERE id = ?1", params![id])?;
                tx.commit()?;
                Ok(Some(posts))
            })
            .await?;

        removed.ok_or_else(|| AppError::NotFound(format!("follower @{username}")))
    }

    // Post operations

    pub async fn is_known(&self, follower_id: i64, tweet_id: &str) -> Result<bool> {
        let tweet_id = tweet_id.to_string();
        let exists = self
            .conn
            .call(move |conn| {
                let found: Option<i64> = conn
                    .query_row(
                        "SELECT 1 FROM tweets_cache WHERE follower_id = ?1 AND tweet_id = ?2",
                        params![follower_id, tweet_id],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(found.is_some())
            })
            .await?;
        Ok(exists)
    }

    /// Insert a freshly observed post. This is the dedup checkpoint: a second
    /// insert for the same pair fails with `DuplicateKey`.
    pub async fn insert_post(&self, follower_id: i64, post: &RawPost) -> Result<i64> {
        let tweet_id = post.tweet_id.clone();
        let url = post.url.clone();
        let text = post.text.clone();
        let image = post.image.clone();
        let created_at = format_datetime(&post.created_at);

        let result = self
            .conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO tweets_cache
                           (follower_id, tweet_id, tweet_url, tweet_content, tweet_image, created_at, inserted_at)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
                    params![
                        follower_id,
                        tweet_id,
                        url,
                        text,
                        image,
                        created_at,
                        format_datetime(&Utc::now()),
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await;

        match result {
            Ok(id) => Ok(id),
            Err(e) if is_constraint_violation(&e) => Err(AppError::DuplicateKey {
                follower_id,
                tweet_id: post.tweet_id.clone(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_post(&self, id: i64) -> Result<Option<CachedPost>> {
        let post = self
            .conn
            .call(move |conn| {
                let post = conn
                    .query_row(
                        &format!("SELECT {POST_COLUMNS} FROM tweets_cache WHERE id = ?1"),
                        params![id],
                        post_from_row,
                    )
                    .optional()?;
                Ok(post)
            })
            .await?;
        Ok(post)
    }

    /// Last write wins; re-recording the same verdict changes nothing.
    pub async fn record_analysis(&self, id: i64, verdict: &Verdict) -> Result<()> {
        let text = verdict.stored_text();
        let relevant = verdict.is_relevant;
        let changed = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE tweets_cache SET is_analyzed = 1, analysis_result = ?1, is_relevant = ?2
                     WHERE id = ?3",
                    params![text, relevant, id],
                )?;
                Ok(changed)
            })
            .await?;

        if changed == 0 {
            return Err(AppError::NotFound(format!("cached post {id}")));
        }
        Ok(())
    }

    /// Mark a post delivered. Unanalyzed posts are rejected; an already sent
    /// post keeps its original timestamp.
    pub async fn record_sent(&self, id: i64, sent_at: DateTime<Utc>) -> Result<()> {
        let stamp = format_datetime(&sent_at);
        let state = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let row: Option<(bool, bool)> = tx
                    .query_row(
                        "SELECT COALESCE(is_analyzed, 0), COALESCE(is_sent_to_telegram, 0)
                         FROM tweets_cache WHERE id = ?1",
                        params![id],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()?;
                if let Some((true, false)) = row {
                    tx.execute(
                        "UPDATE tweets_cache SET is_sent_to_telegram = 1, sent_at = ?1 WHERE id = ?2",
                        params![stamp, id],
                    )?;
                }
                tx.commit()?;
                Ok(row)
            })
            .await?;

        match state {
            None => Err(AppError::NotFound(format!("cached post {id}"))),
            Some((false, _)) => Err(AppError::InvalidState(format!(
                "cached post {id} cannot be sent before it is analyzed"
            ))),
            Some(_) => Ok(()),
        }
    }

    /// Posts not analyzed yet, oldest first.
    pub async fn list_pending_analysis(&self, follower_id: Option<i64>) -> Result<Vec<CachedPost>> {
        self.query_posts(
            "WHERE COALESCE(is_analyzed, 0) = 0 AND (?1 IS NULL OR follower_id = ?1)
             ORDER BY created_at ASC, id ASC",
            follower_id,
        )
        .await
    }

    /// Relevant posts still waiting for delivery, oldest first.
    pub async fn list_pending_send(&self, follower_id: Option<i64>) -> Result<Vec<CachedPost>> {
        self.query_posts(
            "WHERE is_analyzed = 1 AND is_relevant = 1 AND COALESCE(is_sent_to_telegram, 0) = 0
               AND (?1 IS NULL OR follower_id = ?1)
             ORDER BY created_at ASC, id ASC",
            follower_id,
        )
        .await
    }

    pub async fn list_posts(&self, follower_id: i64) -> Result<Vec<CachedPost>> {
        self.query_posts(
            "WHERE follower_id = ?1 ORDER BY created_at DESC, id DESC",
            Some(follower_id),
        )
        .await
    }

    async fn query_posts(&self, clause: &'static str, follower_id: Option<i64>) -> Result<Vec<CachedPost>> {
        let posts = self
            .conn
            .call(move |conn| {
                let mut stmt =
                    conn.prepare(&format!("SELECT {POST_COLUMNS} FROM tweets_cache {clause}"))?;
                let posts = stmt
                    .query_map(params![follower_id], post_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(posts)
            })
            .await?;
        Ok(posts)
    }

    // Maintenance

    /// Drop irrelevant posts older than the `keep` newest per follower.
    /// Pending and sent posts stay so they can never be picked up twice.
    pub async fn run_maintenance(&self, keep: usize) -> Result<usize> {
        let keep = i64::try_from(keep).unwrap_or(i64::MAX);
        let deleted = self
            .conn
            .call(move |conn| {
                let deleted = conn.execute(
                    r#"DELETE FROM tweets_cache
                       WHERE is_analyzed = 1
                         AND COALESCE(is_relevant, 0) = 0
                         AND COALESCE(is_sent_to_telegram, 0) = 0
                         AND id NOT IN (
                             SELECT recent.id FROM tweets_cache AS recent
                             WHERE recent.follower_id IS tweets_cache.follower_id
                             ORDER BY recent.created_at DESC, recent.id DESC
                             LIMIT ?1
                         )"#,
                    params![keep],
                )?;
                Ok(deleted)
            })
            .await?;

        tracing::info!(deleted, "Maintenance complete");
        Ok(deleted)
    }
}

fn is_constraint_violation(err: &tokio_rusqlite::Error) -> bool {
    matches!(
        err,
        tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(e, _))
            if e.code == ErrorCode::ConstraintViolation
    )
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    // Try RFC3339 first (e.g., "2026-01-11T12:34:56Z")
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // SQLite CURRENT_TIMESTAMP format (e.g., "2026-01-11 12:34:56")
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    // Older rows carry naive ISO timestamps with fractional seconds
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    None
}

fn timestamp_column(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    Ok(row
        .get::<_, Option<String>>(idx)?
        .and_then(|s| parse_datetime(&s)))
}

fn follower_from_row(row: &Row) -> rusqlite::Result<Follower> {
    Ok(Follower {
        id: row.get(0)?,
        username: row.get(1)?,
        enabled: row.get::<_, Option<bool>>(2)?.unwrap_or(true),
    })
}

fn post_from_row(row: &Row) -> rusqlite::Result<CachedPost> {
    let inserted_at = timestamp_column(row, 7)?.unwrap_or_else(Utc::now);
    Ok(CachedPost {
        id: row.get(0)?,
        follower_id: row.get(1)?,
        tweet_id: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        url: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        content: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        image: row.get(5)?,
        created_at: timestamp_column(row, 6)?.unwrap_or(inserted_at),
        inserted_at,
        is_analyzed: row.get::<_, Option<bool>>(8)?.unwrap_or(false),
        analysis_result: row.get(9)?,
        is_relevant: row.get(10)?,
        is_sent: row.get::<_, Option<bool>>(11)?.unwrap_or(false),
        sent_at: timestamp_column(row, 12)?,
    })
}
