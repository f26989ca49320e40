//! Pipeline orchestrator - fetch, dedup, analyze and deliver for every
//! enabled follower.
//!
//! Each account runs the steps in causal order. Failures are contained at
//! the account boundary: an account that cannot be fetched is reported and
//! the run moves on. Posts that could not be analyzed or delivered stay
//! pending in the store and are picked up by the next run.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};

use crate::analysis::Analyzer;
use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::feed::FeedSource;
use crate::models::{CachedPost, Follower};
use crate::notify::{format_message, Notifier, CAPTION_LIMIT, MESSAGE_LIMIT};

/// Counts for a single account within one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountReport {
    pub handle: String,
    /// Posts returned by the feed.
    pub fetched: usize,
    /// Posts inserted into the cache this run.
    pub new: usize,
    pub analyzed: usize,
    pub relevant: usize,
    /// Posts left unanalyzed because the analyzer was unavailable.
    pub deferred: usize,
    pub sent: usize,
    /// Deliveries that failed and will be retried.
    pub failed: usize,
    /// Set when the account could not be processed at all.
    pub failure: Option<String>,
}

impl AccountReport {
    fn new(handle: &str) -> Self {
        Self {
            handle: handle.to_string(),
            ..Default::default()
        }
    }
}

/// Outcome of one run, in follower order.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub accounts: Vec<AccountReport>,
}

impl RunSummary {
    fn total(&self, field: impl Fn(&AccountReport) -> usize) -> usize {
        self.accounts.iter().map(field).sum()
    }

    pub fn fetched(&self) -> usize {
        self.total(|a| a.fetched)
    }

    pub fn new_posts(&self) -> usize {
        self.total(|a| a.new)
    }

    pub fn analyzed(&self) -> usize {
        self.total(|a| a.analyzed)
    }

    pub fn relevant(&self) -> usize {
        self.total(|a| a.relevant)
    }

    pub fn deferred(&self) -> usize {
        self.total(|a| a.deferred)
    }

    pub fn sent(&self) -> usize {
        self.total(|a| a.sent)
    }

    pub fn failed(&self) -> usize {
        self.total(|a| a.failed)
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &str)> {
        self.accounts
            .iter()
            .filter_map(|a| a.failure.as_deref().map(|f| (a.handle.as_str(), f)))
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Processed {} accounts: {} fetched, {} new, {} analyzed ({} relevant), {} deferred, {} sent, {} failed",
            self.accounts.len(),
            self.fetched(),
            self.new_posts(),
            self.analyzed(),
            self.relevant(),
            self.deferred(),
            self.sent(),
            self.failed(),
        )?;
        for (handle, failure) in self.failures() {
            writeln!(f, "  @{handle}: {failure}")?;
        }
        Ok(())
    }
}

pub struct Pipeline {
    repo: Arc<Repository>,
    feed: Arc<dyn FeedSource>,
    analyzer: Analyzer,
    notifier: Arc<dyn Notifier>,
    max_posts: usize,
    concurrency: usize,
}

impl Pipeline {
    pub fn new(
        repo: Arc<Repository>,
        feed: Arc<dyn FeedSource>,
        analyzer: Analyzer,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            repo,
            feed,
            analyzer,
            notifier,
            max_posts: 10,
            concurrency: 1,
        }
    }

    pub fn with_max_posts(mut self, max_posts: usize) -> Self {
        self.max_posts = max_posts.max(1);
        self
    }

    /// Number of accounts processed at once.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// One complete pass over all enabled followers. Only failing to read
    /// the follower list is fatal; everything else ends up in the summary.
    pub async fn run(&self) -> Result<RunSummary> {
        let followers = self.repo.list_followers(true).await?;
        tracing::info!(
            accounts = followers.len(),
            analyzer = self.analyzer.name(),
            concurrency = self.concurrency,
            "Starting run"
        );

        let accounts: Vec<AccountReport> = stream::iter(followers)
            .map(|follower| self.process_account(follower))
            .buffered(self.concurrency)
            .collect()
            .await;

        let summary = RunSummary { accounts };
        tracing::info!(
            new = summary.new_posts(),
            analyzed = summary.analyzed(),
            sent = summary.sent(),
            failed = summary.failed(),
            "Run complete"
        );
        Ok(summary)
    }

    async fn process_account(&self, follower: Follower) -> AccountReport {
        let mut report = AccountReport::new(&follower.username);

        let outcome = async {
            self.ingest(&follower, &mut report).await?;
            self.analyze_pending(&follower, &mut report).await?;
            self.deliver_pending(&follower, &mut report).await
        }
        .await;

        if let Err(e) = outcome {
            tracing::error!(handle = %follower.username, "Account failed: {}", e);
            report.failure = Some(e.to_string());
        }
        report
    }

    /// Fetch and insert unseen posts. Insertion is the dedup checkpoint: a
    /// post that shows up twice in one feed, or that another writer cached
    /// after the lookup, is rejected there and skipped.
    async fn ingest(&self, follower: &Follower, report: &mut AccountReport) -> Result<()> {
        let posts = self.feed.fetch_recent(&follower.username, self.max_posts).await?;
        report.fetched = posts.len();

        let mut unseen = Vec::new();
        for post in posts.iter().take(self.max_posts) {
            if !self.repo.is_known(follower.id, &post.tweet_id).await? {
                unseen.push(post);
            }
        }

        for post in unseen {
            match self.repo.insert_post(follower.id, post).await {
                Ok(id) => {
                    report.new += 1;
                    tracing::debug!(handle = %follower.username, tweet_id = %post.tweet_id, id, "Cached new post");
                }
                Err(AppError::DuplicateKey { .. }) => {
                    tracing::debug!(tweet_id = %post.tweet_id, "Post already cached, skipping");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Analyze everything still pending for the account, including posts
    /// left over from earlier runs. Stops at the first outage.
    async fn analyze_pending(&self, follower: &Follower, report: &mut AccountReport) -> Result<()> {
        let pending = self.repo.list_pending_analysis(Some(follower.id)).await?;

        for (idx, post) in pending.iter().enumerate() {
            let verdict = match self.analyzer.evaluate(&post.content).await {
                Ok(verdict) => verdict,
                Err(e) => {
                    report.deferred = pending.len() - idx;
                    tracing::warn!(
                        handle = %follower.username,
                        deferred = report.deferred,
                        "Analysis deferred: {}",
                        e
                    );
                    break;
                }
            };

            self.repo.record_analysis(post.id, &verdict).await?;
            report.analyzed += 1;
            if verdict.is_relevant {
                report.relevant += 1;
            }
            tracing::debug!(
                tweet_id = %post.tweet_id,
                relevant = verdict.is_relevant,
                "Analyzed post"
            );
        }
        Ok(())
    }

    async fn deliver_pending(&self, follower: &Follower, report: &mut AccountReport) -> Result<()> {
        let pending = self.repo.list_pending_send(Some(follower.id)).await?;

        for post in pending {
            let limit = if post.image.is_some() {
                CAPTION_LIMIT
            } else {
                MESSAGE_LIMIT
            };
            let message = format_message(&follower.username, &post, notification_comment(&post), limit);

            if let Err(e) = self.notifier.send(&message, post.image.as_deref()).await {
                report.failed += 1;
                tracing::warn!(tweet_id = %post.tweet_id, "Delivery failed, will retry next run: {}", e);
                continue;
            }

            match self.repo.record_sent(post.id, Utc::now()).await {
                Ok(()) => {
                    report.sent += 1;
                    tracing::info!(handle = %follower.username, tweet_id = %post.tweet_id, "Sent post");
                }
                Err(e @ AppError::InvalidState(_)) => {
                    tracing::error!(tweet_id = %post.tweet_id, "Cannot mark post sent: {}", e);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

/// Analyzer text worth showing; bare verdict markers are not.
fn notification_comment(post: &CachedPost) -> Option<&str> {
    post.analysis_result
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty() && !c.eq_ignore_ascii_case("RELEVANT"))
}
