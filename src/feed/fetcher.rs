use std::time::Duration;

use async_trait::async_trait;
use feed_rs::parser;
use reqwest::Client;

use crate::error::{AppError, Result};
use crate::models::RawPost;

use super::parser::{parse_entry, ParsedEntry};
use super::FeedSource;

/// Images larger than this are dropped rather than attached.
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// Reads account timelines from an ordered list of Nitter-style mirrors,
/// moving on to the next mirror whenever one misbehaves.
pub struct MirrorFetcher {
    client: Client,
    mirrors: Vec<String>,
}

impl MirrorFetcher {
    pub fn new(mirrors: Vec<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent("tweet-relay/1.0")
            .build()
            .expect("Failed to create HTTP client");

        let mirrors = mirrors
            .into_iter()
            .map(|m| m.trim().trim_end_matches('/').to_string())
            .filter(|m| !m.is_empty())
            .collect();

        Self { client, mirrors }
    }

    async fn fetch_from(&self, mirror: &str, handle: &str) -> Result<Vec<ParsedEntry>> {
        let url = format!("{mirror}/{handle}/rss");
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!("Failed to fetch {url}: HTTP {}", response.status()).into());
        }

        let bytes = response.bytes().await?;
        let feed = parser::parse(&bytes[..])?;
        let total = feed.entries.len();

        let entries: Vec<ParsedEntry> = feed
            .entries
            .into_iter()
            .filter_map(|entry| parse_entry(entry, mirror, handle))
            .collect();

        if entries.len() < total {
            tracing::debug!(
                handle,
                mirror,
                skipped = total - entries.len(),
                "Skipped entries without a status id"
            );
        }

        Ok(entries)
    }

    /// Best effort; a missing image never fails the post.
    async fn download_image(&self, url: &str) -> Option<Vec<u8>> {
        let response = match self.client.get(url).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                tracing::debug!(url, status = %r.status(), "Image download refused");
                return None;
            }
            Err(e) => {
                tracing::debug!(url, "Image download failed: {}", e);
                return None;
            }
        };

        if response
            .content_length()
            .is_some_and(|len| len > MAX_IMAGE_BYTES as u64)
        {
            tracing::debug!(url, "Image too large, skipping");
            return None;
        }

        match response.bytes().await {
            Ok(bytes) if !bytes.is_empty() && bytes.len() <= MAX_IMAGE_BYTES => Some(bytes.to_vec()),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(url, "Image body failed: {}", e);
                None
            }
        }
    }
}

#[async_trait]
impl FeedSource for MirrorFetcher {
    async fn fetch_recent(&self, handle: &str, limit: usize) -> Result<Vec<RawPost>> {
        let mut attempts = 0;

        for mirror in &self.mirrors {
            attempts += 1;
            let mut entries = match self.fetch_from(mirror, handle).await {
                Ok(entries) if !entries.is_empty() => entries,
                Ok(_) => {
                    tracing::warn!(handle, mirror = %mirror, "Mirror returned no posts, trying next");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(handle, mirror = %mirror, "Mirror failed: {}", e);
                    continue;
                }
            };

            entries.sort_by(|a, b| b.post.created_at.cmp(&a.post.created_at));
            entries.truncate(limit);

            let mut posts = Vec::with_capacity(entries.len());
            for entry in entries {
                let mut post = entry.post;
                if let Some(url) = entry.image_url.as_deref() {
                    post.image = self.download_image(url).await;
                }
                posts.push(post);
            }

            tracing::debug!(handle, mirror = %mirror, count = posts.len(), "Fetched posts");
            return Ok(posts);
        }

        Err(AppError::AllMirrorsExhausted {
            handle: handle.to_string(),
            attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn rss(items: &[(&str, &str, &str)]) -> String {
        let items: String = items
            .iter()
            .map(|(id, text, date)| {
                format!(
                    "<item><title>{text}</title><description><![CDATA[<p>{text}</p>]]></description>\
                     <pubDate>{date}</pubDate>\
                     <guid>https://mirror.example/alice/status/{id}#m</guid>\
                     <link>https://mirror.example/alice/status/{id}#m</link></item>"
                )
            })
            .collect();
        format!(
            "<?xml version=\"1.0\"?><rss version=\"2.0\"><channel><title>alice</title>\
             <link>https://mirror.example/alice</link><description>d</description>{items}</channel></rss>"
        )
    }

    async fn serve(server: &MockServer, status: u16, body: String) {
        Mock::given(method("GET"))
            .and(path("/alice/rss"))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn falls_back_to_next_mirror() {
        let broken = MockServer::start().await;
        serve(&broken, 503, String::new()).await;

        let healthy = MockServer::start().await;
        let body = rss(&[
            ("101", "older", "Mon, 03 Mar 2025 10:00:00 GMT"),
            ("102", "newer", "Tue, 04 Mar 2025 10:00:00 GMT"),
        ]);
        serve(&healthy, 200, body).await;

        let fetcher = MirrorFetcher::new(vec![broken.uri(), healthy.uri()], Duration::from_secs(5));
        let posts = fetcher.fetch_recent("alice", 10).await.unwrap();

        let ids: Vec<_> = posts.iter().map(|p| p.tweet_id.as_str()).collect();
        assert_eq!(ids, vec!["102", "101"]);
        assert_eq!(posts[0].url, "https://x.com/alice/status/102");
    }

    #[tokio::test]
    async fn respects_limit() {
        let server = MockServer::start().await;
        let body = rss(&[
            ("1", "a", "Mon, 03 Mar 2025 10:00:00 GMT"),
            ("2", "b", "Tue, 04 Mar 2025 10:00:00 GMT"),
            ("3", "c", "Wed, 05 Mar 2025 10:00:00 GMT"),
        ]);
        serve(&server, 200, body).await;

        let fetcher = MirrorFetcher::new(vec![server.uri()], Duration::from_secs(5));
        let posts = fetcher.fetch_recent("alice", 2).await.unwrap();
        let ids: Vec<_> = posts.iter().map(|p| p.tweet_id.as_str()).collect();
        assert_eq!(ids, vec!["3", "2"]);
    }

    #[tokio::test]
    async fn garbage_and_empty_feeds_fall_through_to_exhaustion() {
        let garbage = MockServer::start().await;
        serve(&garbage, 200, "<html>rate limited</html>".into()).await;

        let empty = MockServer::start().await;
        serve(&empty, 200, rss(&[])).await;

        let fetcher = MirrorFetcher::new(vec![garbage.uri(), empty.uri()], Duration::from_secs(5));
        let err = fetcher.fetch_recent("alice", 10).await.unwrap_err();
        match err {
            AppError::AllMirrorsExhausted { handle, attempts } => {
                assert_eq!(handle, "alice");
                assert_eq!(attempts, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn attaches_first_image() {
        let server = MockServer::start().await;
        let body = format!(
            "<?xml version=\"1.0\"?><rss version=\"2.0\"><channel><title>alice</title>\
             <link>{uri}/alice</link><description>d</description>\
             <item><title>pic</title><description><![CDATA[<p>look</p><img src=\"/pic/cat.jpg\" />]]></description>\
             <pubDate>Tue, 04 Mar 2025 10:00:00 GMT</pubDate>\
             <link>{uri}/alice/status/7#m</link></item></channel></rss>",
            uri = server.uri()
        );
        serve(&server, 200, body).await;
        Mock::given(method("GET"))
            .and(path("/pic/cat.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xFF, 0xD8, 0xFF]))
            .mount(&server)
            .await;

        let fetcher = MirrorFetcher::new(vec![server.uri()], Duration::from_secs(5));
        let posts = fetcher.fetch_recent("alice", 10).await.unwrap();
        assert_eq!(posts[0].image.as_deref(), Some(&[0xFF, 0xD8, 0xFF][..]));
        assert!(posts[0].text.contains("look"));
    }

    #[tokio::test]
    async fn missing_image_does_not_fail_the_post() {
        let server = MockServer::start().await;
        let body = format!(
            "<?xml version=\"1.0\"?><rss version=\"2.0\"><channel><title>alice</title>\
             <link>{uri}/alice</link><description>d</description>\
             <item><title>pic</title><description><![CDATA[<p>look</p><img src=\"/pic/gone.jpg\" />]]></description>\
             <pubDate>Tue, 04 Mar 2025 10:00:00 GMT</pubDate>\
             <link>{uri}/alice/status/8#m</link></item></channel></rss>",
            uri = server.uri()
        );
        serve(&server, 200, body).await;

        let fetcher = MirrorFetcher::new(vec![server.uri()], Duration::from_secs(5));
        let posts = fetcher.fetch_recent("alice", 10).await.unwrap();
        assert_eq!(posts.len(), 1);
        assert!(posts[0].image.is_none());
    }

    #[tokio::test]
    async fn oversized_image_is_dropped() {
        let server = MockServer::start().await;
        let body = format!(
            "<?xml version=\"1.0\"?><rss version=\"2.0\"><channel><title>alice</title>\
             <link>{uri}/alice</link><description>d</description>\
             <item><title>pic</title><description><![CDATA[<p>huge</p><img src=\"/pic/huge.png\" />]]></description>\
             <pubDate>Tue, 04 Mar 2025 10:00:00 GMT</pubDate>\
             <link>{uri}/alice/status/9#m</link></item></channel></rss>",
            uri = server.uri()
        );
        serve(&server, 200, body).await;
        Mock::given(method("GET"))
            .and(path("/pic/huge.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; MAX_IMAGE_BYTES + 1]))
            .mount(&server)
            .await;

        let fetcher = MirrorFetcher::new(vec![server.uri()], Duration::from_secs(5));
        let posts = fetcher.fetch_recent("alice", 10).await.unwrap();
        assert_eq!(posts.len(), 1);
        assert!(posts[0].image.is_none());
    }
}
