//! Conversion of syndication entries into posts.

use std::sync::OnceLock;

use chrono::Utc;
use feed_rs::model::Entry;
use regex::Regex;

use crate::models::RawPost;

/// An entry that passed validation. The image is only a URL until the
/// client decides the post is worth downloading it for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEntry {
    pub post: RawPost,
    pub image_url: Option<String>,
}

fn status_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"/([A-Za-z0-9_]+)/status(?:es)?/(\d+)").expect("valid regex")
    })
}

fn img_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"<img[^>]*\ssrc=["']([^"']+)["']"#).expect("valid regex")
    })
}

/// Returns `None` for entries without a recognizable status id.
pub fn parse_entry(entry: Entry, mirror: &str, handle: &str) -> Option<ParsedEntry> {
    let candidates = entry
        .links
        .iter()
        .map(|l| l.href.as_str())
        .chain(std::iter::once(entry.id.as_str()));

    let (author, tweet_id) = candidates.into_iter().find_map(|href| {
        status_re()
            .captures(href)
            .map(|cap| (cap[1].to_string(), cap[2].to_string()))
    })?;

    let html = entry
        .content
        .as_ref()
        .and_then(|c| c.body.clone())
        .or_else(|| entry.summary.as_ref().map(|s| s.content.clone()));

    let text = html
        .as_deref()
        .and_then(html_to_text)
        .filter(|t| !t.is_empty())
        .or_else(|| entry.title.as_ref().map(|t| t.content.trim().to_string()))
        .unwrap_or_default();

    let image_url = html
        .as_deref()
        .and_then(|h| img_re().captures(h))
        .and_then(|cap| cap.get(1))
        .map(|m| resolve_url(&decode_amp(m.as_str()), mirror));

    let created_at = entry.published.or(entry.updated).unwrap_or_else(|| {
        tracing::debug!(handle, tweet_id = %tweet_id, "Entry has no date, using fetch time");
        Utc::now()
    });

    Some(ParsedEntry {
        post: RawPost {
            url: canonical_status_url(&author, &tweet_id),
            tweet_id,
            text,
            image: None,
            created_at,
        },
        image_url,
    })
}

/// Mirror hosts come and go; links in notifications point at the origin.
pub fn canonical_status_url(author: &str, tweet_id: &str) -> String {
    format!("https://x.com/{author}/status/{tweet_id}")
}

fn html_to_text(html: &str) -> Option<String> {
    let text = match html2text::config::plain().string_from_read(html.as_bytes(), 10_000) {
        Ok(t) => t,
        Err(e) => {
            tracing::debug!("Failed to convert HTML to text: {}", e);
            return None;
        }
    };

    let cleaned = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    Some(cleaned)
}

fn decode_amp(s: &str) -> String {
    s.replace("&amp;", "&")
}

/// Resolve a potentially relative URL against the mirror base.
fn resolve_url(href: &str, base_url: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }

    if let Ok(base) = url::Url::parse(base_url) {
        if let Ok(resolved) = base.join(href) {
            return resolved.to_string();
        }
    }

    href.to_string()
}
