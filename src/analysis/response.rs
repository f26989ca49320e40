//! Normalization of free-text model replies.
//!
//! Marker convention, checked in order:
//! 1. A JSON object with a boolean `is_relevant` decides; its `reason` (or
//!    `comment`) becomes the comment.
//! 2. Otherwise the reply is irrelevant when it contains `NOT_RELEVANT` or
//!    `NOT RELEVANT` in any case, and relevant in every other case.
//!
//! The same rules are used to back-fill stored analysis text.

use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;

use crate::models::Verdict;

fn think_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<think(?:ing)?>.*?(?:</think(?:ing)?>|\z)").expect("valid regex"))
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"</?[A-Za-z][^>]*>").expect("valid regex"))
}

fn negative_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bnot[ _]relevant\b").expect("valid regex"))
}

#[derive(Debug, Deserialize)]
struct StructuredReply {
    is_relevant: bool,
    #[serde(default, alias = "comment")]
    reason: Option<String>,
}

/// Remove reasoning sections, markup and code fences; collapse whitespace.
pub fn clean_reply(raw: &str) -> String {
    let without_thinking = think_re().replace_all(raw, " ");
    let without_tags = tag_re().replace_all(&without_thinking, " ");
    let without_fences = without_tags.replace("```json", " ").replace("```", " ");
    without_fences.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn is_negative(text: &str) -> bool {
    negative_re().is_match(text)
}

/// Turn a model reply (or previously stored analysis text) into a verdict.
pub fn interpret_reply(raw: &str) -> Verdict {
    let cleaned = clean_reply(raw);

    if let Some(structured) = parse_structured(&cleaned) {
        let comment = structured
            .reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        return Verdict {
            is_relevant: structured.is_relevant,
            comment,
        };
    }

    let comment = (!cleaned.is_empty()).then(|| cleaned.clone());
    Verdict {
        is_relevant: !is_negative(&cleaned),
        comment,
    }
}

fn parse_structured(cleaned: &str) -> Option<StructuredReply> {
    let start = cleaned.find('{')?;
    let end = cleaned.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&cleaned[start..=end]).ok()
}
