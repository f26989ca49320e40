use crate::models::CachedPost;

/// Telegram's limit for `sendMessage` text.
pub const MESSAGE_LIMIT: usize = 4096;
/// Telegram's limit for `sendPhoto` captions.
pub const CAPTION_LIMIT: usize = 1024;

const COMMENT_LIMIT: usize = 300;
const ELLIPSIS: char = '…';

/// HTML-formatted notification for a relevant post. The post text is cut so
/// the whole message fits in `limit` characters; header, comment and link
/// are always kept.
pub fn format_message(handle: &str, post: &CachedPost, comment: Option<&str>, limit: usize) -> String {
    let header = format!("New tweet from <b>@{}</b>:\n\n", escape_html(handle));

    let comment = comment
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(|c| format!("\n\n<i>{}</i>", truncate_escaped(c, COMMENT_LIMIT)))
        .unwrap_or_default();

    let footer = format!("{comment}\n\n{}", escape_html(&post.url));

    let fixed = header.chars().count() + footer.chars().count();
    let body = truncate_escaped(post.content.trim(), limit.saturating_sub(fixed));

    format!("{header}{body}{footer}")
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        push_escaped(&mut out, c);
    }
    out
}

fn push_escaped(out: &mut String, c: char) {
    match c {
        '&' => out.push_str("&amp;"),
        '<' => out.push_str("&lt;"),
        '>' => out.push_str("&gt;"),
        _ => out.push(c),
    }
}

fn escaped_len(c: char) -> usize {
    match c {
        '&' => 5,
        '<' | '>' => 4,
        _ => 1,
    }
}

/// Escapes `text`, stopping before the escaped form would exceed `budget`
/// characters. Entities are never split.
fn truncate_escaped(text: &str, budget: usize) -> String {
    let total: usize = text.chars().map(escaped_len).sum();
    if total <= budget {
        return escape_html(text);
    }

    let mut out = String::new();
    let mut used = 0;
    let room = budget.saturating_sub(1);
    for c in text.chars() {
        let len = escaped_len(c);
        if used + len > room {
            break;
        }
        push_escaped(&mut out, c);
        used += len;
    }
    if budget > 0 {
        out.push(ELLIPSIS);
    }
    out
}
