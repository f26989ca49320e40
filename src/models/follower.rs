use crate::error::{AppError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Follower {
    pub id: i64,
    pub username: String,
    pub enabled: bool,
}

impl Follower {
    pub fn status(&self) -> &'static str {
        if self.enabled {
            "Enabled"
        } else {
            "Disabled"
        }
    }
}

/// Trim whitespace and a leading `@`, rejecting what is left if empty.
pub fn normalize_handle(raw: &str) -> Result<String> {
    let handle = raw.trim().trim_start_matches('@').trim();
    if handle.is_empty() {
        return Err(AppError::Config(format!("invalid handle: {raw:?}")));
    }
    Ok(handle.to_string())
}
