use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{AppError, Result};

pub const DEFAULT_AI_PROMPT: &str = "Analyze the following tweet and determine if it contains important or \
interesting information. The tweet should be relevant if it contains news, announcements, or significant \
insights. Respond with a JSON object with two fields: 'is_relevant' (boolean) and 'reason' (string explanation).";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Keyword,
    #[default]
    Ollama,
    Claude,
}

impl FromStr for Provider {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keyword" | "keywords" => Ok(Provider::Keyword),
            "ollama" => Ok(Provider::Ollama),
            "claude" | "anthropic" => Ok(Provider::Claude),
            other => Err(AppError::Config(format!("unknown AI provider '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    #[serde(default = "default_telegram_api_url")]
    pub telegram_api_url: String,

    #[serde(default)]
    pub ai_provider: Provider,
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,
    #[serde(default = "default_ollama_model")]
    pub ollama_model: String,
    pub claude_api_key: Option<String>,
    #[serde(default = "default_claude_model")]
    pub claude_model: String,
    #[serde(default = "default_claude_api_url")]
    pub claude_api_url: String,

    #[serde(default = "default_ai_prompt")]
    pub ai_prompt: String,
    pub ollama_prompt: Option<String>,
    pub claude_prompt: Option<String>,

    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub exclude_keywords: Vec<String>,

    #[serde(default = "default_max_tweets")]
    pub max_tweets_per_user: usize,
    #[serde(default = "default_mirrors")]
    pub nitter_mirrors: Vec<String>,

    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_retention")]
    pub retention_keep_per_user: usize,

    #[serde(default = "default_feed_timeout")]
    pub feed_timeout_secs: u64,
    #[serde(default = "default_ai_timeout")]
    pub ai_timeout_secs: u64,
    #[serde(default = "default_telegram_timeout")]
    pub telegram_timeout_secs: u64,
    #[serde(default = "default_ai_retries")]
    pub ai_max_retries: u32,
    #[serde(default = "default_telegram_attempts")]
    pub telegram_max_attempts: u32,
}

fn default_db_path() -> String {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tweet-relay")
        .join("tweets.db")
        .to_string_lossy()
        .to_string()
}

fn default_telegram_api_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "deepseek-r1".to_string()
}

fn default_claude_model() -> String {
    "claude-3-5-haiku-20241022".to_string()
}

fn default_claude_api_url() -> String {
    "https://api.anthropic.com/v1/messages".to_string()
}

fn default_ai_prompt() -> String {
    DEFAULT_AI_PROMPT.to_string()
}

fn default_max_tweets() -> usize {
    10
}

fn default_mirrors() -> Vec<String> {
    vec!["https://nitter.net".to_string()]
}

fn default_concurrency() -> usize {
    1
}

fn default_retention() -> usize {
    50
}

fn default_feed_timeout() -> u64 {
    30
}

fn default_ai_timeout() -> u64 {
    60
}

fn default_telegram_timeout() -> u64 {
    15
}

fn default_ai_retries() -> u32 {
    2
}

fn default_telegram_attempts() -> u32 {
    3
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            telegram_bot_token: None,
            telegram_chat_id: None,
            telegram_api_url: default_telegram_api_url(),
            ai_provider: Provider::default(),
            ollama_url: default_ollama_url(),
            ollama_model: default_ollama_model(),
            claude_api_key: None,
            claude_model: default_claude_model(),
            claude_api_url: default_claude_api_url(),
            ai_prompt: default_ai_prompt(),
            ollama_prompt: None,
            claude_prompt: None,
            keywords: Vec::new(),
            exclude_keywords: Vec::new(),
            max_tweets_per_user: default_max_tweets(),
            nitter_mirrors: default_mirrors(),
            concurrency: default_concurrency(),
            retention_keep_per_user: default_retention(),
            feed_timeout_secs: default_feed_timeout(),
            ai_timeout_secs: default_ai_timeout(),
            telegram_timeout_secs: default_telegram_timeout(),
            ai_max_retries: default_ai_retries(),
            telegram_max_attempts: default_telegram_attempts(),
        }
    }
}

impl Config {
    /// Load the TOML file (writing defaults on first use), then apply
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path.map(Path::to_path_buf).unwrap_or_else(Self::config_path);

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str::<Config>(&content)?
        } else {
            let config = Config::default();
            config.save(&config_path)?;
            config
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tweet-relay")
            .join("config.toml")
    }

    /// Override fields from environment-style keys. `lookup` is
    /// `std::env::var` in production.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("DATABASE_PATH") {
            self.db_path = v;
        }
        if let Some(v) = get("TELEGRAM_BOT_TOKEN") {
            self.telegram_bot_token = Some(v);
        }
        if let Some(v) = get("TELEGRAM_CHAT_ID") {
            self.telegram_chat_id = Some(v);
        }
        if let Some(v) = get("TELEGRAM_API_URL") {
            self.telegram_api_url = v;
        }
        if let Some(v) = get("AI_PROVIDER") {
            self.ai_provider = v.parse()?;
        }
        if let Some(v) = get("OLLAMA_URL") {
            self.ollama_url = v;
        }
        if let Some(v) = get("OLLAMA_MODEL") {
            self.ollama_model = v;
        }
        if let Some(v) = get("CLAUDE_API_KEY") {
            self.claude_api_key = Some(v);
        }
        if let Some(v) = get("CLAUDE_MODEL") {
            self.claude_model = v;
        }
        if let Some(v) = get("CLAUDE_API_URL") {
            self.claude_api_url = v;
        }
        if let Some(v) = get("AI_PROMPT") {
            self.ai_prompt = v;
        }
        if let Some(v) = get("OLLAMA_PROMPT") {
            self.ollama_prompt = Some(v);
        }
        if let Some(v) = get("CLAUDE_PROMPT") {
            self.claude_prompt = Some(v);
        }
        if let Some(v) = get("KEYWORDS") {
            self.keywords = parse_list("KEYWORDS", &v)?;
        }
        if let Some(v) = get("EXCLUDE_KEYWORDS") {
            self.exclude_keywords = parse_list("EXCLUDE_KEYWORDS", &v)?;
        }
        if let Some(v) = get("MAX_TWEETS_PER_USER") {
            self.max_tweets_per_user = parse_number("MAX_TWEETS_PER_USER", &v)?;
        }
        if let Some(v) = get("NITTER_MIRRORS") {
            let mirrors: Vec<String> = serde_json::from_str(&v)
                .map_err(|e| AppError::Config(format!("NITTER_MIRRORS must be a JSON list: {e}")))?;
            if mirrors.is_empty() {
                return Err(AppError::Config("NITTER_MIRRORS must not be empty".to_string()));
            }
            self.nitter_mirrors = mirrors;
        }
        if let Some(v) = get("RUN_CONCURRENCY") {
            self.concurrency = parse_number("RUN_CONCURRENCY", &v)?;
        }
        if let Some(v) = get("RETENTION_KEEP_PER_USER") {
            self.retention_keep_per_user = parse_number("RETENTION_KEEP_PER_USER", &v)?;
        }
        Ok(())
    }

    /// Checks needed before a run; management commands only need the database.
    pub fn validate_for_run(&self) -> Result<()> {
        if self.nitter_mirrors.iter().all(|m| m.trim().is_empty()) {
            return Err(AppError::Config("no feed mirrors configured".to_string()));
        }
        if self.telegram_bot_token.is_none() || self.telegram_chat_id.is_none() {
            return Err(AppError::Config(
                "TELEGRAM_BOT_TOKEN and TELEGRAM_CHAT_ID are required".to_string(),
            ));
        }
        if self.ai_provider == Provider::Claude && self.claude_api_key.is_none() {
            return Err(AppError::Config(
                "CLAUDE_API_KEY is required when AI_PROVIDER=claude".to_string(),
            ));
        }
        if self.max_tweets_per_user == 0 {
            return Err(AppError::Config("max_tweets_per_user must be at least 1".to_string()));
        }
        if self.concurrency == 0 {
            return Err(AppError::Config("concurrency must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Posts kept per follower by maintenance. Never fewer than a run fetches,
    /// otherwise pruned posts would come back from the feed as new.
    pub fn maintenance_keep(&self, requested: Option<usize>) -> usize {
        let keep = requested.unwrap_or(self.retention_keep_per_user);
        if keep < self.max_tweets_per_user {
            tracing::warn!(
                requested = keep,
                max_tweets_per_user = self.max_tweets_per_user,
                "Retention below the fetch window, keeping the fetch window instead"
            );
            return self.max_tweets_per_user;
        }
        keep
    }

    /// Prompt for the active backend: its own override, else the general one.
    pub fn prompt_for(&self, provider: Provider) -> &str {
        let specific = match provider {
            Provider::Ollama => self.ollama_prompt.as_deref(),
            Provider::Claude => self.claude_prompt.as_deref(),
            Provider::Keyword => None,
        };
        specific.unwrap_or(&self.ai_prompt)
    }

    pub fn feed_timeout(&self) -> Duration {
        Duration::from_secs(self.feed_timeout_secs)
    }

    pub fn ai_timeout(&self) -> Duration {
        Duration::from_secs(self.ai_timeout_secs)
    }

    pub fn telegram_timeout(&self) -> Duration {
        Duration::from_secs(self.telegram_timeout_secs)
    }
}

/// Accepts a JSON list or a comma separated string.
fn parse_list(key: &str, value: &str) -> Result<Vec<String>> {
    let trimmed = value.trim();
    let items: Vec<String> = if trimmed.starts_with('[') {
        serde_json::from_str(trimmed)
            .map_err(|e| AppError::Config(format!("{key} must be a JSON list: {e}")))?
    } else {
        trimmed.split(',').map(str::to_string).collect()
    };
    Ok(items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| AppError::Config(format!("{key} must be a number, got '{value}'")))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn environment_overrides_file_values() {
        let vars = env(&[
            ("AI_PROVIDER", "keyword"),
            ("KEYWORDS", "election, budget"),
            ("MAX_TWEETS_PER_USER", "25"),
            ("NITTER_MIRRORS", r#"["https://a.example", "https://b.example"]"#),
            ("TELEGRAM_BOT_TOKEN", "123:abc"),
            ("TELEGRAM_CHAT_ID", "-100"),
            ("OLLAMA_MODEL", ""),
        ]);
        let mut config = Config::default();
        config.apply_overrides(|k| vars.get(k).cloned()).unwrap();

        assert_eq!(config.ai_provider, Provider::Keyword);
        assert_eq!(config.keywords, vec!["election", "budget"]);
        assert_eq!(config.max_tweets_per_user, 25);
        assert_eq!(config.nitter_mirrors.len(), 2);
        assert_eq!(config.ollama_model, "deepseek-r1");
        assert!(config.validate_for_run().is_ok());
    }

    #[test]
    fn rejects_bad_overrides() {
        let mut config = Config::default();
        let vars = env(&[("NITTER_MIRRORS", "https://not-json.example")]);
        assert!(config.apply_overrides(|k| vars.get(k).cloned()).is_err());

        let vars = env(&[("MAX_TWEETS_PER_USER", "ten")]);
        assert!(config.apply_overrides(|k| vars.get(k).cloned()).is_err());

        let vars = env(&[("AI_PROVIDER", "gpt")]);
        assert!(config.apply_overrides(|k| vars.get(k).cloned()).is_err());

        let vars = env(&[("KEYWORDS", r#"["election", "#)]);
        let err = config.apply_overrides(|k| vars.get(k).cloned()).unwrap_err();
        assert!(matches!(err, AppError::Config(ref msg) if msg.starts_with("KEYWORDS")));

        let vars = env(&[("EXCLUDE_KEYWORDS", "[1, 2]")]);
        assert!(matches!(
            config.apply_overrides(|k| vars.get(k).cloned()),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn maintenance_never_keeps_less_than_the_fetch_window() {
        let mut config = Config::default();
        config.max_tweets_per_user = 10;
        config.retention_keep_per_user = 50;
        assert_eq!(config.maintenance_keep(None), 50);
        assert_eq!(config.maintenance_keep(Some(25)), 25);
        assert_eq!(config.maintenance_keep(Some(1)), 10);

        config.retention_keep_per_user = 3;
        assert_eq!(config.maintenance_keep(None), 10);
    }

    #[test]
    fn prompt_resolution_prefers_backend_override() {
        let mut config = Config::default();
        assert_eq!(config.prompt_for(Provider::Ollama), DEFAULT_AI_PROMPT);
        config.ai_prompt = "general".into();
        config.claude_prompt = Some("claude only".into());
        assert_eq!(config.prompt_for(Provider::Ollama), "general");
        assert_eq!(config.prompt_for(Provider::Claude), "claude only");
    }

    #[test]
    fn run_validation_requires_credentials() {
        let mut config = Config::default();
        assert!(config.validate_for_run().is_err());
        config.telegram_bot_token = Some("t".into());
        config.telegram_chat_id = Some("c".into());
        assert!(config.validate_for_run().is_ok());
        config.ai_provider = Provider::Claude;
        assert!(config.validate_for_run().is_err());
    }

    #[test]
    fn writes_defaults_on_first_load_and_reads_them_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        Config::load(Some(&path)).unwrap();
        assert!(path.exists());

        let reread: Config = toml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(reread.max_tweets_per_user, default_max_tweets());
        assert_eq!(reread.nitter_mirrors, default_mirrors());
    }
}
