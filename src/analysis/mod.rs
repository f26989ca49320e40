mod backend;
mod claude;
mod keyword;
mod ollama;
mod response;

use std::sync::Arc;

pub use backend::{AiAnalyzer, AiBackend, RetryPolicy};
pub use claude::ClaudeBackend;
pub use keyword::KeywordAnalyzer;
pub use ollama::OllamaBackend;
pub use response::{clean_reply, interpret_reply, is_negative};

use crate::config::{Config, Provider};
use crate::error::Result;
use crate::models::Verdict;

/// The relevance filter, chosen once from configuration.
pub enum Analyzer {
    Keyword(KeywordAnalyzer),
    Ai(AiAnalyzer),
}

impl Analyzer {
    pub fn from_config(config: &Config) -> Result<Self> {
        let backend: Arc<dyn AiBackend> = match config.ai_provider {
            Provider::Keyword => {
                let analyzer = KeywordAnalyzer::new(&config.keywords)
                    .with_exclusions(&config.exclude_keywords);
                return Ok(Analyzer::Keyword(analyzer));
            }
            Provider::Ollama => Arc::new(OllamaBackend::new(
                config.ollama_url.clone(),
                config.ollama_model.clone(),
                config.ai_timeout(),
            )),
            Provider::Claude => Arc::new(ClaudeBackend::new(
                config.claude_api_url.clone(),
                config.claude_api_key.clone().unwrap_or_default(),
                config.claude_model.clone(),
                config.ai_timeout(),
            )),
        };

        let analyzer = AiAnalyzer::new(backend, config.prompt_for(config.ai_provider)).with_retry(
            RetryPolicy {
                max_retries: config.ai_max_retries,
                ..RetryPolicy::default()
            },
        );
        Ok(Analyzer::Ai(analyzer))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Analyzer::Keyword(_) => "keyword",
            Analyzer::Ai(ai) => ai.backend_name(),
        }
    }

    pub async fn evaluate(&self, text: &str) -> Result<Verdict> {
        match self {
            Analyzer::Keyword(keyword) => Ok(keyword.evaluate(text)),
            Analyzer::Ai(ai) => ai.evaluate(text).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selects_strategy_from_provider() {
        let mut config = Config::default();
        config.ai_provider = Provider::Keyword;
        assert_eq!(Analyzer::from_config(&config).unwrap().name(), "keyword");

        config.ai_provider = Provider::Ollama;
        assert_eq!(Analyzer::from_config(&config).unwrap().name(), "ollama");

        config.ai_provider = Provider::Claude;
        config.claude_api_key = Some("sk-test".into());
        assert_eq!(Analyzer::from_config(&config).unwrap().name(), "claude");
    }

    #[tokio::test]
    async fn keyword_strategy_never_fails() {
        let mut config = Config::default();
        config.ai_provider = Provider::Keyword;
        config.keywords = vec!["election".into()];
        let analyzer = Analyzer::from_config(&config).unwrap();

        let hit = analyzer.evaluate("New election results announced").await.unwrap();
        assert!(hit.is_relevant);
        let miss = analyzer.evaluate("Weather today is sunny").await.unwrap();
        assert!(!miss.is_relevant);
    }
}
