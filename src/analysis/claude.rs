use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

use super::backend::AiBackend;

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct MessageRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<Message>,
    system: Option<String>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    text: Option<String>,
}

pub struct ClaudeBackend {
    client: Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl ClaudeBackend {
    pub fn new(api_url: String, api_key: String, model: String, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");
        Self {
            client,
            api_url,
            api_key,
            model,
        }
    }
}

#[async_trait]
impl AiBackend for ClaudeBackend {
    fn name(&self) -> &'static str {
        "claude"
    }

    async fn complete(&self, prompt: &str, text: &str) -> Result<String> {
        // Tweets are short; anything longer is not worth the tokens
        let text: String = text.chars().take(4000).collect();

        let request = MessageRequest {
            model: self.model.clone(),
            max_tokens: 300,
            temperature: 0.3,
            messages: vec![Message {
                role: "user".to_string(),
                content: format!("{prompt}\n\nTweet: {text}"),
            }],
            system: Some("You are an analyzer that evaluates content.".to_string()),
        };

        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::AiBackend {
                provider: "claude",
                message: format!("HTTP {status}: {error_text}"),
                retryable: status.is_server_error() || status.as_u16() == 429,
            });
        }

        let message_response: MessageResponse = response.json().await?;

        let reply = message_response
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("\n");

        tracing::debug!(model = %self.model, "Claude analysis received");
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn joins_text_blocks() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("x-api-key", "sk-test"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [
                    {"type": "text", "text": "{\"is_relevant\": true,"},
                    {"type": "text", "text": "\"reason\": \"Launch\"}"}
                ]
            })))
            .mount(&server)
            .await;

        let backend = ClaudeBackend::new(
            format!("{}/v1/messages", server.uri()),
            "sk-test".into(),
            "claude-3-5-haiku-20241022".into(),
            Duration::from_secs(5),
        );
        let reply = backend.complete("prompt", "tweet").await.unwrap();
        assert_eq!(reply, "{\"is_relevant\": true,\n\"reason\": \"Launch\"}");
    }

    #[tokio::test]
    async fn rate_limit_is_retryable_but_auth_is_not() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid x-api-key"))
            .mount(&server)
            .await;
        let backend = ClaudeBackend::new(server.uri(), "bad".into(), "m".into(), Duration::from_secs(5));
        assert!(!backend.complete("p", "t").await.unwrap_err().is_transient());

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;
        let backend = ClaudeBackend::new(server.uri(), "k".into(), "m".into(), Duration::from_secs(5));
        assert!(backend.complete("p", "t").await.unwrap_err().is_transient());
    }
}
