use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

use super::backend::AiBackend;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: Option<ChatMessage>,
}

/// Locally hosted model served by Ollama's chat endpoint.
pub struct OllamaBackend {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaBackend {
    pub fn new(base_url: String, model: String, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        }
    }
}

#[async_trait]
impl AiBackend for OllamaBackend {
    fn name(&self) -> &'static str {
        "ollama"
    }

    async fn complete(&self, prompt: &str, text: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: "You are an analyzer that evaluates content.".to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: format!("{prompt}\n\nTweet: {text}"),
                },
            ],
            stream: false,
        };

        let started = Instant::now();
        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(AppError::AiBackend {
                provider: "ollama",
                message: format!("model {} not found, pull it first", self.model),
                retryable: false,
            });
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::AiBackend {
                provider: "ollama",
                message: format!("HTTP {status}: {error_text}"),
                retryable: status.is_server_error(),
            });
        }

        let chat: ChatResponse = response.json().await?;
        tracing::debug!(
            model = %self.model,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Ollama analysis received"
        );

        Ok(chat.message.map(|m| m.content).unwrap_or_default())
    }
}
