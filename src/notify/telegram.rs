use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

use super::Notifier;

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    description: Option<String>,
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

enum Attempt {
    Delivered,
    RetryAfter(Duration, String),
    Failed(String),
}

/// Bot API client bound to a single chat.
pub struct TelegramNotifier {
    client: Client,
    api_url: String,
    bot_token: String,
    chat_id: String,
    max_attempts: u32,
    retry_delay: Duration,
    max_retry_wait: Duration,
}

impl TelegramNotifier {
    pub fn new(api_url: String, bot_token: String, chat_id: String, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            bot_token,
            chat_id,
            max_attempts: 3,
            retry_delay: Duration::from_secs(2),
            max_retry_wait: Duration::from_secs(60),
        }
    }

    /// `retry_delay` applies after transport and server errors; advised
    /// rate-limit waits are honored up to `max_retry_wait`.
    pub fn with_retry(mut self, max_attempts: u32, retry_delay: Duration, max_retry_wait: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_delay = retry_delay;
        self.max_retry_wait = max_retry_wait;
        self
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_url, self.bot_token, method)
    }

    async fn attempt(&self, message: &str, image: Option<&[u8]>) -> Attempt {
        let request = match image {
            Some(bytes) => {
                let form = Form::new()
                    .text("chat_id", self.chat_id.clone())
                    .text("caption", message.to_string())
                    .text("parse_mode", "HTML")
                    .part("photo", Part::bytes(bytes.to_vec()).file_name("photo.jpg"));
                self.client.post(self.method_url("sendPhoto")).multipart(form)
            }
            None => self.client.post(self.method_url("sendMessage")).json(&SendMessageRequest {
                chat_id: &self.chat_id,
                text: message,
                parse_mode: "HTML",
                disable_web_page_preview: false,
            }),
        };

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => return Attempt::RetryAfter(self.retry_delay, format!("transport error: {}", e.without_url())),
        };

        let status = response.status();
        let body: Option<TelegramResponse> = response.json().await.ok();

        if status.is_success() && body.as_ref().is_some_and(|b| b.ok) {
            return Attempt::Delivered;
        }

        let description = body
            .as_ref()
            .and_then(|b| b.description.clone())
            .unwrap_or_else(|| format!("HTTP {status}"));

        if status == StatusCode::TOO_MANY_REQUESTS {
            let advised = body
                .and_then(|b| b.parameters)
                .and_then(|p| p.retry_after)
                .map(Duration::from_secs)
                .unwrap_or(self.retry_delay);
            return Attempt::RetryAfter(advised.min(self.max_retry_wait), description);
        }

        if status.is_server_error() {
            return Attempt::RetryAfter(self.retry_delay, description);
        }

        Attempt::Failed(description)
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, message: &str, image: Option<&[u8]>) -> Result<()> {
        let mut attempt = 1;
        loop {
            match self.attempt(message, image).await {
                Attempt::Delivered => {
                    tracing::debug!(attempt, with_image = image.is_some(), "Telegram message delivered");
                    return Ok(());
                }
                Attempt::Failed(reason) => return Err(AppError::DeliveryFailed(reason)),
                Attempt::RetryAfter(_, reason) if attempt >= self.max_attempts => {
                    return Err(AppError::DeliveryFailed(format!(
                        "{reason} (after {attempt} attempts)"
                    )));
                }
                Attempt::RetryAfter(wait, reason) => {
                    tracing::warn!(attempt, wait_secs = wait.as_secs(), "Telegram send failed: {}", reason);
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::{assert_err, assert_ok};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn notifier(server: &MockServer) -> TelegramNotifier {
        TelegramNotifier::new(server.uri(), "123:abc".into(), "-100".into(), Duration::from_secs(5))
            .with_retry(3, Duration::ZERO, Duration::ZERO)
    }

    #[tokio::test]
    async fn sends_html_text_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .and(body_partial_json(serde_json::json!({
                "chat_id": "-100",
                "text": "<b>hi</b>",
                "parse_mode": "HTML"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true, "result": {}})))
            .expect(1)
            .mount(&server)
            .await;

        assert_ok!(notifier(&server).send("<b>hi</b>", None).await);
    }

    #[tokio::test]
    async fn sends_photo_when_image_present() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendPhoto"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        assert_ok!(notifier(&server).send("caption", Some(&[1, 2, 3])).await);
    }

    #[tokio::test]
    async fn waits_out_rate_limit_then_delivers() {
        let server = MockServer::start().await;
        Mock::given(path("/bot123:abc/sendMessage"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "ok": false,
                "error_code": 429,
                "description": "Too Many Requests: retry after 5",
                "parameters": {"retry_after": 5}
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(path("/bot123:abc/sendMessage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        assert_ok!(notifier(&server).send("hello", None).await);
    }

    #[tokio::test]
    async fn persistent_rate_limit_is_delivery_failure() {
        let server = MockServer::start().await;
        Mock::given(path("/bot123:abc/sendMessage"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "ok": false,
                "description": "Too Many Requests",
                "parameters": {"retry_after": 1}
            })))
            .expect(3)
            .mount(&server)
            .await;

        let err = assert_err!(notifier(&server).send("hello", None).await);
        assert!(matches!(err, AppError::DeliveryFailed(_)));
    }

    #[tokio::test]
    async fn client_errors_fail_without_retry() {
        let server = MockServer::start().await;
        Mock::given(path("/bot123:abc/sendMessage"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "ok": false,
                "description": "Bad Request: chat not found"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = assert_err!(notifier(&server).send("hello", None).await);
        assert_eq!(err.to_string(), "delivery failed: Bad Request: chat not found");
    }
}
