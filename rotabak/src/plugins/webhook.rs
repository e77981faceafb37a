//! Run summaries POSTed as JSON to an HTTP endpoint.

use async_trait::async_trait;
use rotabak_core::capability::Notifier;
use rotabak_core::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookOptions {
    pub url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    subject: &'a str,
    body: &'a str,
    hostname: &'a str,
}

pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    hostname: String,
}

impl WebhookNotifier {
    pub fn new(options: &WebhookOptions, hostname: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(options.timeout_secs))
            .build()
            .map_err(|e| CoreError::Notification(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: options.url.clone(),
            hostname: hostname.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn kind(&self) -> &'static str {
        "webhook"
    }

    async fn send(&self, subject: &str, body: &str) -> Result<()> {
        let payload = WebhookPayload {
            subject,
            body,
            hostname: &self.hostname,
        };
        debug!("Posting run summary to {}", self.url);

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| CoreError::Notification(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CoreError::Notification(format!(
                "{} answered HTTP {}",
                self.url, status
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn notifier(server: &MockServer) -> WebhookNotifier {
        let options = WebhookOptions {
            url: format!("{}/hooks/backup", server.uri()),
            timeout_secs: 5,
        };
        WebhookNotifier::new(&options, "backup01").unwrap()
    }

    #[tokio::test]
    async fn test_posts_summary() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hooks/backup"))
            .and(body_json(serde_json::json!({
                "subject": "backup01: rotabak results for 2024-06-10 [SUCCESS]",
                "body": "In total 0 backup entries have been processed with 0 errors:\n",
                "hostname": "backup01",
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        notifier(&server)
            .send(
                "backup01: rotabak results for 2024-06-10 [SUCCESS]",
                "In total 0 backup entries have been processed with 0 errors:\n",
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_server_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let result = notifier(&server).send("subject", "body").await;
        match result {
            Err(CoreError::Notification(message)) => assert!(message.contains("502")),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
