// src/notify/webhook.rs
use anyhow::{Context, Result};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use super::WebhookSender;

/// Posts `{"text": ...}` to Mattermost/Slack style incoming webhooks.
/// One attempt per call; the dispatcher never retries.
#[derive(Clone)]
pub struct HttpWebhookSender {
    client: Client,
    timeout: Duration,
}

impl HttpWebhookSender {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }
}

impl Default for HttpWebhookSender {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
pub struct IncomingWebhook<'a> {
    pub text: &'a str,
}

#[async_trait::async_trait]
impl WebhookSender for HttpWebhookSender {
    async fn post(&self, url: &str, text: &str) -> Result<()> {
        self.client
            .post(url)
            .timeout(self.timeout)
            .json(&IncomingWebhook { text })
            .send()
            .await
            .context("webhook post")?
            .error_for_status()
            .context("webhook non-2xx")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_is_single_text_field() {
        let body = serde_json::to_value(IncomingWebhook { text: "## hi" }).unwrap();
        assert_eq!(body, serde_json::json!({ "text": "## hi" }));
    }
}
