// src/notify/mod.rs
pub mod digest;
pub mod webhook;

use anyhow::Result;

pub use webhook::HttpWebhookSender;

/// Delivers a rendered digest to an incoming-webhook URL.
#[async_trait::async_trait]
pub trait WebhookSender: Send + Sync {
    async fn post(&self, url: &str, text: &str) -> Result<()>;
}
