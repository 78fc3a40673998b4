// src/bin/send_test_alert.rs
//! Renders a sample review digest and posts it to one webhook, to check the
//! webhook URL before registering an alert on it.
//!
//! Usage: send-test-alert <webhook-url> [alert-name]

use chrono::Utc;
use review_alerts::notify::digest::render_test_alert;
use review_alerts::notify::{HttpWebhookSender, WebhookSender};
use review_alerts::{Review, Timestamp};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let mut args = std::env::args().skip(1);
    let Some(url) = args.next() else {
        anyhow::bail!("usage: send-test-alert <webhook-url> [alert-name]");
    };
    let name = args.next().unwrap_or_else(|| "test".to_string());

    let review = Review {
        id: "ReviewId".to_string(),
        author: "AuthorName".to_string(),
        stars: 5,
        text: "Text".to_string(),
        modified: Timestamp::from_datetime(Utc::now()),
        package: "com.example.app".to_string(),
        user: "demo".to_string(),
    };

    let sender = HttpWebhookSender::new();
    sender.post(&url, &render_test_alert(&name, &review)).await?;
    tracing::info!(%url, "test alert sent");
    Ok(())
}
