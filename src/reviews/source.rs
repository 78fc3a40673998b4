// src/reviews/source.rs
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use serde::Deserialize;

use super::{PackageRegistration, Review, Timestamp};

/// Anything that can list the current reviews of a package.
#[async_trait]
pub trait ReviewSource: Send + Sync {
    /// Current review list, ideally newest first. Errors are reported, the
    /// caller decides what to skip.
    async fn fetch(&self, reg: &PackageRegistration) -> Result<Vec<Review>>;
    fn name(&self) -> &'static str;
}

pub const DEFAULT_PLAY_BASE_URL: &str = "https://androidpublisher.googleapis.com/androidpublisher/v3";

/// Google Play Developer API reviews listing.
pub struct GooglePlaySource {
    base_url: String,
    access_token: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl GooglePlaySource {
    pub fn new(base_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    fn reviews_url(&self, package: &str) -> String {
        format!("{}/applications/{}/reviews", self.base_url, package)
    }
}

#[async_trait]
impl ReviewSource for GooglePlaySource {
    async fn fetch(&self, reg: &PackageRegistration) -> Result<Vec<Review>> {
        let body = self
            .client
            .get(self.reviews_url(&reg.package))
            .bearer_auth(&self.access_token)
            .timeout(self.timeout)
            .send()
            .await
            .with_context(|| format!("play reviews request for {}", reg.package))?
            .error_for_status()
            .with_context(|| format!("play reviews non-2xx for {}", reg.package))?
            .text()
            .await
            .context("play reviews body")?;
        parse_play_reviews(&body, reg)
    }

    fn name(&self) -> &'static str {
        "google-play"
    }
}

// --- Play API wire shape (only the fields we keep) ---

#[derive(Debug, Deserialize)]
struct PlayListResponse {
    #[serde(default)]
    reviews: Vec<PlayReview>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayReview {
    review_id: String,
    #[serde(default)]
    author_name: String,
    #[serde(default)]
    comments: Vec<PlayComment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayComment {
    user_comment: Option<PlayUserComment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayUserComment {
    #[serde(default)]
    text: String,
    #[serde(default)]
    star_rating: u8,
    last_modified: Option<PlayTimestamp>,
}

#[derive(Debug, Deserialize)]
struct PlayTimestamp {
    // int64 fields come back as JSON strings from Google APIs
    seconds: SecondsField,
    #[serde(default)]
    nanos: u32,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SecondsField {
    Num(i64),
    Str(String),
}

impl SecondsField {
    fn value(&self) -> Result<i64> {
        match self {
            SecondsField::Num(n) => Ok(*n),
            SecondsField::Str(s) => s
                .trim()
                .parse()
                .with_context(|| format!("bad lastModified.seconds: {s}")),
        }
    }
}

/// Decode a Play `reviews.list` body into our model, stamping package and
/// owner. Reviews without a user comment are skipped.
pub fn parse_play_reviews(body: &str, reg: &PackageRegistration) -> Result<Vec<Review>> {
    let parsed: PlayListResponse =
        serde_json::from_str(body).context("parse play reviews json")?;

    let mut out = Vec::with_capacity(parsed.reviews.len());
    for r in parsed.reviews {
        let Some(comment) = r.comments.into_iter().find_map(|c| c.user_comment) else {
            tracing::debug!(review = %r.review_id, "review without user comment skipped");
            continue;
        };
        let modified = match &comment.last_modified {
            Some(ts) => Timestamp::new(ts.seconds.value()?, ts.nanos),
            None => Timestamp::default(),
        };
        out.push(Review {
            id: r.review_id,
            author: r.author_name,
            stars: comment.star_rating.min(5),
            text: comment.text,
            modified,
            package: reg.package.clone(),
            user: reg.user.clone(),
        });
    }
    Ok(out)
}

/// Development source: every call yields one brand-new review.
#[derive(Debug, Default)]
pub struct MockSource;

#[async_trait]
impl ReviewSource for MockSource {
    async fn fetch(&self, reg: &PackageRegistration) -> Result<Vec<Review>> {
        let now = Utc::now();
        let stars = rand::rng().random_range(0..=5u8);
        Ok(vec![Review {
            id: format!("mock-{}", now.timestamp_nanos_opt().unwrap_or_default()),
            author: "MockUser".to_string(),
            stars,
            text: format!("This is a mock review written at {}", now.to_rfc3339()),
            modified: Timestamp::from_datetime(now),
            package: reg.package.clone(),
            user: reg.user.clone(),
        }])
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
