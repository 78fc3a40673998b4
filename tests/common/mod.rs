// tests/common/mod.rs
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;

use review_alerts::notify::WebhookSender;
use review_alerts::persist::MemoryStore;
use review_alerts::reviews::source::ReviewSource;
use review_alerts::reviews::PackageRegistration;
use review_alerts::{AppState, Config, Core, Review, Timestamp};

pub const PKG: &str = "com.example.app";
pub const USER: &str = "u1";

pub fn review(id: &str, secs: i64) -> Review {
    review_for(PKG, id, secs)
}

pub fn review_for(package: &str, id: &str, secs: i64) -> Review {
    Review {
        id: id.to_string(),
        author: format!("author-{id}"),
        stars: 3,
        text: format!("text of {id}"),
        modified: Timestamp::new(1_700_000_000 + secs, 0),
        package: package.to_string(),
        user: USER.to_string(),
    }
}

/// Hands out queued responses per package; an exhausted queue yields an
/// empty fetch.
#[derive(Default)]
pub struct ScriptedSource {
    queued: Mutex<HashMap<String, VecDeque<Result<Vec<Review>, String>>>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_ok(&self, package: &str, reviews: Vec<Review>) {
        self.queued
            .lock()
            .entry(package.to_string())
            .or_default()
            .push_back(Ok(reviews));
    }

    pub fn push_err(&self, package: &str, msg: &str) {
        self.queued
            .lock()
            .entry(package.to_string())
            .or_default()
            .push_back(Err(msg.to_string()));
    }
}

#[async_trait]
impl ReviewSource for ScriptedSource {
    async fn fetch(&self, reg: &PackageRegistration) -> Result<Vec<Review>> {
        let next = self
            .queued
            .lock()
            .get_mut(&reg.package)
            .and_then(VecDeque::pop_front);
        match next {
            Some(Ok(list)) => Ok(list),
            Some(Err(msg)) => Err(anyhow!(msg)),
            None => Ok(Vec::new()),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Records every post; optionally rejects all of them.
#[derive(Default)]
pub struct RecordingSender {
    pub sent: Mutex<Vec<(String, String)>>,
    pub fail: bool,
}

impl RecordingSender {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl WebhookSender for RecordingSender {
    async fn post(&self, url: &str, text: &str) -> Result<()> {
        self.sent.lock().push((url.to_string(), text.to_string()));
        if self.fail {
            return Err(anyhow!("webhook returned 500"));
        }
        Ok(())
    }
}

pub struct Harness {
    pub state: AppState,
    pub source: Arc<ScriptedSource>,
    pub sender: Arc<RecordingSender>,
    pub store: Arc<MemoryStore>,
}

pub fn harness_with(core: Core, sender: RecordingSender) -> Harness {
    let source = Arc::new(ScriptedSource::new());
    let sender = Arc::new(sender);
    let store = Arc::new(MemoryStore::new());
    let state = AppState::new(
        core,
        source.clone(),
        sender.clone(),
        store.clone(),
        Config::default(),
    );
    Harness {
        state,
        source,
        sender,
        store,
    }
}

pub fn harness(core: Core) -> Harness {
    harness_with(core, RecordingSender::default())
}
