// src/persist.rs
//! Persistence gateway: packages, aliases, review caches and alerts.
//!
//! Every operation is best-effort. Callers log failures and carry on with
//! their in-memory state; a failed load degrades to an empty structure.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::counter;
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use tokio::fs;
use tokio::sync::Mutex as AsyncMutex;

use crate::alerts::AlertRegistry;
use crate::reviews::{PackageRegistration, ReviewStore};
use crate::state::Aliases;

#[async_trait]
pub trait Persistence: Send + Sync {
    async fn save_packages(&self, packages: &[PackageRegistration]) -> Result<()>;
    async fn load_packages(&self) -> Result<Vec<PackageRegistration>>;
    async fn save_aliases(&self, aliases: &Aliases) -> Result<()>;
    async fn load_aliases(&self) -> Result<Aliases>;
    async fn save_reviews(&self, reviews: &ReviewStore) -> Result<()>;
    async fn load_reviews(&self) -> Result<ReviewStore>;
    async fn save_alerts(&self, alerts: &AlertRegistry) -> Result<()>;
    async fn load_alerts(&self) -> Result<AlertRegistry>;
}

/// Log-and-continue wrapper for saves.
pub fn log_save_result(what: &'static str, res: Result<()>) {
    if let Err(e) = res {
        tracing::warn!(error = ?e, what, "persist save failed");
        counter!("persist_errors_total").increment(1);
    }
}

/// Log-and-default wrapper for loads.
pub fn or_default<T: Default>(what: &'static str, res: Result<T>) -> T {
    res.unwrap_or_else(|e| {
        tracing::warn!(error = ?e, what, "persist load failed, starting empty");
        counter!("persist_errors_total").increment(1);
        T::default()
    })
}

const PACKAGES_FILE: &str = "packages.json";
const ALIASES_FILE: &str = "aliases.json";
const REVIEWS_FILE: &str = "reviews.json";
const ALERTS_FILE: &str = "alerts.json";

/// One write lock per file: a temp file is only ever written and renamed by
/// the writer holding its file's lock.
#[derive(Debug, Default)]
struct FileLocks {
    packages: AsyncMutex<()>,
    aliases: AsyncMutex<()>,
    reviews: AsyncMutex<()>,
    alerts: AsyncMutex<()>,
}

/// Pretty JSON files under one directory, written via temp file + rename so a
/// reader never sees a half-written file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
    locks: Arc<FileLocks>,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            locks: Arc::new(FileLocks::default()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn write<T: Serialize + ?Sized>(
        &self,
        file: &str,
        lock: &AsyncMutex<()>,
        value: &T,
    ) -> Result<()> {
        let data = serde_json::to_vec_pretty(value).with_context(|| format!("encoding {file}"))?;
        let _turn = lock.lock().await;
        fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("creating {}", self.dir.display()))?;
        let path = self.dir.join(file);
        let tmp = self.dir.join(format!("{file}.tmp"));
        fs::write(&tmp, data)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("renaming into {}", path.display()))?;
        Ok(())
    }

    /// A missing file is a first start, not an error.
    async fn read<T: DeserializeOwned + Default>(&self, file: &str) -> Result<T> {
        let path = self.dir.join(file);
        match fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("decoding {}", path.display())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(T::default()),
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }
}

#[async_trait]
impl Persistence for JsonFileStore {
    async fn save_packages(&self, packages: &[PackageRegistration]) -> Result<()> {
        self.write(PACKAGES_FILE, &self.locks.packages, packages).await
    }

    async fn load_packages(&self) -> Result<Vec<PackageRegistration>> {
        self.read(PACKAGES_FILE).await
    }

    async fn save_aliases(&self, aliases: &Aliases) -> Result<()> {
        self.write(ALIASES_FILE, &self.locks.aliases, aliases).await
    }

    async fn load_aliases(&self) -> Result<Aliases> {
        self.read(ALIASES_FILE).await
    }

    async fn save_reviews(&self, reviews: &ReviewStore) -> Result<()> {
        self.write(REVIEWS_FILE, &self.locks.reviews, reviews).await
    }

    async fn load_reviews(&self) -> Result<ReviewStore> {
        self.read(REVIEWS_FILE).await
    }

    async fn save_alerts(&self, alerts: &AlertRegistry) -> Result<()> {
        self.write(ALERTS_FILE, &self.locks.alerts, alerts).await
    }

    async fn load_alerts(&self) -> Result<AlertRegistry> {
        self.read(ALERTS_FILE).await
    }
}

#[derive(Debug, Default, Clone)]
struct MemoryData {
    packages: Vec<PackageRegistration>,
    aliases: Aliases,
    reviews: ReviewStore,
    alerts: AlertRegistry,
    review_saves: usize,
}

/// In-process store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Mutex<MemoryData>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times the review cache has been saved.
    pub fn review_saves(&self) -> usize {
        self.data.lock().review_saves
    }

    pub fn saved_reviews(&self) -> ReviewStore {
        self.data.lock().reviews.clone()
    }

    pub fn saved_alerts(&self) -> AlertRegistry {
        self.data.lock().alerts.clone()
    }
}

#[async_trait]
impl Persistence for MemoryStore {
    async fn save_packages(&self, packages: &[PackageRegistration]) -> Result<()> {
        self.data.lock().packages = packages.to_vec();
        Ok(())
    }

    async fn load_packages(&self) -> Result<Vec<PackageRegistration>> {
        Ok(self.data.lock().packages.clone())
    }

    async fn save_aliases(&self, aliases: &Aliases) -> Result<()> {
        self.data.lock().aliases = aliases.clone();
        Ok(())
    }

    async fn load_aliases(&self) -> Result<Aliases> {
        Ok(self.data.lock().aliases.clone())
    }

    async fn save_reviews(&self, reviews: &ReviewStore) -> Result<()> {
        let mut data = self.data.lock();
        data.reviews = reviews.clone();
        data.review_saves += 1;
        Ok(())
    }

    async fn load_reviews(&self) -> Result<ReviewStore> {
        Ok(self.data.lock().reviews.clone())
    }

    async fn save_alerts(&self, alerts: &AlertRegistry) -> Result<()> {
        self.data.lock().alerts = alerts.clone();
        Ok(())
    }

    async fn load_alerts(&self) -> Result<AlertRegistry> {
        Ok(self.data.lock().alerts.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reviews::testing::review;

    #[tokio::test]
    async fn json_store_round_trips_and_tolerates_first_start() {
        let tmp = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(tmp.path().join("data"));

        // Nothing written yet.
        assert!(store.load_packages().await.unwrap().is_empty());
        assert_eq!(store.load_reviews().await.unwrap(), ReviewStore::default());

        let mut reviews = ReviewStore::new();
        reviews.merge("u1", "com.example.app", vec![review("a", 2), review("b", 1)]);
        store.save_reviews(&reviews).await.unwrap();
        store
            .save_packages(&[PackageRegistration::new("u1", "com.example.app")])
            .await
            .unwrap();

        assert_eq!(store.load_reviews().await.unwrap(), reviews);
        assert_eq!(store.load_packages().await.unwrap().len(), 1);
        assert!(!store.dir().join("reviews.json.tmp").exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn overlapping_saves_of_one_file_all_succeed() {
        use crate::alerts::{Alert, AlertVariant};
        use chrono::Utc;

        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonFileStore::new(tmp.path()));
        let mut saves = tokio::task::JoinSet::new();
        for i in 0..64 {
            let store = store.clone();
            saves.spawn(async move {
                let mut alerts = AlertRegistry::new();
                alerts.insert(
                    "u1",
                    &format!("a{i}"),
                    Alert::new(AlertVariant::NewReviews, "http://hook", "com.example.app", 60, Utc::now()),
                );
                store.save_alerts(&alerts).await
            });
        }

        let mut failures = Vec::new();
        while let Some(joined) = saves.join_next().await {
            if let Err(e) = joined.unwrap() {
                failures.push(format!("{e:#}"));
            }
        }
        assert!(failures.is_empty(), "failed saves: {failures:?}");

        // Whichever save landed last, the file is one whole registry.
        let loaded = store.load_alerts().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(!tmp.path().join("alerts.json.tmp").exists());
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error_and_degrades_to_default() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(ALERTS_FILE), b"{ not json").unwrap();
        let store = JsonFileStore::new(tmp.path());
        let res = store.load_alerts().await;
        assert!(res.is_err());
        let alerts = or_default("alerts", res);
        assert!(alerts.is_empty());
    }
}
