// src/state.rs
//! Shared service state.
//!
//! Everything the poll loop, the dispatch loops and the command layer touch
//! lives in one [`Core`] behind one lock. The guard is never held across an
//! `.await`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;

use crate::alerts::AlertRegistry;
use crate::config::{Config, PersistenceKind};
use crate::notify::{HttpWebhookSender, WebhookSender};
use crate::persist::{log_save_result, or_default, JsonFileStore, MemoryStore, Persistence};
use crate::reviews::source::{GooglePlaySource, MockSource, ReviewSource};
use crate::reviews::{MergeDelta, PackageRegistration, Review, ReviewStore};

/// user -> alias -> package
pub type Aliases = HashMap<String, BTreeMap<String, String>>;

#[derive(Debug, Default, Clone)]
pub struct Core {
    pub packages: Vec<PackageRegistration>,
    pub aliases: Aliases,
    pub reviews: ReviewStore,
    pub alerts: AlertRegistry,
}

pub type SharedCore = Arc<Mutex<Core>>;

impl Core {
    /// Load everything from `store`; any part that fails to load starts empty.
    pub async fn load(store: &dyn Persistence) -> Self {
        let mut core = Core {
            packages: or_default("packages", store.load_packages().await),
            aliases: or_default("aliases", store.load_aliases().await),
            reviews: or_default("reviews", store.load_reviews().await),
            alerts: or_default("alerts", store.load_alerts().await),
        };
        for reg in &core.packages {
            core.reviews.ensure(&reg.user, &reg.package);
        }
        tracing::info!(
            packages = core.packages.len(),
            alerts = core.alerts.len(),
            reviews = core.reviews.total_reviews(),
            "state loaded"
        );
        core
    }

    pub fn shared(self) -> SharedCore {
        Arc::new(Mutex::new(self))
    }

    pub fn is_registered(&self, user: &str, package: &str) -> bool {
        self.packages
            .iter()
            .any(|p| p.user == user && p.package == package)
    }

    /// Register a package and create its empty cache. False if already there.
    pub fn register(&mut self, user: &str, package: &str) -> bool {
        if self.is_registered(user, package) {
            return false;
        }
        self.packages.push(PackageRegistration::new(user, package));
        self.reviews.ensure(user, package);
        true
    }

    /// A registered package name, or an alias of one.
    pub fn resolve_package(&self, user: &str, name_or_alias: &str) -> Option<String> {
        if self.is_registered(user, name_or_alias) {
            return Some(name_or_alias.to_string());
        }
        self.aliases.get(user)?.get(name_or_alias).cloned()
    }

    pub fn aliases_for(&self, user: &str, package: &str) -> Vec<String> {
        self.aliases
            .get(user)
            .map(|m| {
                m.iter()
                    .filter(|(_, p)| p.as_str() == package)
                    .map(|(a, _)| a.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Merge one fetch and feed the result to the alert registry, in one step
    /// under the caller's lock.
    pub fn apply_fetch(&mut self, reg: &PackageRegistration, fetched: Vec<Review>) -> MergeDelta {
        let delta = self.reviews.merge(&reg.user, &reg.package, fetched);
        self.alerts
            .on_merge_result(&reg.user, &reg.package, &delta.updated, &delta.new);
        delta
    }
}

/// One gate per persisted part. A saver snapshots only after passing the
/// gate and holds it until the store returns, so saves land in snapshot order.
#[derive(Debug, Default)]
struct SaveGates {
    packages: AsyncMutex<()>,
    aliases: AsyncMutex<()>,
    reviews: AsyncMutex<()>,
    alerts: AsyncMutex<()>,
}

/// Handles shared by the loops, the command layer and the HTTP surface.
#[derive(Clone)]
pub struct AppState {
    pub core: SharedCore,
    pub source: Arc<dyn ReviewSource>,
    pub sender: Arc<dyn WebhookSender>,
    pub store: Arc<dyn Persistence>,
    pub config: Arc<Config>,
    saves: Arc<SaveGates>,
}

impl AppState {
    pub fn new(
        core: Core,
        source: Arc<dyn ReviewSource>,
        sender: Arc<dyn WebhookSender>,
        store: Arc<dyn Persistence>,
        config: Config,
    ) -> Self {
        Self {
            core: core.shared(),
            source,
            sender,
            store,
            config: Arc::new(config),
            saves: Arc::new(SaveGates::default()),
        }
    }

    pub async fn persist_packages(&self) {
        let _turn = self.saves.packages.lock().await;
        let packages = self.core.lock().packages.clone();
        log_save_result("packages", self.store.save_packages(&packages).await);
    }

    pub async fn persist_aliases(&self) {
        let _turn = self.saves.aliases.lock().await;
        let aliases = self.core.lock().aliases.clone();
        log_save_result("aliases", self.store.save_aliases(&aliases).await);
    }

    pub async fn persist_reviews(&self) {
        let _turn = self.saves.reviews.lock().await;
        let reviews = self.core.lock().reviews.clone();
        log_save_result("reviews", self.store.save_reviews(&reviews).await);
    }

    /// Counters, buffers and `last_fired` of every alert.
    pub async fn persist_alerts(&self) {
        let _turn = self.saves.alerts.lock().await;
        let alerts = self.core.lock().alerts.clone();
        log_save_result("alerts", self.store.save_alerts(&alerts).await);
    }

    /// Wire the real collaborators described by `config` and load state.
    pub async fn from_config(config: Config) -> Result<Self> {
        let source: Arc<dyn ReviewSource> = if config.source.mock {
            tracing::warn!("using mock review source");
            Arc::new(MockSource)
        } else {
            let token = config.source.resolve_access_token()?;
            Arc::new(
                GooglePlaySource::new(&config.source.base_url, token)
                    .with_timeout(config.source.timeout_secs),
            )
        };
        let sender: Arc<dyn WebhookSender> =
            Arc::new(HttpWebhookSender::new().with_timeout(config.webhook_timeout_secs));
        let store: Arc<dyn Persistence> = match config.persistence {
            PersistenceKind::Json => Arc::new(JsonFileStore::new(&config.data_dir)),
            PersistenceKind::Memory => Arc::new(MemoryStore::new()),
        };
        let core = Core::load(store.as_ref()).await;
        Ok(Self::new(core, source, sender, store, config))
    }
}
