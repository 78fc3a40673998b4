// src/commands.rs
//! Registration commands: apps, aliases and alerts.
//!
//! Validation happens here, synchronously, before anything reaches the
//! registry. Every successful mutation is persisted after the lock is
//! released.

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;

use crate::alerts::{Alert, AlertVariant};
use crate::reviews::{PackageRegistration, Review};
use crate::state::AppState;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("package {0} already registered")]
    PackageExists(String),

    #[error("package {0} is not registered")]
    UnknownPackage(String),

    #[error("error registering the app {package}: {reason}")]
    SourceRejected { package: String, reason: String },

    #[error("alias {alias} already set for app {package}")]
    AliasExists { alias: String, package: String },

    #[error("there is already an alert named {0}")]
    AlertExists(String),

    #[error("there is no alert named {0}")]
    UnknownAlert(String),

    #[error("{0} is not a well formed frequency, use a positive number of seconds")]
    BadFrequency(i64),
}

fn non_empty(what: &'static str, value: &str) -> Result<(), CommandError> {
    if value.trim().is_empty() {
        return Err(CommandError::Empty(what));
    }
    Ok(())
}

/// Register `package` for `user` after one probe fetch against the source.
pub async fn add_app(state: &AppState, user: &str, package: &str) -> Result<(), CommandError> {
    non_empty("user", user)?;
    non_empty("package", package)?;
    if state.core.lock().is_registered(user, package) {
        return Err(CommandError::PackageExists(package.to_string()));
    }

    let reg = PackageRegistration::new(user, package);
    if let Err(e) = state.source.fetch(&reg).await {
        tracing::info!(error = ?e, user, package, "app registration rejected by source");
        return Err(CommandError::SourceRejected {
            package: package.to_string(),
            reason: format!("{e:#}"),
        });
    }

    // Another request may have won the race while we were fetching.
    if !state.core.lock().register(user, package) {
        return Err(CommandError::PackageExists(package.to_string()));
    }
    state.persist_packages().await;
    tracing::info!(user, package, "app registered");
    Ok(())
}

pub async fn add_alias(
    state: &AppState,
    user: &str,
    alias: &str,
    package: &str,
) -> Result<(), CommandError> {
    non_empty("alias", alias)?;
    {
        let mut core = state.core.lock();
        if !core.is_registered(user, package) {
            return Err(CommandError::UnknownPackage(package.to_string()));
        }
        if let Some(existing) = core.aliases.get(user).and_then(|m| m.get(alias)) {
            return Err(CommandError::AliasExists {
                alias: alias.to_string(),
                package: existing.clone(),
            });
        }
        core.aliases
            .entry(user.to_string())
            .or_default()
            .insert(alias.to_string(), package.to_string());
    }
    state.persist_aliases().await;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct NewAlert<'a> {
    pub name: &'a str,
    pub variant: AlertVariant,
    pub webhook: &'a str,
    /// Package name or alias.
    pub target: &'a str,
    pub frequency_secs: i64,
}

/// Returns the resolved package name.
pub async fn add_alert(
    state: &AppState,
    user: &str,
    req: NewAlert<'_>,
) -> Result<String, CommandError> {
    non_empty("alert name", req.name)?;
    non_empty("webhook", req.webhook)?;
    let frequency = u64::try_from(req.frequency_secs)
        .ok()
        .filter(|f| *f > 0)
        .ok_or(CommandError::BadFrequency(req.frequency_secs))?;

    let package = {
        let mut core = state.core.lock();
        if core.alerts.contains(user, req.name) {
            return Err(CommandError::AlertExists(req.name.to_string()));
        }
        let package = core
            .resolve_package(user, req.target)
            .ok_or_else(|| CommandError::UnknownPackage(req.target.to_string()))?;
        let alert = Alert::new(req.variant, req.webhook, &package, frequency, Utc::now());
        core.alerts.insert(user, req.name, alert);
        package
    };
    state.persist_alerts().await;
    tracing::info!(user, alert = req.name, kind = %req.variant, package = %package, "alert registered");
    Ok(package)
}

pub async fn remove_alert(state: &AppState, user: &str, name: &str) -> Result<(), CommandError> {
    if state.core.lock().alerts.remove(user, name).is_none() {
        return Err(CommandError::UnknownAlert(name.to_string()));
    }
    state.persist_alerts().await;
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppListing {
    pub package: String,
    pub aliases: Vec<String>,
}

pub fn list_apps(state: &AppState, user: &str) -> Vec<AppListing> {
    let core = state.core.lock();
    core.packages
        .iter()
        .filter(|p| p.user == user)
        .map(|p| AppListing {
            package: p.package.clone(),
            aliases: core.aliases_for(user, &p.package),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertListing {
    pub name: String,
    pub kind: AlertVariant,
    pub package: String,
    pub webhook: String,
    pub frequency_secs: u64,
    pub pending: usize,
}

pub fn list_alerts(state: &AppState, user: &str) -> Vec<AlertListing> {
    let core = state.core.lock();
    core.alerts
        .for_user(user)
        .map(|(name, a)| AlertListing {
            name: name.to_string(),
            kind: a.kind.variant(),
            package: a.package.clone(),
            webhook: a.webhook.clone(),
            frequency_secs: a.throttle.min_interval_secs(),
            pending: a.kind.pending(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageReviews {
    pub package: String,
    pub reviews: Vec<Review>,
}

/// The newest `max_reviews_shown` reviews of each of the user's packages.
pub fn latest_reviews(state: &AppState, user: &str) -> Vec<PackageReviews> {
    let limit = state.config.max_reviews_shown;
    let core = state.core.lock();
    let mut out: Vec<PackageReviews> = core
        .reviews
        .for_user(user)
        .map(|(package, list)| PackageReviews {
            package: package.to_string(),
            reviews: list.iter().take(limit).cloned().collect(),
        })
        .collect();
    out.sort_by(|a, b| a.package.cmp(&b.package));
    out
}
