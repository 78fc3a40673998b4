// src/config.rs
use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path, path::PathBuf};

use crate::reviews::source::DEFAULT_PLAY_BASE_URL;

pub const ENV_CONFIG_PATH: &str = "REVIEW_ALERTS_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/review-alerts.toml";
pub const ENV_ACCESS_TOKEN: &str = "PLAY_ACCESS_TOKEN";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PersistenceKind {
    #[default]
    Json,
    /// Keep everything in memory; nothing survives a restart.
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Serve generated reviews instead of calling the store.
    pub mock: bool,
    pub base_url: String,
    /// "ENV" means: read from PLAY_ACCESS_TOKEN
    pub access_token: String,
    pub timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            mock: false,
            base_url: DEFAULT_PLAY_BASE_URL.to_string(),
            access_token: "ENV".to_string(),
            timeout_secs: 10,
        }
    }
}

impl SourceConfig {
    pub fn resolve_access_token(&self) -> Result<String> {
        let token = if self.access_token.trim().eq_ignore_ascii_case("env") {
            env::var(ENV_ACCESS_TOKEN).map_err(|_| anyhow!("Missing {ENV_ACCESS_TOKEN} env var"))?
        } else {
            self.access_token.clone()
        };
        if token.trim().is_empty() {
            bail!("empty review source access token");
        }
        Ok(token)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Seconds between two poll cycles.
    pub poll_interval_secs: u64,
    /// Seconds between two dispatch cycles (per alert kind).
    pub alert_interval_secs: u64,
    /// Upper bound of reviews rendered into one digest.
    pub max_reviews_shown: usize,
    pub listen: String,
    pub data_dir: PathBuf,
    pub persistence: PersistenceKind,
    pub webhook_timeout_secs: u64,
    pub source: SourceConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
            alert_interval_secs: 60,
            max_reviews_shown: 10,
            listen: "0.0.0.0:8080".to_string(),
            data_dir: PathBuf::from("data"),
            persistence: PersistenceKind::Json,
            webhook_timeout_secs: 10,
            source: SourceConfig::default(),
        }
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        toml::from_str(&data).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Resolution order:
    /// 1) $REVIEW_ALERTS_CONFIG (must exist)
    /// 2) config/review-alerts.toml
    /// 3) built-in defaults
    ///
    /// then env overrides, then validation.
    pub fn load_default() -> Result<Self> {
        let mut cfg = if let Ok(p) = env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                bail!("{ENV_CONFIG_PATH} points to non-existent path");
            }
            Self::load_from_file(&pb)?
        } else if Path::new(DEFAULT_CONFIG_PATH).exists() {
            Self::load_from_file(DEFAULT_CONFIG_PATH)?
        } else {
            Self::default()
        };
        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = env_parse("POLL_INTERVAL_SECS") {
            self.poll_interval_secs = v;
        }
        if let Some(v) = env_parse("ALERT_INTERVAL_SECS") {
            self.alert_interval_secs = v;
        }
        if let Some(v) = env_parse("MAX_REVIEWS_SHOWN") {
            self.max_reviews_shown = v;
        }
        if let Ok(v) = env::var("REVIEW_ALERTS_LISTEN") {
            self.listen = v;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_secs == 0 {
            bail!("poll_interval_secs must be > 0");
        }
        if self.alert_interval_secs == 0 {
            bail!("alert_interval_secs must be > 0");
        }
        if self.max_reviews_shown == 0 {
            bail!("max_reviews_shown must be > 0");
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            poll_interval_secs = 120
            [source]
            mock = true
            "#,
        )
        .unwrap();
        assert_eq!(cfg.poll_interval_secs, 120);
        assert_eq!(cfg.alert_interval_secs, 60);
        assert_eq!(cfg.max_reviews_shown, 10);
        assert!(cfg.source.mock);
        assert_eq!(cfg.source.base_url, DEFAULT_PLAY_BASE_URL);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn zero_values_are_rejected() {
        for patch in [
            "poll_interval_secs = 0",
            "alert_interval_secs = 0",
            "max_reviews_shown = 0",
        ] {
            let cfg: Config = toml::from_str(patch).unwrap();
            assert!(cfg.validate().is_err(), "{patch} should be rejected");
        }
    }

    #[test]
    fn persistence_kind_parses_lowercase() {
        let cfg: Config = toml::from_str(r#"persistence = "memory""#).unwrap();
        assert_eq!(cfg.persistence, PersistenceKind::Memory);
    }

    #[serial_test::serial]
    #[test]
    fn env_overrides_and_token_resolution() {
        env::set_var("POLL_INTERVAL_SECS", "5");
        env::set_var("MAX_REVIEWS_SHOWN", "not-a-number");
        let mut cfg = Config::default();
        cfg.apply_env_overrides();
        assert_eq!(cfg.poll_interval_secs, 5);
        assert_eq!(cfg.max_reviews_shown, 10);
        env::remove_var("POLL_INTERVAL_SECS");
        env::remove_var("MAX_REVIEWS_SHOWN");

        env::set_var(ENV_ACCESS_TOKEN, "tok-123");
        assert_eq!(cfg.source.resolve_access_token().unwrap(), "tok-123");
        env::remove_var(ENV_ACCESS_TOKEN);
        assert!(cfg.source.resolve_access_token().is_err());

        cfg.source.access_token = "inline".into();
        assert_eq!(cfg.source.resolve_access_token().unwrap(), "inline");
    }

    #[serial_test::serial]
    #[test]
    fn load_default_prefers_env_path() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("custom.toml");
        fs::write(&p, "alert_interval_secs = 15\n").unwrap();
        env::set_var(ENV_CONFIG_PATH, p.display().to_string());
        let cfg = Config::load_default().unwrap();
        assert_eq!(cfg.alert_interval_secs, 15);

        env::set_var(ENV_CONFIG_PATH, tmp.path().join("missing.toml").display().to_string());
        assert!(Config::load_default().is_err());
        env::remove_var(ENV_CONFIG_PATH);
    }
}
