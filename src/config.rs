//! Registry configuration and config file lookup
//!
//! Every field has a default, so an empty `{}` file (or no file at all)
//! yields the stock setup. Capacities are per kind; the store itself has
//! no opinion about them.

use anyhow::{Context, Result, bail};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::workers::Workers;

/// Env var naming a config file
pub const CONFIG_ENV: &str = "PICKER_CONFIG";
/// File name looked up in the platform config dir
pub const CONFIG_FILE: &str = "picker.json";

/// Cache settings for one resource kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KindConfig {
    /// Max entries kept; 0 is rejected by `RegistryConfig::validate`
    pub capacity: usize,
    /// Fetch again on every request even when a Ready entry exists
    pub always_refetch: bool,
}

impl KindConfig {
    pub const fn new(capacity: usize, always_refetch: bool) -> Self {
        Self {
            capacity,
            always_refetch,
        }
    }
}

impl Default for KindConfig {
    fn default() -> Self {
        Self::new(20, false)
    }
}

/// All per-kind settings plus the fetch pool size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Fetch worker threads
    pub workers: usize,
    pub pages: KindConfig,
    /// Decoded animations are large; keep one
    pub ugoira: KindConfig,
    pub illust: KindConfig,
    pub user: KindConfig,
    /// Form state must reflect the server on every open
    pub bookmark_form: KindConfig,
    pub user_tags: KindConfig,
    pub images: KindConfig,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            pages: KindConfig::new(20, false),
            ugoira: KindConfig::new(1, false),
            illust: KindConfig::new(20, false),
            user: KindConfig::new(20, false),
            bookmark_form: KindConfig::new(1, true),
            user_tags: KindConfig::new(1, false),
            images: KindConfig::new(64, false),
        }
    }
}

/// 75% of CPU cores, at least one
pub fn default_workers() -> usize {
    Workers::default_threads()
}

impl RegistryConfig {
    /// Parse a JSON config. Missing fields take defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text).context("Invalid config JSON")?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("Failed to load config: {}", path.display()))
    }

    /// Resolve the config file (see `config_path`) and load it, or fall back
    /// to defaults when none exists.
    pub fn resolve(cli: Option<PathBuf>) -> Result<Self> {
        match config_path(cli) {
            Some(path) => {
                info!("Loading config: {}", path.display());
                Self::load(&path)
            }
            None => {
                debug!("No config file, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Reject settings that can never work.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            bail!("workers must be at least 1");
        }
        for (name, kind) in self.kinds() {
            if kind.capacity == 0 {
                bail!("{}.capacity must be at least 1", name);
            }
        }
        Ok(())
    }

    /// (kind name, settings) pairs
    pub fn kinds(&self) -> [(&'static str, KindConfig); 7] {
        [
            ("pages", self.pages),
            ("ugoira", self.ugoira),
            ("illust", self.illust),
            ("user", self.user),
            ("bookmark_form", self.bookmark_form),
            ("user_tags", self.user_tags),
            ("images", self.images),
        ]
    }
}

/// Find the config file to use.
///
/// Priority:
/// 1. CLI `--config` (must exist; errors surface on load)
/// 2. `PICKER_CONFIG` environment variable
/// 3. `picker.json` in the platform config dir, if present
/// 4. None (built-in defaults)
///
/// Platform paths:
/// - Linux: ~/.config/picker/picker.json
/// - macOS: ~/Library/Application Support/picker/picker.json
/// - Windows: %APPDATA%\picker\picker.json
pub fn config_path(cli: Option<PathBuf>) -> Option<PathBuf> {
    lookup(cli, std::env::var(CONFIG_ENV).ok().map(PathBuf::from), platform_config_file())
}

fn platform_config_file() -> Option<PathBuf> {
    dirs_next::config_dir().map(|dir| dir.join("picker").join(CONFIG_FILE))
}

fn lookup(cli: Option<PathBuf>, env: Option<PathBuf>, platform: Option<PathBuf>) -> Option<PathBuf> {
    cli.or(env).or_else(|| platform.filter(|p| p.exists()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_per_kind() {
        let config = RegistryConfig::default();
        assert_eq!(config.ugoira, KindConfig::new(1, false));
        assert_eq!(config.bookmark_form, KindConfig::new(1, true));
        assert_eq!(config.images.capacity, 64);
        assert!(config.workers >= 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let config = RegistryConfig::from_json(r#"{ "workers": 2, "pages": { "capacity": 5 } }"#).unwrap();
        assert_eq!(config.workers, 2);
        assert_eq!(config.pages, KindConfig::new(5, false));
        assert_eq!(config.bookmark_form, KindConfig::new(1, true));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let err = RegistryConfig::from_json(r#"{ "user": { "capacity": 0 } }"#).unwrap_err();
        assert!(err.to_string().contains("user.capacity"));
        assert!(RegistryConfig::from_json(r#"{ "workers": 0 }"#).is_err());
        assert!(RegistryConfig::from_json("not json").is_err());
    }

    #[test]
    fn test_lookup_priority() {
        let cli = Some(PathBuf::from("/cli.json"));
        let env = Some(PathBuf::from("/env.json"));
        let missing = Some(PathBuf::from("/definitely/not/here/picker.json"));

        assert_eq!(lookup(cli.clone(), env.clone(), missing.clone()), cli);
        assert_eq!(lookup(None, env.clone(), missing.clone()), env);
        // Platform file only counts when it exists
        assert_eq!(lookup(None, None, missing), None);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, r#"{ "images": { "capacity": 8 } }"#).unwrap();

        assert_eq!(lookup(None, None, Some(path.clone())), Some(path.clone()));
        let config = RegistryConfig::load(&path).unwrap();
        assert_eq!(config.images.capacity, 8);

        let err = RegistryConfig::load(&dir.path().join("missing.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config"));
    }
}
