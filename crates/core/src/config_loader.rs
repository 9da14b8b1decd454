use crate::config::TradingConfig;
use crate::error::ConfigError;
use crate::traits::ConfigSource;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Static parameters (capital, risk limits).
pub const STATIC_CONFIG_FILE: &str = "Config.toml";
/// Live parameters the frontend edits while trading runs.
pub const LIVE_CONFIG_FILE: &str = "trading_config.json";
pub const ENV_PREFIX: &str = "SIGNAL_TRADER_";

/// The record shared with the frontend through the live JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveConfigFile {
    pub timeframe: String,
    pub strategy: String,
    pub symbol: String,
    pub check_interval: u64,
    pub enabled: bool,
    #[serde(default)]
    pub hedge_mode: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_quantity: Option<Decimal>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl From<&TradingConfig> for LiveConfigFile {
    fn from(config: &TradingConfig) -> Self {
        Self {
            timeframe: config.timeframe.clone(),
            strategy: config.strategy.clone(),
            symbol: config.symbol.clone(),
            check_interval: config.check_interval,
            enabled: config.enabled,
            hedge_mode: config.hedge_mode,
            fixed_quantity: config.fixed_quantity,
            last_updated: config.last_updated,
        }
    }
}

/// Field overrides applied to the live file, e.g. from command-line flags.
#[derive(Debug, Clone, Default)]
pub struct LiveConfigUpdate {
    pub timeframe: Option<String>,
    pub strategy: Option<String>,
    pub symbol: Option<String>,
    pub check_interval: Option<u64>,
    pub enabled: Option<bool>,
}

impl LiveConfigUpdate {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.timeframe.is_none()
            && self.strategy.is_none()
            && self.symbol.is_none()
            && self.check_interval.is_none()
            && self.enabled.is_none()
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads the trading configuration by layering defaults, the static TOML file,
    /// the live JSON file and `SIGNAL_TRADER_` environment variables.
    ///
    /// Missing files contribute nothing; nested keys use `__` in env names
    /// (`SIGNAL_TRADER_RISK__MAX_CONCURRENT_TRADES=3`).
    ///
    /// # Errors
    ///
    /// Returns an error if a file exists but cannot be parsed.
    pub fn load(config_dir: &Path) -> Result<TradingConfig> {
        let config: TradingConfig = Self::figment(config_dir)
            .extract()
            .with_context(|| format!("Failed to load config from {}", config_dir.display()))?;

        Ok(config)
    }

    fn figment(config_dir: &Path) -> Figment {
        Figment::from(Serialized::defaults(TradingConfig::default()))
            .merge(Toml::file(config_dir.join(STATIC_CONFIG_FILE)))
            .merge(Json::file(config_dir.join(LIVE_CONFIG_FILE)))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Writes a default live file if none exists. Returns `true` if one was created.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn ensure_live_file(config_dir: &Path) -> Result<bool> {
        let path = config_dir.join(LIVE_CONFIG_FILE);
        if path.exists() {
            return Ok(false);
        }

        std::fs::create_dir_all(config_dir)
            .with_context(|| format!("Failed to create {}", config_dir.display()))?;
        let record = LiveConfigFile::from(&TradingConfig::default());
        Self::write_live_file(&path, &record)?;
        tracing::info!("Created default {}", path.display());
        Ok(true)
    }

    /// Applies `update` to the live file and stamps `last_updated`.
    ///
    /// # Errors
    ///
    /// Returns an error if the current file cannot be read or the new one written.
    pub fn update_live_file(config_dir: &Path, update: &LiveConfigUpdate) -> Result<LiveConfigFile> {
        Self::ensure_live_file(config_dir)?;
        let path = config_dir.join(LIVE_CONFIG_FILE);

        let current = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let mut record: LiveConfigFile = serde_json::from_str(&current)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        if let Some(timeframe) = &update.timeframe {
            record.timeframe.clone_from(timeframe);
        }
        if let Some(strategy) = &update.strategy {
            record.strategy.clone_from(strategy);
        }
        if let Some(symbol) = &update.symbol {
            record.symbol.clone_from(symbol);
        }
        if let Some(interval) = update.check_interval {
            record.check_interval = interval;
        }
        if let Some(enabled) = update.enabled {
            record.enabled = enabled;
        }
        record.last_updated = Some(Utc::now());

        Self::write_live_file(&path, &record)?;
        tracing::info!(?update, "Updated {}", path.display());
        Ok(record)
    }

    /// Write to a sibling temp file and rename, so pollers never read half a file.
    fn write_live_file(path: &Path, record: &LiveConfigFile) -> Result<()> {
        let json = serde_json::to_string_pretty(record)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }
}

/// Config source backed by the files in a config directory.
#[derive(Debug, Clone)]
pub struct FileConfigSource {
    config_dir: PathBuf,
}

impl FileConfigSource {
    #[must_use]
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    #[must_use]
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }
}

impl ConfigSource for FileConfigSource {
    fn load(&self) -> Result<TradingConfig, ConfigError> {
        ConfigLoader::load(&self.config_dir).map_err(|e| ConfigError::Load(format!("{e:#}")))
    }

    fn watch_path(&self) -> Option<PathBuf> {
        Some(self.config_dir.join(LIVE_CONFIG_FILE))
    }
}
