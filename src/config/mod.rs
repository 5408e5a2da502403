//! Configuration management for PricePath
//!
//! Loads from config files + environment variables via .env

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

use crate::storage::default_data_dir;
use crate::types::Granularity;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    pub sources: SourcesConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResolverConfig {
    /// Candle granularity label (m1, m15, h1, ...)
    pub granularity: String,
    /// Search radius around a requested timestamp in seconds
    pub closest_window: i64,
    /// Maximum number of trading pairs on a conversion path
    pub max_hops: usize,
    /// How much longer than the first-found path a candidate may be
    #[serde(default)]
    pub max_hop_spread: Option<u32>,
    /// Bridge assets conversion paths may traverse
    pub preferred_assets: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
    /// Directory holding one database file per source; platform data dir
    /// when unset
    #[serde(default)]
    pub data_dir: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourcesConfig {
    /// Enable the Binance source
    pub binance_enabled: bool,
    /// Enable the Kucoin source
    pub kucoin_enabled: bool,
    /// Enable the Coinbase source
    pub coinbase_enabled: bool,
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let config = Config::builder()
            // Resolver defaults
            .set_default("resolver.granularity", "m1")?
            .set_default("resolver.closest_window", 310)?
            .set_default("resolver.max_hops", 3)?
            .set_default("resolver.preferred_assets", vec!["BTC", "ETH", "USDT"])?
            // Source defaults
            .set_default("sources.binance_enabled", true)?
            .set_default("sources.kucoin_enabled", true)?
            .set_default("sources.coinbase_enabled", false)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (PRICEPATH_*)
            .add_source(Environment::with_prefix("PRICEPATH").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        Ok(app_config)
    }

    /// Parsed candle granularity
    pub fn granularity(&self) -> Option<Granularity> {
        Granularity::from_str(&self.resolver.granularity)
    }

    /// Source database directory, configured or platform default
    pub fn data_dir(&self) -> PathBuf {
        self.storage
            .data_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(default_data_dir)
    }

    /// Generate a digest of the config for logging
    pub fn digest(&self) -> String {
        format!(
            "granularity={} window={}s max_hops={} preferred={:?} sources=[{}{}{}]",
            self.resolver.granularity,
            self.resolver.closest_window,
            self.resolver.max_hops,
            self.resolver.preferred_assets,
            if self.sources.binance_enabled { "binance " } else { "" },
            if self.sources.kucoin_enabled { "kucoin " } else { "" },
            if self.sources.coinbase_enabled { "coinbase" } else { "" },
        )
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::load().unwrap();
        assert_eq!(config.granularity(), Some(Granularity::M1));
        assert_eq!(config.resolver.closest_window, 310);
        assert_eq!(config.resolver.max_hops, 3);
        assert_eq!(config.resolver.max_hop_spread, None);
        assert!(config.sources.binance_enabled);
        assert!(!config.sources.coinbase_enabled);
    }
}
