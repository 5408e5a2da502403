//! Multi-source resolution: dispatcher, path prices and mean prices
//!
//! Fans requests out across every registered source and, when no source
//! lists a pair directly, chains prices of intermediate pairs into a
//! composed estimate.

use anyhow::Context;
use std::collections::HashSet;
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::error::Result;
use crate::resolver::{KlineResolver, PairGraph};
use crate::sources::{BinanceSource, CoinbaseSource, KucoinSource, MarketDataSource};
use crate::types::{ConversionPath, MetaPrice, Price, TradingPair};

/// Fallback allowlist of high-liquidity bridge assets
pub const DEFAULT_PREFERRED_ASSETS: &[&str] = &["BTC", "ETH", "USDT"];

/// Default bound on conversion path length, in trading pairs
pub const DEFAULT_MAX_HOPS: usize = 3;

pub struct MetaResolver {
    resolvers: Vec<KlineResolver>,
}

impl MetaResolver {
    /// Wrap already-built resolvers; their order fixes dispatch priority.
    pub fn new(resolvers: Vec<KlineResolver>) -> Self {
        Self { resolvers }
    }

    /// Build resolvers for every source enabled in the configuration.
    pub async fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let granularity = config.granularity().context("invalid granularity label")?;
        let data_dir = config.data_dir();
        let window = config.resolver.closest_window;

        let mut sources: Vec<Box<dyn MarketDataSource>> = Vec::new();
        if config.sources.binance_enabled {
            sources.push(Box::new(BinanceSource::new()));
        }
        if config.sources.kucoin_enabled {
            sources.push(Box::new(KucoinSource::new()));
        }
        if config.sources.coinbase_enabled {
            sources.push(Box::new(CoinbaseSource::new()));
        }
        anyhow::ensure!(!sources.is_empty(), "no market data source enabled");

        let mut resolvers = Vec::new();
        for source in sources {
            let name = source.name();
            resolvers.push(
                KlineResolver::open(source, &data_dir, granularity, window)
                    .await
                    .with_context(|| format!("failed to initialize source {}", name))?,
            );
        }
        Ok(Self::new(resolvers))
    }

    /// Union of every source's supported pairs
    pub fn supported_pairs(&self) -> Vec<TradingPair> {
        self.resolvers
            .iter()
            .flat_map(|r| r.supported_pairs().iter().cloned())
            .collect()
    }

    fn resolver(&self, source: &str) -> Option<&KlineResolver> {
        self.resolvers.iter().find(|r| r.name() == source)
    }

    /// Direct price lookup: first source to answer wins, in registration
    /// order.
    pub async fn closest_price(
        &self,
        asset: &str,
        ref_asset: &str,
        timestamp: i64,
    ) -> Result<Option<Price>> {
        for resolver in &self.resolvers {
            if let Some(price) = resolver.closest_price(asset, ref_asset, timestamp).await? {
                return Ok(Some(price));
            }
        }
        Ok(None)
    }

    /// Price via the first conversion path whose legs all resolve.
    ///
    /// `preferred_assets` (plus the endpoints) restricts the assets a path
    /// may traverse; `None` uses [`DEFAULT_PREFERRED_ASSETS`].
    pub async fn path_price(
        &self,
        asset: &str,
        ref_asset: &str,
        timestamp: i64,
        preferred_assets: Option<&[String]>,
        max_hops: usize,
    ) -> Result<Option<MetaPrice>> {
        let graph = self.build_graph(asset, ref_asset, preferred_assets);
        for path in graph.paths(asset, ref_asset, max_hops, None) {
            if let Some(meta) = self.price_for_path(&path, timestamp).await? {
                info!(asset, ref_asset, path = %path, value = meta.value, "path price resolved");
                return Ok(Some(meta));
            }
        }
        Ok(None)
    }

    /// Arithmetic mean over every candidate path that resolves.
    ///
    /// `max_hop_spread` bounds how much longer than the first-found path a
    /// candidate may be; `None` considers every path up to `max_hops`.
    pub async fn mean_price(
        &self,
        asset: &str,
        ref_asset: &str,
        timestamp: i64,
        preferred_assets: Option<&[String]>,
        max_hops: usize,
        max_hop_spread: Option<u32>,
    ) -> Result<Option<MetaPrice>> {
        let graph = self.build_graph(asset, ref_asset, preferred_assets);
        let mut paths = Vec::new();
        for path in graph.paths(asset, ref_asset, max_hops, max_hop_spread) {
            if let Some(meta) = self.price_for_path(&path, timestamp).await? {
                paths.push(meta);
            }
        }
        info!(
            asset,
            ref_asset,
            contributing = paths.len(),
            "mean price aggregated"
        );
        Ok(MetaPrice::mean_of(paths))
    }

    /// Resolve every leg of one candidate path.
    ///
    /// A leg with no price discards the whole path (`Ok(None)`); real
    /// failures propagate.
    async fn price_for_path(
        &self,
        path: &ConversionPath,
        timestamp: i64,
    ) -> Result<Option<MetaPrice>> {
        let mut legs = Vec::with_capacity(path.pairs.len());
        for pair in &path.pairs {
            let Some(resolver) = self.resolver(&pair.source) else {
                debug!(pair = %pair, "no resolver registered for source");
                return Ok(None);
            };
            match resolver
                .closest_price(&pair.asset, &pair.ref_asset, timestamp)
                .await?
            {
                Some(price) => legs.push(price),
                None => {
                    debug!(path = %path, pair = %pair, "leg did not resolve, discarding path");
                    return Ok(None);
                }
            }
        }
        MetaPrice::from_path(path.assets.clone(), legs).map(Some)
    }

    fn build_graph(
        &self,
        asset: &str,
        ref_asset: &str,
        preferred_assets: Option<&[String]>,
    ) -> PairGraph {
        let mut subset: HashSet<String> = match preferred_assets {
            Some(assets) => assets.iter().cloned().collect(),
            None => DEFAULT_PREFERRED_ASSETS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        };
        subset.insert(asset.to_string());
        subset.insert(ref_asset.to_string());

        PairGraph::build(
            self.resolvers.iter().flat_map(|r| r.supported_pairs()),
            &subset,
        )
    }
}
