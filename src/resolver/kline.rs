//! Single-source price resolver
//!
//! Answers "closest price to timestamp T" for one market data source,
//! backed by that source's candle store and closest-result cache. The store
//! and cache are owned exclusively; nothing else writes to them.

use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{Error, Result, SourceError};
use crate::sources::MarketDataSource;
use crate::storage::{CandleStore, ClosestResultCache, Database, OnConflict, NO_CANDLE};
use crate::types::{Candle, Granularity, Price, TradingPair};

/// Consecutive rate-limit hits tolerated inside one logical fetch
pub const MAX_API_RETRY: u32 = 3;

/// Default search radius around a requested timestamp, in seconds
pub const DEFAULT_CLOSEST_WINDOW: i64 = 310;

pub struct KlineResolver {
    source: Box<dyn MarketDataSource>,
    store: CandleStore,
    cache: ClosestResultCache,
    granularity: Granularity,
    window: i64,
    supported: Vec<TradingPair>,
}

impl KlineResolver {
    /// Build a resolver on an already-open database.
    ///
    /// Fetches the source's supported pairs once; they are treated as
    /// read-only for the resolver's lifetime.
    pub async fn new(
        source: Box<dyn MarketDataSource>,
        db: Database,
        granularity: Granularity,
        window: i64,
    ) -> Result<Self> {
        let supported = source.supported_pairs().await.map_err(Error::Source)?;
        info!(
            source = source.name(),
            pairs = supported.len(),
            granularity = %granularity,
            window,
            "resolver initialized"
        );
        let store = CandleStore::new(db.clone(), source.name());
        let cache = ClosestResultCache::new(db);
        Ok(Self {
            source,
            store,
            cache,
            granularity,
            window,
            supported,
        })
    }

    /// Build a resolver with its database at `<data_dir>/<source>.db`.
    pub async fn open(
        source: Box<dyn MarketDataSource>,
        data_dir: &Path,
        granularity: Granularity,
        window: i64,
    ) -> Result<Self> {
        let db = Database::open(data_dir.join(format!("{}.db", source.name())))
            .map_err(Error::Store)?;
        Self::new(source, db, granularity, window).await
    }

    pub fn name(&self) -> &'static str {
        self.source.name()
    }

    pub fn supported_pairs(&self) -> &[TradingPair] {
        &self.supported
    }

    /// Whether the source lists the pair in this exact orientation
    pub fn supports(&self, asset: &str, ref_asset: &str) -> bool {
        self.supported
            .iter()
            .any(|p| p.asset == asset && p.ref_asset == ref_asset)
    }

    /// Closest price in time for asset/ref-asset around `timestamp` seconds.
    ///
    /// Consults the cache, then the local store, and only then the source
    /// online; an empty answer is `Ok(None)`.
    pub async fn closest_price(
        &self,
        asset: &str,
        ref_asset: &str,
        timestamp: i64,
    ) -> Result<Option<Price>> {
        if asset == ref_asset {
            return Ok(Some(Price {
                value: 1.0,
                asset: asset.to_string(),
                ref_asset: ref_asset.to_string(),
                timestamp,
                source: self.name().to_string(),
            }));
        }
        if !self.supports(asset, ref_asset) {
            return Ok(None);
        }

        // A previous computation with an equal-or-larger window already
        // answers this request.
        if let Some((closest, window)) = self
            .cache
            .lookup(asset, ref_asset, self.granularity, timestamp)
            .map_err(Error::Store)?
        {
            if window >= self.window {
                if closest == NO_CANDLE {
                    debug!(
                        source = self.name(),
                        asset, ref_asset, timestamp, "cached empty result reused"
                    );
                    return Ok(None);
                }
                match self
                    .store
                    .get(asset, ref_asset, self.granularity, closest)
                    .map_err(Error::Store)?
                {
                    Some(candle) => return Ok(Some(self.price_from(candle))),
                    None => warn!(
                        source = self.name(),
                        asset,
                        ref_asset,
                        open_time = closest,
                        "cache points at a candle the store no longer has, recomputing"
                    ),
                }
            }
        }

        // Local candle, if fresh enough to stand in for the instant: the gap
        // must stay under half a granularity.
        if let Some(candle) = self
            .store
            .nearest(asset, ref_asset, self.granularity, timestamp, self.window)
            .map_err(Error::Store)?
        {
            if (candle.open_time - timestamp).abs() < self.granularity.duration_secs() / 2 {
                self.cache
                    .record(
                        asset,
                        ref_asset,
                        self.granularity,
                        timestamp,
                        candle.open_time,
                        self.window,
                    )
                    .map_err(Error::Store)?;
                return Ok(Some(self.price_from(candle)));
            }
        }

        // Go online, then take whatever is closest in the window.
        let candles = self
            .fetch_online(
                asset,
                ref_asset,
                timestamp - self.window,
                timestamp + self.window,
            )
            .await?;
        self.store
            .insert(&candles, OnConflict::Ignore)
            .map_err(Error::Store)?;

        let outcome = self
            .store
            .nearest(asset, ref_asset, self.granularity, timestamp, self.window)
            .map_err(Error::Store)?;
        match outcome {
            Some(candle) => {
                self.cache
                    .record(
                        asset,
                        ref_asset,
                        self.granularity,
                        timestamp,
                        candle.open_time,
                        self.window,
                    )
                    .map_err(Error::Store)?;
                Ok(Some(self.price_from(candle)))
            }
            None => {
                self.cache
                    .record(
                        asset,
                        ref_asset,
                        self.granularity,
                        timestamp,
                        NO_CANDLE,
                        self.window,
                    )
                    .map_err(Error::Store)?;
                info!(
                    source = self.name(),
                    asset,
                    ref_asset,
                    granularity = %self.granularity,
                    timestamp,
                    window = self.window,
                    "no candle found"
                );
                Ok(None)
            }
        }
    }

    /// Fetch candles online, suspending on rate-limit hints.
    ///
    /// An unsupported pair is an empty result. The fetch fails once
    /// [`MAX_API_RETRY`] consecutive rate-limit hits are exceeded.
    async fn fetch_online(
        &self,
        asset: &str,
        ref_asset: &str,
        start_time: i64,
        end_time: i64,
    ) -> Result<Vec<Candle>> {
        let mut hits = 0u32;
        loop {
            match self
                .source
                .fetch_candles(asset, ref_asset, self.granularity, start_time, end_time)
                .await
            {
                Ok(candles) => return Ok(candles),
                Err(SourceError::PairNotSupported { .. }) => {
                    debug!(
                        source = self.name(),
                        asset, ref_asset, "pair not supported online"
                    );
                    return Ok(Vec::new());
                }
                Err(SourceError::RateLimited { retry_after }) => {
                    hits += 1;
                    if hits > MAX_API_RETRY {
                        return Err(Error::RetryBudgetExhausted {
                            origin: self.name().to_string(),
                            hits,
                        });
                    }
                    warn!(
                        source = self.name(),
                        retry_after,
                        hits,
                        "rate limited, backing off"
                    );
                    tokio::time::sleep(Duration::from_secs_f64(retry_after.max(0.0))).await;
                }
                Err(e) => return Err(Error::Source(e)),
            }
        }
    }

    fn price_from(&self, candle: Candle) -> Price {
        Price {
            value: candle.open,
            asset: candle.asset,
            ref_asset: candle.ref_asset,
            timestamp: candle.open_time,
            source: candle.source,
        }
    }
}
