//! Coinbase Exchange REST client for historical candle data
//!
//! The candles endpoint caps a response at 300 rows, so wide windows are
//! paginated forward batch by batch.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::error::SourceError;
use crate::sources::{http_client, next_minute_delay, retry_after_hint, MarketDataSource};
use crate::types::{Candle, Granularity, TradingPair};

const COINBASE_REST_URL: &str = "https://api.exchange.coinbase.com";
const BATCH_SIZE: i64 = 300;

#[derive(Debug, Deserialize)]
struct Product {
    id: String,
    base_currency: String,
    quote_currency: String,
}

#[derive(Debug, Clone)]
pub struct CoinbaseSource {
    client: reqwest::Client,
    base_url: String,
}

impl CoinbaseSource {
    pub fn new() -> Self {
        Self {
            client: http_client(),
            base_url: COINBASE_REST_URL.to_string(),
        }
    }

    fn iso(timestamp: i64) -> String {
        Utc.timestamp_opt(timestamp, 0)
            .single()
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_default()
    }

    /// One page of candles for `[start, batch_end]`; rows come newest first.
    async fn fetch_batch(
        &self,
        symbol: &str,
        asset: &str,
        ref_asset: &str,
        granularity: Granularity,
        start: i64,
        batch_end: i64,
    ) -> Result<Vec<Candle>, SourceError> {
        let url = format!(
            "{}/products/{}/candles?start={}&end={}&granularity={}",
            self.base_url,
            symbol,
            Self::iso(start),
            Self::iso(batch_end),
            granularity.duration_secs()
        );
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if status.as_u16() == 404 {
            return Err(SourceError::PairNotSupported {
                asset: asset.to_string(),
                ref_asset: ref_asset.to_string(),
            });
        }
        if status.as_u16() == 429 {
            return Err(SourceError::RateLimited {
                retry_after: retry_after_hint(&response).unwrap_or_else(next_minute_delay),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Payload {
                origin: "coinbase".to_string(),
                detail: format!("HTTP {}: {}", status, body),
            });
        }

        // Rows: [time, low, high, open, close, volume], numeric, newest first
        let rows: Vec<Vec<serde_json::Value>> = response.json().await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| {
                if row.len() < 5 {
                    return None;
                }
                let open_time = row[0].as_i64()?;
                let low = row[1].as_f64()?;
                let high = row[2].as_f64()?;
                let open = row[3].as_f64()?;
                let close = row[4].as_f64()?;
                Some(Candle {
                    open_time,
                    open,
                    high,
                    low,
                    close,
                    asset: asset.to_string(),
                    ref_asset: ref_asset.to_string(),
                    granularity,
                    source: "coinbase".to_string(),
                })
            })
            .collect())
    }
}

impl Default for CoinbaseSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarketDataSource for CoinbaseSource {
    fn name(&self) -> &'static str {
        "coinbase"
    }

    async fn supported_pairs(&self) -> Result<Vec<TradingPair>, SourceError> {
        let url = format!("{}/products", self.base_url);
        let response = self.client.get(&url).send().await?;
        if response.status().as_u16() == 429 {
            return Err(SourceError::RateLimited {
                retry_after: retry_after_hint(&response).unwrap_or_else(next_minute_delay),
            });
        }
        let products: Vec<Product> = response.json().await?;
        debug!(count = products.len(), "Coinbase product list fetched");
        Ok(products
            .into_iter()
            .map(|p| TradingPair::new(&p.id, &p.base_currency, &p.quote_currency, "coinbase"))
            .collect())
    }

    async fn fetch_candles(
        &self,
        asset: &str,
        ref_asset: &str,
        granularity: Granularity,
        start_time: i64,
        end_time: i64,
    ) -> Result<Vec<Candle>, SourceError> {
        let symbol = format!("{}-{}", asset, ref_asset);
        let step = granularity.duration_secs();

        let mut candles = Vec::new();
        let mut start = start_time;
        while start < end_time {
            let batch_end = start + step * BATCH_SIZE;
            let batch = self
                .fetch_batch(&symbol, asset, ref_asset, granularity, start, batch_end)
                .await?;
            if let Some(newest) = batch.first() {
                start = newest.open_time + step;
            } else {
                start = batch_end;
            }
            candles.extend(batch);
        }
        candles.sort_by_key(|c| c.open_time);

        debug!(
            symbol = %symbol,
            granularity = %granularity,
            count = candles.len(),
            "Coinbase candles fetched"
        );
        Ok(candles)
    }
}
