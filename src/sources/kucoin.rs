//! Kucoin REST client for historical kline data
//!
//! docs: https://docs.kucoin.com

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::SourceError;
use crate::sources::{http_client, next_minute_delay, retry_after_hint, MarketDataSource};
use crate::types::{Candle, Granularity, TradingPair};

const KUCOIN_REST_URL: &str = "https://api.kucoin.com";

/// Kucoin business code for invalid request parameters, which is what an
/// unknown symbol comes back as.
const CODE_BAD_PARAMS: &str = "400100";
const CODE_OK: &str = "200000";

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: String,
    #[serde(default)]
    data: Option<T>,
    #[serde(default)]
    msg: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KucoinSymbol {
    symbol: String,
    base_currency: String,
    quote_currency: String,
}

#[derive(Debug, Clone)]
pub struct KucoinSource {
    client: reqwest::Client,
    base_url: String,
}

impl KucoinSource {
    pub fn new() -> Self {
        Self {
            client: http_client(),
            base_url: KUCOIN_REST_URL.to_string(),
        }
    }

    fn interval(granularity: Granularity) -> &'static str {
        match granularity {
            Granularity::M1 => "1min",
            Granularity::M3 => "3min",
            Granularity::M5 => "5min",
            Granularity::M15 => "15min",
            Granularity::M30 => "30min",
            Granularity::H1 => "1hour",
            Granularity::H2 => "2hour",
            Granularity::H4 => "4hour",
            Granularity::H6 => "6hour",
            Granularity::H8 => "8hour",
            Granularity::H12 => "12hour",
            Granularity::D1 => "1day",
            Granularity::D3 => "3day",
            Granularity::W1 => "1week",
        }
    }
}

impl Default for KucoinSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarketDataSource for KucoinSource {
    fn name(&self) -> &'static str {
        "kucoin"
    }

    async fn supported_pairs(&self) -> Result<Vec<TradingPair>, SourceError> {
        let url = format!("{}/api/v1/symbols", self.base_url);
        let response = self.client.get(&url).send().await?;
        if response.status().as_u16() == 429 {
            return Err(SourceError::RateLimited {
                retry_after: retry_after_hint(&response).unwrap_or_else(next_minute_delay),
            });
        }
        let envelope: Envelope<Vec<KucoinSymbol>> = response.json().await?;
        let symbols = envelope.data.unwrap_or_default();
        debug!(count = symbols.len(), "Kucoin symbol list fetched");
        Ok(symbols
            .into_iter()
            .map(|s| TradingPair::new(&s.symbol, &s.base_currency, &s.quote_currency, "kucoin"))
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
        let url = format!(
            "{}/api/v1/market/candles?type={}&symbol={}&startAt={}&endAt={}",
            self.base_url,
            Self::interval(granularity),
            symbol,
            start_time,
            end_time
        );

        let response = self.client.get(&url).send().await?;
        if response.status().as_u16() == 429 {
            return Err(SourceError::RateLimited {
                retry_after: retry_after_hint(&response).unwrap_or_else(next_minute_delay),
            });
        }

        // Rows: [time, open, close, high, low, volume, turnover], quoted as
        // strings, newest first.
        let envelope: Envelope<Vec<Vec<serde_json::Value>>> = response.json().await?;
        if envelope.code == CODE_BAD_PARAMS {
            return Err(SourceError::PairNotSupported {
                asset: asset.to_string(),
                ref_asset: ref_asset.to_string(),
            });
        }
        if envelope.code != CODE_OK {
            return Err(SourceError::Payload {
                origin: "kucoin".to_string(),
                detail: format!("API error {}: {}", envelope.code, envelope.msg),
            });
        }

        let mut candles: Vec<Candle> = envelope
            .data
            .unwrap_or_default()
            .into_iter()
            .filter_map(|row| {
                if row.len() < 5 {
                    return None;
                }
                let open_time: i64 = row[0].as_str()?.parse().ok()?;
                let open: f64 = row[1].as_str()?.parse().ok()?;
                let close: f64 = row[2].as_str()?.parse().ok()?;
                let high: f64 = row[3].as_str()?.parse().ok()?;
                let low: f64 = row[4].as_str()?.parse().ok()?;
                Some(Candle {
                    open_time,
                    open,
                    high,
                    low,
                    close,
                    asset: asset.to_string(),
                    ref_asset: ref_asset.to_string(),
                    granularity,
                    source: "kucoin".to_string(),
                })
            })
            .collect();
        candles.sort_by_key(|c| c.open_time);

        debug!(
            symbol = %symbol,
            granularity = %granularity,
            count = candles.len(),
            "Kucoin candles fetched"
        );
        Ok(candles)
    }
}
