//! Binance REST client for historical kline data
//!
//! Uses the public spot API; no authentication is required for klines or
//! exchange metadata.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::SourceError;
use crate::sources::{http_client, next_minute_delay, retry_after_hint, MarketDataSource};
use crate::types::{Candle, Granularity, TradingPair};

const BINANCE_REST_URL: &str = "https://api.binance.com";
const BATCH_SIZE: usize = 1000;

/// Binance error code for an unknown trading pair
const CODE_INVALID_SYMBOL: i64 = -1121;
/// Binance error code for too many requests
const CODE_RATE_LIMIT: i64 = -1003;

#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolInfo {
    symbol: String,
    base_asset: String,
    quote_asset: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: i64,
    #[serde(default)]
    msg: String,
}

#[derive(Debug, Clone)]
pub struct BinanceSource {
    client: reqwest::Client,
    base_url: String,
}

impl BinanceSource {
    pub fn new() -> Self {
        Self {
            client: http_client(),
            base_url: BINANCE_REST_URL.to_string(),
        }
    }

    fn interval(granularity: Granularity) -> &'static str {
        match granularity {
            Granularity::M1 => "1m",
            Granularity::M3 => "3m",
            Granularity::M5 => "5m",
            Granularity::M15 => "15m",
            Granularity::M30 => "30m",
            Granularity::H1 => "1h",
            Granularity::H2 => "2h",
            Granularity::H4 => "4h",
            Granularity::H6 => "6h",
            Granularity::H8 => "8h",
            Granularity::H12 => "12h",
            Granularity::D1 => "1d",
            Granularity::D3 => "3d",
            Granularity::W1 => "1w",
        }
    }

    async fn classify_failure(
        &self,
        response: reqwest::Response,
        asset: &str,
        ref_asset: &str,
    ) -> SourceError {
        let status = response.status();
        let retry_hint = retry_after_hint(&response);
        let body = response.text().await.unwrap_or_default();
        if let Ok(api_error) = serde_json::from_str::<ApiError>(&body) {
            if api_error.code == CODE_INVALID_SYMBOL {
                return SourceError::PairNotSupported {
                    asset: asset.to_string(),
                    ref_asset: ref_asset.to_string(),
                };
            }
            if api_error.code == CODE_RATE_LIMIT {
                return SourceError::RateLimited {
                    retry_after: retry_hint.unwrap_or_else(next_minute_delay),
                };
            }
            return SourceError::Payload {
                origin: "binance".to_string(),
                detail: format!("API error {}: {}", api_error.code, api_error.msg),
            };
        }
        // 429 = request weight exceeded, 418 = IP ban escalation
        if status.as_u16() == 429 || status.as_u16() == 418 {
            return SourceError::RateLimited {
                retry_after: retry_hint.unwrap_or_else(next_minute_delay),
            };
        }
        SourceError::Payload {
            origin: "binance".to_string(),
            detail: format!("HTTP {}: {}", status, body),
        }
    }
}

impl Default for BinanceSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarketDataSource for BinanceSource {
    fn name(&self) -> &'static str {
        "binance"
    }

    async fn supported_pairs(&self) -> Result<Vec<TradingPair>, SourceError> {
        let url = format!("{}/api/v3/exchangeInfo", self.base_url);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(self.classify_failure(response, "", "").await);
        }
        let info: ExchangeInfo = response.json().await?;
        debug!(count = info.symbols.len(), "Binance exchange info fetched");
        Ok(info
            .symbols
            .into_iter()
            .map(|s| TradingPair::new(&s.symbol, &s.base_asset, &s.quote_asset, "binance"))
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
        let symbol = format!("{}{}", asset, ref_asset);
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&startTime={}&endTime={}&limit={}",
            self.base_url,
            symbol,
            Self::interval(granularity),
            start_time * 1000,
            end_time * 1000,
            BATCH_SIZE
        );

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(self.classify_failure(response, asset, ref_asset).await);
        }

        // Rows: [open_time_ms, open, high, low, close, volume, close_time_ms, ...]
        // with prices quoted as strings.
        let rows: Vec<Vec<serde_json::Value>> = response.json().await?;
        let candles: Vec<Candle> = rows
            .into_iter()
            .filter_map(|row| {
                if row.len() < 5 {
                    return None;
                }
                let open_time = row[0].as_i64()? / 1000;
                let open: f64 = row[1].as_str()?.parse().ok()?;
                let high: f64 = row[2].as_str()?.parse().ok()?;
                let low: f64 = row[3].as_str()?.parse().ok()?;
                let close: f64 = row[4].as_str()?.parse().ok()?;
                Some(Candle {
                    open_time,
                    open,
                    high,
                    low,
                    close,
                    asset: asset.to_string(),
                    ref_asset: ref_asset.to_string(),
                    granularity,
                    source: "binance".to_string(),
                })
            })
            .collect();

        debug!(
            symbol = %symbol,
            granularity = %granularity,
            count = candles.len(),
            "Binance klines fetched"
        );
        Ok(candles)
    }
}
