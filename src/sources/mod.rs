//! Market data source implementations (Binance, Kucoin, Coinbase)

mod binance;
mod coinbase;
mod kucoin;

pub use binance::BinanceSource;
pub use coinbase::CoinbaseSource;
pub use kucoin::KucoinSource;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::SourceError;
use crate::types::{Candle, Granularity, TradingPair};

/// Capability interface over one exchange's historical market data
///
/// The resolution core never branches on source identity; everything
/// exchange-specific lives behind this trait.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Get the source name
    fn name(&self) -> &'static str;

    /// List every trading pair the source offers.
    ///
    /// Called once when a resolver is built; the result is cached for the
    /// resolver's lifetime.
    async fn supported_pairs(&self) -> Result<Vec<TradingPair>, SourceError>;

    /// Fetch candles with an open time in `[start_time, end_time)` seconds,
    /// ordered by open time ascending.
    async fn fetch_candles(
        &self,
        asset: &str,
        ref_asset: &str,
        granularity: Granularity,
        start_time: i64,
        end_time: i64,
    ) -> Result<Vec<Candle>, SourceError>;
}

pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .user_agent(concat!("pricepath/", env!("CARGO_PKG_VERSION")))
        .build()
        .expect("Failed to create HTTP client")
}

/// Seconds until shortly after the next minute boundary.
///
/// Binance and Kucoin account their rate limits per minute, so the window
/// resets there.
pub(crate) fn next_minute_delay() -> f64 {
    let now = chrono::Utc::now().timestamp_millis() as f64 / 1000.0;
    1.0 + 60.0 - now % 60.0
}

/// `Retry-After` hint from a 429 response, if the server sent one.
pub(crate) fn retry_after_hint(response: &reqwest::Response) -> Option<f64> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<f64>().ok())
}
