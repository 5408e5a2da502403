//! Error taxonomy for price resolution.
//!
//! "No price found" is never an error: every lookup that can legitimately
//! come back empty returns `Ok(None)`.

use thiserror::Error;

/// Errors surfaced by a market data source.
#[derive(Error, Debug)]
pub enum SourceError {
    /// The source does not list this trading pair. Callers treat this as an
    /// empty result, not a failure.
    #[error("trading pair {asset}/{ref_asset} not supported")]
    PairNotSupported { asset: String, ref_asset: String },

    /// The source asked us to back off; `retry_after` is its hint in seconds.
    #[error("rate limited, retry after {retry_after:.1}s")]
    RateLimited { retry_after: f64 },

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected payload from {origin}: {detail}")]
    Payload { origin: String, detail: String },
}

/// Errors surfaced by the candle store and closest-result cache.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Duplicate open time inserted without ignore-on-conflict.
    #[error("candle with open time {open_time} already stored in {partition}")]
    Conflict { partition: String, open_time: i64 },

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

/// Top-level error for resolution calls.
#[derive(Error, Debug)]
pub enum Error {
    /// Too many consecutive rate-limit hits inside one logical fetch.
    #[error("{origin} rate limited {hits} consecutive times, giving up")]
    RetryBudgetExhausted { origin: String, hits: u32 },

    /// A conversion path whose assets/pairs counts are inconsistent.
    #[error("invalid conversion path: {0}")]
    InvalidPath(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Source(#[from] SourceError),
}

pub type Result<T> = std::result::Result<T, Error>;
