//! Core types used throughout PricePath
//!
//! Defines common data structures for candles, trading pairs, prices and
//! composed conversion-path prices.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::{Error, Result};

/// Supported candle granularities
///
/// The `Display`/`from_str` labels (`m1`, `h4`, ...) double as the partition
/// suffix in the candle store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Granularity {
    M1,
    M3,
    M5,
    M15,
    M30,
    H1,
    H2,
    H4,
    H6,
    H8,
    H12,
    D1,
    D3,
    W1,
}

impl Default for Granularity {
    fn default() -> Self {
        Granularity::M1
    }
}

impl Granularity {
    /// Get duration in seconds
    pub fn duration_secs(&self) -> i64 {
        match self {
            Granularity::M1 => 60,
            Granularity::M3 => 3 * 60,
            Granularity::M5 => 5 * 60,
            Granularity::M15 => 15 * 60,
            Granularity::M30 => 30 * 60,
            Granularity::H1 => 60 * 60,
            Granularity::H2 => 2 * 60 * 60,
            Granularity::H4 => 4 * 60 * 60,
            Granularity::H6 => 6 * 60 * 60,
            Granularity::H8 => 8 * 60 * 60,
            Granularity::H12 => 12 * 60 * 60,
            Granularity::D1 => 24 * 60 * 60,
            Granularity::D3 => 3 * 24 * 60 * 60,
            Granularity::W1 => 7 * 24 * 60 * 60,
        }
    }

    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "m1" | "1m" => Some(Granularity::M1),
            "m3" | "3m" => Some(Granularity::M3),
            "m5" | "5m" => Some(Granularity::M5),
            "m15" | "15m" => Some(Granularity::M15),
            "m30" | "30m" => Some(Granularity::M30),
            "h1" | "1h" => Some(Granularity::H1),
            "h2" | "2h" => Some(Granularity::H2),
            "h4" | "4h" => Some(Granularity::H4),
            "h6" | "6h" => Some(Granularity::H6),
            "h8" | "8h" => Some(Granularity::H8),
            "h12" | "12h" => Some(Granularity::H12),
            "d1" | "1d" => Some(Granularity::D1),
            "d3" | "3d" => Some(Granularity::D3),
            "w1" | "1w" => Some(Granularity::W1),
            _ => None,
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Granularity::M1 => "m1",
            Granularity::M3 => "m3",
            Granularity::M5 => "m5",
            Granularity::M15 => "m15",
            Granularity::M30 => "m30",
            Granularity::H1 => "h1",
            Granularity::H2 => "h2",
            Granularity::H4 => "h4",
            Granularity::H6 => "h6",
            Granularity::H8 => "h8",
            Granularity::H12 => "h12",
            Granularity::D1 => "d1",
            Granularity::D3 => "d3",
            Granularity::W1 => "w1",
        };
        write!(f, "{}", label)
    }
}

/// A directly tradable asset/ref-asset relationship offered by one source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradingPair {
    /// Source-native pair name (e.g. "BTCUSDT", "BTC-USDT")
    pub symbol: String,
    /// Base asset (e.g. "BTC")
    pub asset: String,
    /// Quote asset (e.g. "USDT")
    pub ref_asset: String,
    /// Source offering the pair
    pub source: String,
}

impl TradingPair {
    pub fn new(symbol: &str, asset: &str, ref_asset: &str, source: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            asset: asset.to_string(),
            ref_asset: ref_asset.to_string(),
            source: source.to_string(),
        }
    }

    /// Whether the pair links `a`/`b` in either direction
    pub fn links(&self, a: &str, b: &str) -> bool {
        (self.asset == a && self.ref_asset == b) || (self.asset == b && self.ref_asset == a)
    }
}

impl fmt::Display for TradingPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.asset, self.ref_asset, self.source)
    }
}

/// Candlestick data (aka kline)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    /// Open time (start of period, seconds)
    pub open_time: i64,
    /// Open price
    pub open: f64,
    /// High price
    pub high: f64,
    /// Low price
    pub low: f64,
    /// Close price
    pub close: f64,
    /// Base asset
    pub asset: String,
    /// Quote asset
    pub ref_asset: String,
    /// Granularity
    pub granularity: Granularity,
    /// Source of this candle
    pub source: String,
}

/// A single quoted price for asset/ref-asset at an exact timestamp
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Price {
    pub value: f64,
    pub asset: String,
    pub ref_asset: String,
    /// Timestamp the value refers to (seconds)
    pub timestamp: i64,
    pub source: String,
}

/// An ordered chain of trading pairs connecting an origin asset to a target
///
/// Invariant: `assets.len() == pairs.len() + 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionPath {
    /// Assets seen along the path, in order
    pub assets: Vec<String>,
    /// Pairs connecting consecutive assets
    pub pairs: Vec<TradingPair>,
}

impl ConversionPath {
    /// Number of edges (trading pairs) on the path
    pub fn hops(&self) -> usize {
        self.pairs.len()
    }

    pub(crate) fn check(assets: &[String], legs: usize) -> Result<()> {
        if assets.len() < 2 {
            return Err(Error::InvalidPath(format!(
                "at least two assets are required, {} were received",
                assets.len()
            )));
        }
        if assets.len() != legs + 1 {
            return Err(Error::InvalidPath(format!(
                "{} assets and {} legs are not coherent",
                assets.len(),
                legs
            )));
        }
        Ok(())
    }
}

impl fmt::Display for ConversionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.assets.join(" -> "))
    }
}

/// One component of a composed price
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PricePart {
    /// A leg resolved directly from one source
    Leg(Price),
    /// A whole path, when averaging several of them
    Path(MetaPrice),
}

/// The price implied by walking a conversion path, or the mean of several
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaPrice {
    pub value: f64,
    pub asset: String,
    pub ref_asset: String,
    /// Every source that contributed a leg
    pub sources: BTreeSet<String>,
    /// Leg prices in traversal order, or the averaged paths
    pub parts: Vec<PricePart>,
}

impl MetaPrice {
    /// Compose the price of a path from its per-leg prices.
    ///
    /// Walking leg `i` from `assets[i]` to `assets[i + 1]`: when the leg is
    /// quoted with `assets[i + 1]` as its base asset the traversal runs
    /// ref-asset -> asset and the running product is divided by the leg
    /// value; otherwise it is multiplied.
    pub fn from_path(assets: Vec<String>, legs: Vec<Price>) -> Result<Self> {
        ConversionPath::check(&assets, legs.len())?;
        let mut cumulated = 1.0;
        let mut sources = BTreeSet::new();
        for (i, price) in legs.iter().enumerate() {
            let next_asset = &assets[i + 1];
            if price.asset == *next_asset {
                cumulated /= price.value;
            } else {
                cumulated *= price.value;
            }
            sources.insert(price.source.clone());
        }
        Ok(Self {
            value: cumulated,
            asset: assets[0].clone(),
            ref_asset: assets[assets.len() - 1].clone(),
            sources,
            parts: legs.into_iter().map(PricePart::Leg).collect(),
        })
    }

    /// Arithmetic mean of several path prices for the same asset pair.
    ///
    /// Returns `None` on an empty input. Sources are unioned and the
    /// contributing paths kept for provenance.
    pub fn mean_of(paths: Vec<MetaPrice>) -> Option<Self> {
        if paths.is_empty() {
            return None;
        }
        let value = paths.iter().map(|p| p.value).sum::<f64>() / paths.len() as f64;
        let sources: BTreeSet<String> = paths
            .iter()
            .flat_map(|p| p.sources.iter().cloned())
            .collect();
        Some(Self {
            value,
            asset: paths[0].asset.clone(),
            ref_asset: paths[0].ref_asset.clone(),
            sources,
            parts: paths.into_iter().map(PricePart::Path).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leg(value: f64, asset: &str, ref_asset: &str, source: &str) -> Price {
        Price {
            value,
            asset: asset.to_string(),
            ref_asset: ref_asset.to_string(),
            timestamp: 1_650_000_000,
            source: source.to_string(),
        }
    }

    fn owned(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_path_composition_eth_btc_usdt() {
        // ETH -> BTC -> USDT: both legs traverse asset -> ref-asset
        let legs = vec![
            leg(0.05, "ETH", "BTC", "binance"),
            leg(30000.0, "BTC", "USDT", "binance"),
        ];
        let meta = MetaPrice::from_path(owned(&["ETH", "BTC", "USDT"]), legs).unwrap();
        assert!((meta.value - 1500.0).abs() < 1e-9);
        assert_eq!(meta.asset, "ETH");
        assert_eq!(meta.ref_asset, "USDT");
        assert_eq!(meta.sources.len(), 1);
    }

    #[test]
    fn test_reversed_leg_divides() {
        // USDT -> BTC traverses ref-asset -> asset of BTCUSDT
        let legs = vec![leg(30000.0, "BTC", "USDT", "binance")];
        let meta = MetaPrice::from_path(owned(&["USDT", "BTC"]), legs).unwrap();
        assert!((meta.value - 1.0 / 30000.0).abs() < 1e-12);
    }

    #[test]
    fn test_path_price_is_invertible() {
        let forward = MetaPrice::from_path(
            owned(&["ETH", "BTC", "USDT"]),
            vec![
                leg(0.05, "ETH", "BTC", "binance"),
                leg(30000.0, "BTC", "USDT", "kucoin"),
            ],
        )
        .unwrap();
        let backward = MetaPrice::from_path(
            owned(&["USDT", "BTC", "ETH"]),
            vec![
                leg(30000.0, "BTC", "USDT", "kucoin"),
                leg(0.05, "ETH", "BTC", "binance"),
            ],
        )
        .unwrap();
        assert!((forward.value - 1.0 / backward.value).abs() < 1e-9);
        assert_eq!(forward.sources, backward.sources);
    }

    #[test]
    fn test_incoherent_path_is_rejected() {
        let err = MetaPrice::from_path(owned(&["ETH"]), vec![]).unwrap_err();
        assert!(matches!(err, Error::InvalidPath(_)));

        let err = MetaPrice::from_path(
            owned(&["ETH", "BTC", "USDT"]),
            vec![leg(0.05, "ETH", "BTC", "binance")],
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidPath(_)));
    }

    #[test]
    fn test_mean_of_paths() {
        let a = MetaPrice::from_path(
            owned(&["ETH", "USDT"]),
            vec![leg(1490.0, "ETH", "USDT", "binance")],
        )
        .unwrap();
        let b = MetaPrice::from_path(
            owned(&["ETH", "BTC", "USDT"]),
            vec![
                leg(0.05, "ETH", "BTC", "kucoin"),
                leg(30200.0, "BTC", "USDT", "kucoin"),
            ],
        )
        .unwrap();

        let mean = MetaPrice::mean_of(vec![a.clone(), b.clone()]).unwrap();
        assert!((mean.value - (a.value + b.value) / 2.0).abs() < 1e-9);
        assert_eq!(mean.sources.len(), 2);
        assert_eq!(mean.parts.len(), 2);

        // Order of discovery must not matter
        let swapped = MetaPrice::mean_of(vec![b, a]).unwrap();
        assert!((mean.value - swapped.value).abs() < 1e-12);

        assert!(MetaPrice::mean_of(vec![]).is_none());
    }

    #[test]
    fn test_granularity_labels_round_trip() {
        for g in [
            Granularity::M1,
            Granularity::M15,
            Granularity::H1,
            Granularity::D1,
            Granularity::W1,
        ] {
            assert_eq!(Granularity::from_str(&g.to_string()), Some(g));
        }
        assert_eq!(Granularity::from_str("1h"), Some(Granularity::H1));
        assert_eq!(Granularity::from_str("fortnight"), None);
        assert_eq!(Granularity::M1.duration_secs(), 60);
        assert_eq!(Granularity::W1.duration_secs(), 604_800);
    }
}
