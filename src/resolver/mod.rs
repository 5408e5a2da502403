//! Resolver module - historical price resolution
//!
//! Turns candle stores, result caches and market data sources into a
//! "closest price to timestamp T" answer, per source and across sources,
//! including multi-hop conversion paths when no source lists a pair
//! directly.

mod graph;
mod kline;
mod meta;

pub use graph::{PairGraph, PathSearch};
pub use kline::{KlineResolver, DEFAULT_CLOSEST_WINDOW, MAX_API_RETRY};
pub use meta::{MetaResolver, DEFAULT_MAX_HOPS, DEFAULT_PREFERRED_ASSETS};
