//! PricePath query CLI
//!
//! Resolves the historical price of an asset against a reference asset at a
//! point in time, chaining intermediate pairs when needed.

use anyhow::{bail, Context, Result};
use tracing_subscriber::EnvFilter;

use pricepath::config::AppConfig;
use pricepath::resolver::MetaResolver;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (asset, ref_asset) = match args.as_slice() {
        [asset, ref_asset, ..] => (asset.to_uppercase(), ref_asset.to_uppercase()),
        _ => bail!("usage: pricepath <ASSET> <REF_ASSET> [TIMESTAMP]"),
    };
    let timestamp = match args.get(2) {
        Some(raw) => raw
            .parse::<i64>()
            .with_context(|| format!("invalid timestamp: {}", raw))?,
        None => chrono::Utc::now().timestamp(),
    };

    let config = AppConfig::load()?;
    tracing::info!(config = %config.digest(), "starting");

    let resolver = MetaResolver::from_config(&config).await?;

    if let Some(price) = resolver.closest_price(&asset, &ref_asset, timestamp).await? {
        println!(
            "{}/{} @ {} = {} (source: {}, candle open time {})",
            asset, ref_asset, timestamp, price.value, price.source, price.timestamp
        );
        return Ok(());
    }

    tracing::info!(
        asset = %asset,
        ref_asset = %ref_asset,
        "no direct price, trying conversion paths"
    );
    let mean = resolver
        .mean_price(
            &asset,
            &ref_asset,
            timestamp,
            Some(&config.resolver.preferred_assets),
            config.resolver.max_hops,
            config.resolver.max_hop_spread,
        )
        .await?;

    match mean {
        Some(meta) => {
            let sources: Vec<&str> = meta.sources.iter().map(String::as_str).collect();
            println!(
                "{}/{} @ {} = {} (mean of {} path(s), sources: {})",
                asset,
                ref_asset,
                timestamp,
                meta.value,
                meta.parts.len(),
                sources.join(", ")
            );
            Ok(())
        }
        None => bail!("no price found for {}/{} at {}", asset, ref_asset, timestamp),
    }
}
