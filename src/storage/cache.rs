//! Closest-result cache: memoizes the outcome of closest-candle searches
//!
//! Once "no candle in this window" has been established for a timestamp, the
//! same or a narrower request must never trigger another network fetch.

use rusqlite::params;

use crate::error::StoreError;
use crate::storage::{partition_name, quote_ident, Database};
use crate::types::Granularity;

/// Sentinel open time meaning "computed, and no candle exists"
pub const NO_CANDLE: i64 = -1;

/// Memoization table per candle partition
pub struct ClosestResultCache {
    db: Database,
}

impl ClosestResultCache {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn table(asset: &str, ref_asset: &str, granularity: Granularity) -> String {
        format!("{}_cache", partition_name(asset, ref_asset, granularity))
    }

    /// Previously recorded outcome for a query timestamp.
    ///
    /// Returns `(closest_open_time, window)`; `closest_open_time` equal to
    /// [`NO_CANDLE`] means the search came back empty. `None` means never
    /// computed.
    pub fn lookup(
        &self,
        asset: &str,
        ref_asset: &str,
        granularity: Granularity,
        timestamp: i64,
    ) -> Result<Option<(i64, i64)>, StoreError> {
        let table = Self::table(asset, ref_asset, granularity);
        if !self.db.table_exists(&table)? {
            return Ok(None);
        }
        let conn = self.db.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT closest, window FROM {} WHERE timestamp = ?1",
            quote_ident(&table)
        ))?;
        let mut rows = stmt.query(params![timestamp])?;
        match rows.next()? {
            Some(row) => Ok(Some((row.get(0)?, row.get(1)?))),
            None => Ok(None),
        }
    }

    /// Upsert the outcome of a closest-candle search; last writer wins.
    pub fn record(
        &self,
        asset: &str,
        ref_asset: &str,
        granularity: Granularity,
        timestamp: i64,
        closest: i64,
        window: i64,
    ) -> Result<(), StoreError> {
        let table = quote_ident(&Self::table(asset, ref_asset, granularity));
        let conn = self.db.lock();
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    timestamp INTEGER PRIMARY KEY,
                    closest INTEGER NOT NULL,
                    window INTEGER NOT NULL
                )",
                table
            ),
            [],
        )?;
        conn.execute(
            &format!(
                "INSERT INTO {} (timestamp, closest, window) VALUES (?1, ?2, ?3)
                 ON CONFLICT(timestamp) DO UPDATE SET
                    closest = excluded.closest,
                    window = excluded.window",
                table
            ),
            params![timestamp, closest, window],
        )?;
        Ok(())
    }

    /// Clear every cache partition, leaving candle data untouched.
    pub fn drop_all(&self) -> Result<(), StoreError> {
        let conn = self.db.lock();
        let names: Vec<String> = {
            let mut stmt = conn.prepare(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name LIKE '%_cache'",
            )?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            rows.collect::<Result<_, _>>()?
        };
        for name in names {
            conn.execute(&format!("DROP TABLE IF EXISTS {}", quote_ident(&name)), [])?;
        }
        Ok(())
    }
}
