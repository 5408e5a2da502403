//! Candle store: per-partition insert, range query and nearest lookup

use rusqlite::{params, ErrorCode};
use tracing::debug;

use crate::error::StoreError;
use crate::storage::{partition_name, quote_ident, Database};
use crate::types::{Candle, Granularity};

/// Behavior on duplicate open time within a partition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnConflict {
    /// Surface `StoreError::Conflict` and roll the batch back
    Fail,
    /// Skip pre-existing rows, keep the rest of the batch
    Ignore,
}

/// Persistent store of candles for one source
pub struct CandleStore {
    db: Database,
    source: String,
}

impl CandleStore {
    pub fn new(db: Database, source: &str) -> Self {
        Self {
            db,
            source: source.to_string(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Insert a batch of candles, atomically per call.
    ///
    /// With `OnConflict::Ignore`, rows whose open time is already stored are
    /// skipped without aborting the rest of the batch.
    pub fn insert(&self, candles: &[Candle], on_conflict: OnConflict) -> Result<(), StoreError> {
        if candles.is_empty() {
            return Ok(());
        }
        let mut conn = self.db.lock();
        let tx = conn.transaction().map_err(StoreError::Sqlite)?;
        for candle in candles {
            let partition = partition_name(&candle.asset, &candle.ref_asset, candle.granularity);
            let table = quote_ident(&partition);
            tx.execute(
                &format!(
                    "CREATE TABLE IF NOT EXISTS {} (
                        open_timestamp INTEGER PRIMARY KEY,
                        open REAL NOT NULL,
                        high REAL NOT NULL,
                        low REAL NOT NULL,
                        close REAL NOT NULL
                    )",
                    table
                ),
                [],
            )?;
            let verb = match on_conflict {
                OnConflict::Fail => "INSERT",
                OnConflict::Ignore => "INSERT OR IGNORE",
            };
            let inserted = tx
                .execute(
                    &format!(
                        "{} INTO {} (open_timestamp, open, high, low, close)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        verb, table
                    ),
                    params![
                        candle.open_time,
                        candle.open,
                        candle.high,
                        candle.low,
                        candle.close
                    ],
                )
                .map_err(|e| match e {
                    rusqlite::Error::SqliteFailure(err, _)
                        if err.code == ErrorCode::ConstraintViolation =>
                    {
                        StoreError::Conflict {
                            partition: partition.clone(),
                            open_time: candle.open_time,
                        }
                    }
                    other => StoreError::Sqlite(other),
                })?;
            if inserted == 0 {
                debug!(partition = %partition, open_time = candle.open_time, "duplicate candle skipped");
            }
        }
        tx.commit().map_err(StoreError::Sqlite)
    }

    /// Candles of a partition in open-time order, `start_time` inclusive,
    /// `end_time` exclusive.
    pub fn query(
        &self,
        asset: &str,
        ref_asset: &str,
        granularity: Granularity,
        start_time: Option<i64>,
        end_time: Option<i64>,
    ) -> Result<Vec<Candle>, StoreError> {
        let partition = partition_name(asset, ref_asset, granularity);
        if !self.db.table_exists(&partition)? {
            return Ok(Vec::new());
        }
        let mut sql = format!(
            "SELECT open_timestamp, open, high, low, close FROM {}",
            quote_ident(&partition)
        );
        let mut conditions = Vec::new();
        let mut args = Vec::new();
        if let Some(start) = start_time {
            conditions.push(format!("open_timestamp >= ?{}", args.len() + 1));
            args.push(start);
        }
        if let Some(end) = end_time {
            conditions.push(format!("open_timestamp < ?{}", args.len() + 1));
            args.push(end);
        }
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY open_timestamp ASC");

        let conn = self.db.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(args), |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, f64>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, f64>(4)?,
            ))
        })?;
        let mut candles = Vec::new();
        for row in rows {
            let (open_time, open, high, low, close) = row?;
            candles.push(self.make_candle(asset, ref_asset, granularity, open_time, open, high, low, close));
        }
        Ok(candles)
    }

    /// Fetch one candle by its exact open time
    pub fn get(
        &self,
        asset: &str,
        ref_asset: &str,
        granularity: Granularity,
        open_time: i64,
    ) -> Result<Option<Candle>, StoreError> {
        Ok(self
            .query(asset, ref_asset, granularity, Some(open_time), Some(open_time + 1))?
            .pop())
    }

    /// The candle within `[timestamp - window, timestamp + window)` whose open
    /// time is closest to `timestamp`; ties go to the lowest open time.
    pub fn nearest(
        &self,
        asset: &str,
        ref_asset: &str,
        granularity: Granularity,
        timestamp: i64,
        window: i64,
    ) -> Result<Option<Candle>, StoreError> {
        let partition = partition_name(asset, ref_asset, granularity);
        if !self.db.table_exists(&partition)? {
            return Ok(None);
        }
        let sql = format!(
            "SELECT open_timestamp, open, high, low, close FROM {}
             WHERE open_timestamp >= ?1 AND open_timestamp < ?2
             ORDER BY ABS(open_timestamp - ?3) ASC, open_timestamp ASC
             LIMIT 1",
            quote_ident(&partition)
        );
        let conn = self.db.lock();
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params![timestamp - window, timestamp + window, timestamp])?;
        match rows.next()? {
            Some(row) => {
                let open_time: i64 = row.get(0)?;
                let open: f64 = row.get(1)?;
                let high: f64 = row.get(2)?;
                let low: f64 = row.get(3)?;
                let close: f64 = row.get(4)?;
                Ok(Some(self.make_candle(
                    asset, ref_asset, granularity, open_time, open, high, low, close,
                )))
            }
            None => Ok(None),
        }
    }

    /// Drop one partition; idempotent.
    pub fn drop_partition(
        &self,
        asset: &str,
        ref_asset: &str,
        granularity: Granularity,
    ) -> Result<(), StoreError> {
        let partition = partition_name(asset, ref_asset, granularity);
        let conn = self.db.lock();
        conn.execute(
            &format!("DROP TABLE IF EXISTS {}", quote_ident(&partition)),
            [],
        )?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn make_candle(
        &self,
        asset: &str,
        ref_asset: &str,
        granularity: Granularity,
        open_time: i64,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    ) -> Candle {
        Candle {
            open_time,
            open,
            high,
            low,
            close,
            asset: asset.to_string(),
            ref_asset: ref_asset.to_string(),
            granularity,
            source: self.source.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> CandleStore {
        CandleStore::new(Database::in_memory().unwrap(), "binance")
    }

    fn candle(open_time: i64, open: f64) -> Candle {
        Candle {
            open_time,
            open,
            high: open + 1.0,
            low: open - 1.0,
            close: open,
            asset: "BTC".to_string(),
            ref_asset: "USDT".to_string(),
            granularity: Granularity::M1,
            source: "binance".to_string(),
        }
    }

    #[test]
    fn test_insert_query_round_trip() {
        let store = store();
        store
            .insert(
                &[candle(180, 3.0), candle(60, 1.0), candle(120, 2.0)],
                OnConflict::Fail,
            )
            .unwrap();

        let all = store
            .query("BTC", "USDT", Granularity::M1, None, None)
            .unwrap();
        let times: Vec<i64> = all.iter().map(|c| c.open_time).collect();
        assert_eq!(times, vec![60, 120, 180]);
        assert_eq!(all[0].source, "binance");
    }

    #[test]
    fn test_query_start_inclusive_end_exclusive() {
        let store = store();
        store
            .insert(
                &[candle(60, 1.0), candle(120, 2.0), candle(180, 3.0)],
                OnConflict::Fail,
            )
            .unwrap();

        let range = store
            .query("BTC", "USDT", Granularity::M1, Some(60), Some(180))
            .unwrap();
        let times: Vec<i64> = range.iter().map(|c| c.open_time).collect();
        assert_eq!(times, vec![60, 120]);
    }

    #[test]
    fn test_query_unknown_partition_is_empty() {
        let store = store();
        assert!(store
            .query("DOGE", "BTC", Granularity::H1, None, None)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_conflict_fails_and_aborts_batch() {
        let store = store();
        store.insert(&[candle(60, 1.0)], OnConflict::Fail).unwrap();

        let err = store
            .insert(&[candle(120, 2.0), candle(60, 9.0)], OnConflict::Fail)
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Conflict { open_time: 60, .. }
        ));

        // The whole batch rolled back, 120 was not kept
        let all = store
            .query("BTC", "USDT", Granularity::M1, None, None)
            .unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].open_time, 60);
    }

    #[test]
    fn test_conflict_ignored_keeps_rest_of_batch() {
        let store = store();
        store.insert(&[candle(60, 1.0)], OnConflict::Fail).unwrap();
        store
            .insert(&[candle(60, 9.0), candle(120, 2.0)], OnConflict::Ignore)
            .unwrap();

        let all = store
            .query("BTC", "USDT", Granularity::M1, None, None)
            .unwrap();
        assert_eq!(all.len(), 2);
        // First writer wins on the duplicate
        assert_eq!(all[0].open, 1.0);
    }

    #[test]
    fn test_nearest_respects_window_bounds() {
        let store = store();
        store
            .insert(&[candle(100, 1.0), candle(200, 2.0)], OnConflict::Fail)
            .unwrap();

        // [110, 210) only contains 200
        let hit = store
            .nearest("BTC", "USDT", Granularity::M1, 160, 50)
            .unwrap();
        assert_eq!(hit.unwrap().open_time, 200);

        // Upper bound is exclusive: [160, 200) misses 200
        let miss = store
            .nearest("BTC", "USDT", Granularity::M1, 180, 20)
            .unwrap();
        assert!(miss.is_none());

        // Lower bound is inclusive: [100, 140) hits 100
        let hit = store
            .nearest("BTC", "USDT", Granularity::M1, 120, 20)
            .unwrap();
        assert_eq!(hit.unwrap().open_time, 100);
    }

    #[test]
    fn test_nearest_picks_minimum_gap_lowest_tie() {
        let store = store();
        store
            .insert(
                &[candle(90, 1.0), candle(110, 2.0), candle(130, 3.0)],
                OnConflict::Fail,
            )
            .unwrap();

        // 110 is closest to 105
        let hit = store
            .nearest("BTC", "USDT", Granularity::M1, 105, 60)
            .unwrap();
        assert_eq!(hit.unwrap().open_time, 110);

        // 90 and 110 tie at distance 10: lowest open time wins
        let hit = store
            .nearest("BTC", "USDT", Granularity::M1, 100, 60)
            .unwrap();
        assert_eq!(hit.unwrap().open_time, 90);
    }

    #[test]
    fn test_drop_partition_is_idempotent() {
        let store = store();
        store.insert(&[candle(60, 1.0)], OnConflict::Fail).unwrap();
        store.drop_partition("BTC", "USDT", Granularity::M1).unwrap();
        assert!(store
            .query("BTC", "USDT", Granularity::M1, None, None)
            .unwrap()
            .is_empty());
        // Second drop is a no-op
        store.drop_partition("BTC", "USDT", Granularity::M1).unwrap();
    }

    #[test]
    fn test_partitions_do_not_collide() {
        let store = store();
        let mut eth = candle(60, 5.0);
        eth.asset = "ETH".to_string();
        store
            .insert(&[candle(60, 1.0), eth], OnConflict::Fail)
            .unwrap();

        let btc = store
            .query("BTC", "USDT", Granularity::M1, None, None)
            .unwrap();
        assert_eq!(btc.len(), 1);
        assert_eq!(btc[0].open, 1.0);

        let eth = store
            .query("ETH", "USDT", Granularity::M1, None, None)
            .unwrap();
        assert_eq!(eth.len(), 1);
        assert_eq!(eth[0].open, 5.0);
    }
}
