//! SQLite-backed persistence: candle store + closest-result cache
//!
//! One database file per source. Candles are partitioned into one table per
//! (asset, ref-asset, granularity); the cache keeps a companion table per
//! partition. Table naming is an implementation detail of this module and
//! not part of any contract.

mod cache;
mod candles;

pub use cache::{ClosestResultCache, NO_CANDLE};
pub use candles::{CandleStore, OnConflict};

use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::StoreError;
use crate::types::Granularity;

/// Shared handle on one source's database
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) a database file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        if let Some(parent) = path.as_ref().parent() {
            // Connection::open does not create intermediate directories
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open a throwaway in-memory database
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub(crate) fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        // A poisoned lock means a writer panicked mid-statement; nothing to
        // salvage at this layer.
        self.conn.lock().expect("database mutex poisoned")
    }

    pub(crate) fn table_exists(&self, name: &str) -> Result<bool, StoreError> {
        let conn = self.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

/// Default on-disk location for source databases
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pricepath")
}

/// Candle partition table name for one (asset, ref-asset, granularity)
pub(crate) fn partition_name(asset: &str, ref_asset: &str, granularity: Granularity) -> String {
    format!("{}_{}_{}", asset, ref_asset, granularity)
}

/// Quote an identifier so exotic asset names cannot break out of it
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
