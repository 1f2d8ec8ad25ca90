//! Redb-backed durable store.
//!
//! Uses Redb's ACID transactions with Copy-on-Write for crash safety.
//! Series, cache and identity secrets survive server restarts.

use std::{path::Path, sync::Arc};

use redb::{Database, ReadableTable, TableDefinition};
use serde_json::Value;
use tickwire_proto::payloads::SeriesPoint;

use super::{Store, StorageError, encode_series_key, validate_symbol};

/// Table: series
/// Key: symbol bytes ‖ ':' ‖ timestamp (u64 BE)
/// Value: CBOR-encoded `SeriesPoint`
const SERIES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("series");

/// Table: symbols
/// Key: symbol
/// Value: empty. Lets `symbols()` avoid scanning every point.
const SYMBOLS: TableDefinition<&str, ()> = TableDefinition::new("symbols");

/// Table: cache
/// Key: opaque cache key
/// Value: JSON text
const CACHE: TableDefinition<&str, &str> = TableDefinition::new("cache");

/// Table: identity
/// Key: secret name (`rpc-seed`, `dht-seed`, `server-public-key`)
/// Value: raw bytes
const IDENTITY: TableDefinition<&str, &[u8]> = TableDefinition::new("identity");

fn io(e: impl std::fmt::Display) -> StorageError {
    StorageError::Io(e.to_string())
}

/// Durable store backed by Redb.
///
/// Thread-safe through Redb's internal locking. Clone is cheap (Arc).
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Open or create a Redb database at the given path.
    ///
    /// Creates all tables if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the database cannot be opened or created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = Database::create(path.as_ref()).map_err(io)?;

        let txn = db.begin_write().map_err(io)?;
        {
            let _ = txn.open_table(SERIES).map_err(io)?;
            let _ = txn.open_table(SYMBOLS).map_err(io)?;
            let _ = txn.open_table(CACHE).map_err(io)?;
            let _ = txn.open_table(IDENTITY).map_err(io)?;
        }
        txn.commit().map_err(io)?;

        Ok(Self { db: Arc::new(db) })
    }
}

fn decode_point(bytes: &[u8]) -> Result<SeriesPoint, StorageError> {
    ciborium::from_reader(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}

impl Store for RedbStore {
    fn append(&self, point: &SeriesPoint) -> Result<(), StorageError> {
        validate_symbol(&point.symbol)?;

        let mut bytes = Vec::new();
        ciborium::into_writer(point, &mut bytes)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let key = encode_series_key(&point.symbol, point.observed_at);

        let txn = self.db.begin_write().map_err(io)?;
        {
            let mut series = txn.open_table(SERIES).map_err(io)?;

            if series.get(key.as_slice()).map_err(io)?.is_some() {
                return Err(StorageError::DuplicateKey {
                    symbol: point.symbol.clone(),
                    timestamp: point.observed_at,
                });
            }
            series.insert(key.as_slice(), bytes.as_slice()).map_err(io)?;

            let mut symbols = txn.open_table(SYMBOLS).map_err(io)?;
            symbols.insert(point.symbol.as_str(), ()).map_err(io)?;
        }
        txn.commit().map_err(io)?;

        Ok(())
    }

    fn latest(&self, symbol: &str) -> Result<SeriesPoint, StorageError> {
        validate_symbol(symbol)?;

        let txn = self.db.begin_read().map_err(io)?;
        let table = txn.open_table(SERIES).map_err(io)?;

        let start = encode_series_key(symbol, 0);
        let end = encode_series_key(symbol, u64::MAX);

        // Reverse scan bounded by the symbol prefix; the first hit is the newest.
        let mut range = table.range(start.as_slice()..=end.as_slice()).map_err(io)?;
        match range.next_back() {
            Some(entry) => {
                let (_, value) = entry.map_err(io)?;
                decode_point(value.value())
            },
            None => Err(StorageError::NotFound(symbol.to_string())),
        }
    }

    fn range(&self, symbol: &str, from: u64, to: u64) -> Result<Vec<SeriesPoint>, StorageError> {
        validate_symbol(symbol)?;
        if from >= to {
            return Ok(Vec::new());
        }

        let txn = self.db.begin_read().map_err(io)?;
        let table = txn.open_table(SERIES).map_err(io)?;

        let start = encode_series_key(symbol, from);
        let end = encode_series_key(symbol, to);

        let mut points = Vec::new();
        for entry in table.range(start.as_slice()..end.as_slice()).map_err(io)? {
            let (_, value) = entry.map_err(io)?;
            points.push(decode_point(value.value())?);
        }

        Ok(points)
    }

    fn symbols(&self) -> Result<Vec<String>, StorageError> {
        let txn = self.db.begin_read().map_err(io)?;
        let table = txn.open_table(SYMBOLS).map_err(io)?;

        let mut symbols = Vec::new();
        for entry in table.iter().map_err(io)? {
            let (key, _) = entry.map_err(io)?;
            symbols.push(key.value().to_string());
        }

        Ok(symbols)
    }

    fn cache_get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let txn = self.db.begin_read().map_err(io)?;
        let table = txn.open_table(CACHE).map_err(io)?;

        match table.get(key).map_err(io)? {
            Some(value) => serde_json::from_str(value.value())
                .map(Some)
                .map_err(|e| StorageError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    fn cache_put(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        let json =
            serde_json::to_string(value).map_err(|e| StorageError::Serialization(e.to_string()))?;

        let txn = self.db.begin_write().map_err(io)?;
        {
            let mut table = txn.open_table(CACHE).map_err(io)?;
            table.insert(key, json.as_str()).map_err(io)?;
        }
        txn.commit().map_err(io)?;

        Ok(())
    }

    fn load_secret(&self, name: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let txn = self.db.begin_read().map_err(io)?;
        let table = txn.open_table(IDENTITY).map_err(io)?;

        Ok(table.get(name).map_err(io)?.map(|value| value.value().to_vec()))
    }

    fn store_secret(&self, name: &str, value: &[u8]) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(io)?;
        {
            let mut table = txn.open_table(IDENTITY).map_err(io)?;
            table.insert(name, value).map_err(io)?;
        }
        txn.commit().map_err(io)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::tempdir;
    use tickwire_proto::payloads::Quote;

    use super::*;

    fn point(symbol: &str, at: u64) -> SeriesPoint {
        SeriesPoint {
            symbol: symbol.to_string(),
            observed_at: at,
            value: at as f64 / 2.0,
            sources: vec![Quote { venue: "v".into(), price: at as f64 / 2.0, target: "USD".into() }],
        }
    }

    #[test]
    fn append_latest_range() {
        let dir = tempdir().unwrap();
        let store = RedbStore::open(dir.path().join("test.redb")).unwrap();

        for at in [100, 300, 200] {
            store.append(&point("bitcoin", at)).unwrap();
        }
        store.append(&point("bitcoin2", 999)).unwrap();

        assert_eq!(store.latest("bitcoin").unwrap(), point("bitcoin", 300));
        let got: Vec<u64> =
            store.range("bitcoin", 100, 300).unwrap().iter().map(|p| p.observed_at).collect();
        assert_eq!(got, vec![100, 200]);
        assert_eq!(store.symbols().unwrap(), vec!["bitcoin", "bitcoin2"]);
    }

    #[test]
    fn duplicate_key_leaves_original() {
        let dir = tempdir().unwrap();
        let store = RedbStore::open(dir.path().join("test.redb")).unwrap();

        store.append(&point("eth", 5)).unwrap();
        let mut other = point("eth", 5);
        other.value = 42.0;

        assert_eq!(
            store.append(&other),
            Err(StorageError::DuplicateKey { symbol: "eth".into(), timestamp: 5 })
        );
        assert_eq!(store.latest("eth").unwrap().value, 2.5);
    }

    #[test]
    fn missing_symbol_is_not_found() {
        let dir = tempdir().unwrap();
        let store = RedbStore::open(dir.path().join("test.redb")).unwrap();
        assert_eq!(store.latest("eth"), Err(StorageError::NotFound("eth".into())));
        assert!(store.range("eth", 0, u64::MAX).unwrap().is_empty());
    }

    #[test]
    fn separator_symbol_rejected() {
        let dir = tempdir().unwrap();
        let store = RedbStore::open(dir.path().join("test.redb")).unwrap();
        assert!(matches!(store.append(&point("a:b", 1)), Err(StorageError::InvalidSymbol(_))));
    }

    #[test]
    fn cache_and_secrets() {
        let dir = tempdir().unwrap();
        let store = RedbStore::open(dir.path().join("test.redb")).unwrap();

        store.cache_put("topSymbols:5", &json!(["bitcoin"])).unwrap();
        assert_eq!(store.cache_get("topSymbols:5").unwrap(), Some(json!(["bitcoin"])));
        assert_eq!(store.cache_get("missing").unwrap(), None);

        store.store_secret("rpc-seed", &[1, 2, 3]).unwrap();
        assert_eq!(store.load_secret("rpc-seed").unwrap(), Some(vec![1, 2, 3]));
        assert_eq!(store.load_secret("dht-seed").unwrap(), None);
    }
}
