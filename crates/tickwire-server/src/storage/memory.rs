//! In-memory [`Store`] backend.
//!
//! Same contract as the redb backend, including symbol validation, without
//! durability.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, PoisonError, RwLock},
};

use serde_json::Value;
use tickwire_proto::payloads::SeriesPoint;

use super::{Store, StorageError, validate_symbol};

type Series = Arc<RwLock<BTreeMap<u64, SeriesPoint>>>;

/// In-memory store for tests and ephemeral servers.
///
/// Each symbol's series has its own lock. The outer map is write-locked only
/// when a symbol is seen for the first time, so appends to one symbol never
/// block range scans of another.
#[derive(Clone, Default)]
pub struct MemoryStore {
    series: Arc<RwLock<HashMap<String, Series>>>,
    cache: Arc<RwLock<HashMap<String, Value>>>,
    secrets: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn series(&self, symbol: &str) -> Option<Series> {
        self.series.read().unwrap_or_else(PoisonError::into_inner).get(symbol).cloned()
    }

    fn series_or_insert(&self, symbol: &str) -> Series {
        if let Some(series) = self.series(symbol) {
            return series;
        }
        let mut map = self.series.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(map.entry(symbol.to_string()).or_default())
    }
}

impl Store for MemoryStore {
    fn append(&self, point: &SeriesPoint) -> Result<(), StorageError> {
        validate_symbol(&point.symbol)?;

        let series = self.series_or_insert(&point.symbol);
        let mut series = series.write().unwrap_or_else(PoisonError::into_inner);

        if series.contains_key(&point.observed_at) {
            return Err(StorageError::DuplicateKey {
                symbol: point.symbol.clone(),
                timestamp: point.observed_at,
            });
        }
        series.insert(point.observed_at, point.clone());
        Ok(())
    }

    fn latest(&self, symbol: &str) -> Result<SeriesPoint, StorageError> {
        validate_symbol(symbol)?;

        self.series(symbol)
            .and_then(|series| {
                series
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .last_key_value()
                    .map(|(_, point)| point.clone())
            })
            .ok_or_else(|| StorageError::NotFound(symbol.to_string()))
    }

    fn range(&self, symbol: &str, from: u64, to: u64) -> Result<Vec<SeriesPoint>, StorageError> {
        validate_symbol(symbol)?;
        if from >= to {
            return Ok(Vec::new());
        }
        let Some(series) = self.series(symbol) else {
            return Ok(Vec::new());
        };

        let series = series.read().unwrap_or_else(PoisonError::into_inner);
        Ok(series.range(from..to).map(|(_, point)| point.clone()).collect())
    }

    fn symbols(&self) -> Result<Vec<String>, StorageError> {
        let map = self.series.read().unwrap_or_else(PoisonError::into_inner);
        let mut symbols: Vec<String> = map
            .iter()
            .filter(|(_, series)| {
                !series.read().unwrap_or_else(PoisonError::into_inner).is_empty()
            })
            .map(|(symbol, _)| symbol.clone())
            .collect();
        symbols.sort();
        Ok(symbols)
    }

    fn cache_get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.cache.read().unwrap_or_else(PoisonError::into_inner).get(key).cloned())
    }

    fn cache_put(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.clone());
        Ok(())
    }

    fn load_secret(&self, name: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.secrets.read().unwrap_or_else(PoisonError::into_inner).get(name).cloned())
    }

    fn store_secret(&self, name: &str, value: &[u8]) -> Result<(), StorageError> {
        self.secrets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), value.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn point(symbol: &str, at: u64, value: f64) -> SeriesPoint {
        SeriesPoint { symbol: symbol.to_string(), observed_at: at, value, sources: Vec::new() }
    }

    #[test]
    fn latest_returns_max_timestamp() {
        let store = MemoryStore::new();
        store.append(&point("btc", 20, 2.0)).unwrap();
        store.append(&point("btc", 10, 1.0)).unwrap();
        store.append(&point("eth", 30, 3.0)).unwrap();

        assert_eq!(store.latest("btc").unwrap().observed_at, 20);
        assert_eq!(store.latest("doge"), Err(StorageError::NotFound("doge".into())));
    }

    #[test]
    fn duplicate_append_is_rejected() {
        let store = MemoryStore::new();
        store.append(&point("btc", 10, 1.0)).unwrap();

        let err = store.append(&point("btc", 10, 9.0)).unwrap_err();
        assert_eq!(err, StorageError::DuplicateKey { symbol: "btc".into(), timestamp: 10 });
        assert_eq!(store.latest("btc").unwrap().value, 1.0);
    }

    #[test]
    fn range_is_half_open() {
        let store = MemoryStore::new();
        for at in [10, 20, 30] {
            store.append(&point("btc", at, at as f64)).unwrap();
        }

        let got: Vec<u64> = store.range("btc", 10, 30).unwrap().iter().map(|p| p.observed_at).collect();
        assert_eq!(got, vec![10, 20]);
        assert!(store.range("btc", 30, 10).unwrap().is_empty());
        assert!(store.range("eth", 0, 100).unwrap().is_empty());
    }

    #[test]
    fn cache_overwrites() {
        let store = MemoryStore::new();
        assert_eq!(store.cache_get("k").unwrap(), None);
        store.cache_put("k", &json!(1)).unwrap();
        store.cache_put("k", &json!(2)).unwrap();
        assert_eq!(store.cache_get("k").unwrap(), Some(json!(2)));
    }

    #[test]
    fn concurrent_appends_to_distinct_symbols() {
        let store = MemoryStore::new();
        let handles: Vec<_> = ["a", "b", "c", "d"]
            .into_iter()
            .map(|symbol| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for at in 0..100 {
                        store.append(&point(symbol, at, 0.0)).unwrap();
                        let _ = store.range(symbol, 0, at + 1).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.symbols().unwrap(), vec!["a", "b", "c", "d"]);
        assert_eq!(store.range("c", 0, 1000).unwrap().len(), 100);
    }
}
