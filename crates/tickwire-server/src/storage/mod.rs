//! Time-indexed store.
//!
//! Append-only price series keyed by `symbol || ':' || timestamp`, a
//! generic JSON cache and a small secrets namespace for identity material.
//! The trait is synchronous; both backends finish without waiting on the
//! network.

mod error;
mod memory;
mod redb;

pub use error::StorageError;
pub use memory::MemoryStore;
use serde_json::Value;
use tickwire_proto::payloads::SeriesPoint;

pub use self::redb::RedbStore;

/// Byte separating symbol and timestamp in series keys.
pub const KEY_SEPARATOR: u8 = b':';

/// Storage for series points, cache entries and identity secrets.
///
/// Clones share the same underlying store.
pub trait Store: Clone + Send + Sync + 'static {
    /// Append `point` at `(point.symbol, point.observed_at)`.
    ///
    /// # Errors
    ///
    /// - `InvalidSymbol` if the symbol is empty or contains `':'`
    /// - `DuplicateKey` if a point already exists at that key; the store
    ///   never overwrites
    fn append(&self, point: &SeriesPoint) -> Result<(), StorageError>;

    /// Point with the greatest timestamp for `symbol`.
    ///
    /// # Errors
    ///
    /// - `InvalidSymbol` if the symbol is empty or contains `':'`
    /// - `NotFound` if nothing was appended for `symbol`
    fn latest(&self, symbol: &str) -> Result<SeriesPoint, StorageError>;

    /// Points with `from <= observed_at < to`, in increasing time order.
    ///
    /// # Errors
    ///
    /// - `InvalidSymbol` if the symbol is empty or contains `':'`
    fn range(&self, symbol: &str, from: u64, to: u64) -> Result<Vec<SeriesPoint>, StorageError>;

    /// Every symbol with at least one point, sorted.
    fn symbols(&self) -> Result<Vec<String>, StorageError>;

    /// Cached value for `key`, `None` if absent.
    fn cache_get(&self, key: &str) -> Result<Option<Value>, StorageError>;

    /// Store or overwrite the cached value for `key`.
    fn cache_put(&self, key: &str, value: &Value) -> Result<(), StorageError>;

    /// Persisted secret `name`, `None` if never stored.
    fn load_secret(&self, name: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Persist secret `name`, overwriting any previous value.
    fn store_secret(&self, name: &str, value: &[u8]) -> Result<(), StorageError>;
}

/// Reject symbols that would break key ordering.
pub(crate) fn validate_symbol(symbol: &str) -> Result<(), StorageError> {
    if symbol.is_empty() || symbol.as_bytes().contains(&KEY_SEPARATOR) {
        return Err(StorageError::InvalidSymbol(symbol.to_string()));
    }
    Ok(())
}

/// Encode a series key. Big-endian timestamps make byte order equal time
/// order within one symbol.
pub(crate) fn encode_series_key(symbol: &str, timestamp: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(symbol.len() + 1 + 8);
    key.extend_from_slice(symbol.as_bytes());
    key.push(KEY_SEPARATOR);
    key.extend_from_slice(&timestamp.to_be_bytes());
    key
}
