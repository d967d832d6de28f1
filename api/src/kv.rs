//! The public surface of a store: per-instance configuration and the traits
//! the engine implements.
//!
//! The traits are deliberately small. `StoreSysSupport` covers the
//! lifecycle (opening a database file rebuilds the whole in-memory index
//! from a full-file scan, so there is no separate load step), and
//! `KeyValueSupport` is the map-like projection on top. Do not expect
//! transactional behavior from any of this: each operation is atomic with
//! respect to other callers of the same store, and nothing more.

use std::error;
use std::path::Path;

use super::types::Value;

/// Per-instance configuration, fixed at open time.
///
/// The two switches are independent: `buffer_values` decides what kind of
/// [`Value`] the store hands out, `in_memory_values` decides whether the
/// index caches values or reads them back from the file on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    /// Store and return values as raw bytes (`true`) or as UTF-8 text
    /// (`false`). Inputs of the other kind are collapsed to the configured
    /// one. Defaults to `false`.
    pub buffer_values: bool,
    /// Cache each value in its index entry (`true`) or keep only its
    /// on-disk coordinates and perform a positioned read per lookup
    /// (`false`). Defaults to `true`.
    pub in_memory_values: bool,
}

impl Default for StoreOptions {
    fn default() -> StoreOptions {
        StoreOptions {
            buffer_values: false,
            in_memory_values: true,
        }
    }
}

/// Lifecycle of a store implementation.
///
/// This trait also defines the error type used by all the other traits
/// (which require implementing this one first).
pub trait StoreSysSupport: Sized {
    /// The type of the errors of this implementation.
    type Error: error::Error;

    /// Open the database at `path`, creating the file when it is missing.
    /// Opening scans every block of the file to rebuild the index and the
    /// free-block bookkeeping; corruption encountered by that scan makes
    /// the whole open fail.
    fn open<P: AsRef<Path>>(path: P, opts: StoreOptions) -> Result<Self, Self::Error>;

    /// Path of the backing file.
    fn path(&self) -> &Path;

    /// Number of live keys.
    fn len(&self) -> usize;

    /// Whether the store holds no keys at all.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Map-like operations over a store.
///
/// Operations that touch the backing file serialize behind the
/// implementation's write gate; `has`, `len` and cached lookups are
/// answered from the index alone and observe it as of the last completed
/// mutation. Iteration order is always key insertion order.
pub trait KeyValueSupport: StoreSysSupport {
    /// Whether `key` is live. Never touches the file.
    fn has(&self, key: &str) -> bool;

    /// Look up `key`. `Ok(None)` when the key is absent. With value
    /// caching disabled this performs one positioned read of exactly the
    /// value's bytes.
    fn get(&self, key: &str) -> Result<Option<Value>, Self::Error>;

    /// Insert or update `key`. The value is normalized to the configured
    /// kind first. New keys get a freshly placed block; existing keys are
    /// rewritten in place when the new record still fits their block and
    /// are relocated otherwise.
    fn set<V: Into<Value>>(&self, key: &str, value: V) -> Result<(), Self::Error>;

    /// Remove `key`, marking its block reusable. Returns whether the key
    /// was present; deleting an absent key is not an error.
    fn delete(&self, key: &str) -> Result<bool, Self::Error>;

    /// Drop every key and truncate the backing file to zero length.
    fn clear(&self) -> Result<(), Self::Error>;

    /// Live keys in insertion order.
    fn keys(&self) -> Vec<String>;

    /// Values in key insertion order.
    fn values(&self) -> Result<Vec<Value>, Self::Error>;

    /// `(key, value)` pairs in insertion order.
    fn entries(&self) -> Result<Vec<(String, Value)>, Self::Error>;

    /// Visit every pair in insertion order. With value caching disabled,
    /// each value is read back through the write gate one at a time.
    fn for_each<F: FnMut(&str, &Value)>(&self, f: F) -> Result<(), Self::Error>;

    /// Visit every pair in insertion order, stopping at the first error
    /// the callback returns.
    fn try_for_each<F: FnMut(&str, &Value) -> Result<(), Self::Error>>(
        &self,
        f: F,
    ) -> Result<(), Self::Error>;
}
