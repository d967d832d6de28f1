//! The authoritative in-memory index: every live key mapped to the on-disk
//! coordinates of its block, in insertion order.
//!
//! A hash map answers point lookups; a separate order vector remembers
//! first insertion, since iteration must follow it and a plain hash table
//! would forget. Re-setting an existing key keeps its position.

use std::collections::HashMap;

use packdb_api::types::Value;

/// What an entry holds for its value besides the block coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// The value itself, cached at load or write time
    /// (`in_memory_values = true`).
    Cached(Value),
    /// Where the value bytes sit inside the block, for on-demand positioned
    /// reads (`in_memory_values = false`).
    OnDisk {
        /// Offset of the value bytes from the start of the block.
        value_off: u32,
        /// Byte length of the value.
        value_len: u32,
    },
}

/// One live key's entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// File offset at which the containing block starts.
    pub offset: u64,
    /// Physical size of the containing block, in bytes.
    pub size: u64,
    /// Cached value or its in-block coordinates.
    pub payload: Payload,
}

/// Insertion-ordered map from live keys to their entries.
#[derive(Debug, Default)]
pub struct Index {
    map: HashMap<String, Entry>,
    // Only ever holds keys present in `map`, each exactly once.
    order: Vec<String>,
}

impl Index {
    /// An empty index.
    pub fn new() -> Index {
        Index::default()
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether no key is live.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Whether `key` is live.
    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    /// Look up the entry for `key`.
    pub fn get(&self, key: &str) -> Option<&Entry> {
        self.map.get(key)
    }

    /// Insert or replace the entry for `key`. A fresh key goes to the back
    /// of the iteration order; a replaced one keeps its position.
    pub fn insert(&mut self, key: &str, entry: Entry) {
        if self.map.insert(key.to_string(), entry).is_none() {
            self.order.push(key.to_string());
        }
    }

    /// Remove the entry for `key`, if there is one.
    pub fn remove(&mut self, key: &str) -> Option<Entry> {
        let entry = self.map.remove(key)?;
        self.order.retain(|k| k != key);
        Some(entry)
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.map.clear();
        self.order.clear();
    }

    /// The live keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// The live entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Entry)> {
        self.order.iter().map(move |k| (k.as_str(), &self.map[k.as_str()]))
    }
}
