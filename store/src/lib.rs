//! packdb: an embedded key-value store packing records into size-classed
//! blocks of a single append-oriented file.
//!
//! The store keeps an authoritative in-memory [`index`](index/index.html)
//! from keys to on-disk block coordinates (optionally caching the values
//! themselves), recycles deleted blocks through the
//! [`registry`](registry/index.html), and serializes every file-touching
//! operation behind a single write gate in the
//! [`engine`](engine/index.html). Opening a database rebuilds the index by
//! scanning every block of the file.
//!
//! The on-disk format and the I/O primitives live in the `packdb_api`
//! crate; this crate composes them into the map semantics and ships the
//! `packdb` shell binary on top.

#![deny(missing_docs)]

//The free-block registry and the in-memory index
pub mod index;
pub mod registry;

//The store engine itself
pub mod engine;

//The interactive command shell wrapped around the engine
pub mod shell;

pub use engine::KvStore;
pub use packdb_api::error::{Result, StoreError};
pub use packdb_api::kv::{KeyValueSupport, StoreOptions, StoreSysSupport};
pub use packdb_api::types::Value;
