//! The error type shared by the storage primitives and the engine built on
//! top of them.
//!
//! The store surfaces exactly four structured failure kinds: I/O failures
//! from the backing file, a capacity request past the top of the block size
//! ladder, an on-disk block that contradicts the file around it, and a key
//! the record format cannot store. Everything is reported to the caller of
//! the operation that provoked it; the engine performs no internal retries.
//!
//! The `#[error]` tag takes care of the `Display` impl of each variant, and
//! the `#[from]` tag generates the `From` conversions that make the `?`
//! operator work directly on `std::io` results, as you can see throughout
//! [`controller`](../controller/index.html).

use std::io;
use thiserror::Error;

/// Everything that can go wrong inside the store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failure from a positioned read or write, an open, a stat, or a
    /// truncate on the backing file.
    #[error("I/O failure in the storage layer")]
    Io(#[from] io::Error),

    /// The sizing function was asked for a capacity no ladder size can hold,
    /// i.e. one whose exponent would exceed 31.
    #[error("no block class can hold {0} bytes")]
    BlockTooLarge(u64),

    /// A block decoded during the load scan is inconsistent with the file:
    /// its declared extent runs past end-of-file, or its record does not fit
    /// the size its flags claim. Fatal to the load; the store is unusable.
    #[error("corrupt block at offset {offset}: {reason}")]
    CorruptBlock {
        /// File offset at which the offending block starts.
        offset: u64,
        /// What was inconsistent about it.
        reason: &'static str,
    },

    /// The caller supplied a key the record format cannot store: empty, or
    /// longer than the widest key length prefix can express.
    #[error("invalid key: {0}")]
    InvalidKey(&'static str),
}

/// Define a generic alias for a `Result` with the error type `StoreError`.
/// This shorthand is what both crates use for their fallible operations.
pub type Result<T> = std::result::Result<T, StoreError>;
