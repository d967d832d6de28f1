//! Storage primitives of the packdb key-value store.
//!
//! This crate contains everything below the engine: the
//! [`controller`](controller/index.html) owning the single backing file and
//! its positioned I/O, the [`types`](types/index.html) module with the
//! block size ladder and the record codec, the shared
//! [`error`](error/index.html) type, and the [`kv`](kv/index.html) traits
//! that the engine crate implements.
//!
//! Placing the primitives in their own crate keeps the seam between "how
//! bytes are laid out" and "what the map semantics are" explicit: the
//! engine crate depends on this one and composes these pieces, it never
//! reaches around them.

#![deny(missing_docs)]

//The backing file and positioned I/O on it
pub mod controller;
pub mod error;

//Value union, size ladder and record codec
pub mod types;

//Configuration and the traits the engine implements
pub mod kv;
