//! Core types and trait definitions for the HDL file-drop importer.
//!
//! This crate is deliberately free of filesystem, codec, and database
//! dependencies. The codec, the SQLite backend and the watcher all depend on
//! it; it depends on nothing proprietary.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod artifact;
pub mod audit;
pub mod decrypt;
pub mod error;
pub mod kind;
pub mod person;
pub mod row;
pub mod store;

pub use error::{Error, Result};
pub use kind::{SchemaKind, classify};
