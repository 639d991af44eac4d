//! Strata Store - Storage substrate and the store-backed filesystem.
//!
//! Provides:
//! - The `Store` / `Transaction` contracts (byte key/value with
//!   begin/commit/abort)
//! - A buffering transaction adapter for non-transactional stores
//! - `MemoryStore`, the in-process store
//! - Inode and directory record codecs
//! - `StoreFs`, the filesystem reified on top of any `Store`

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod dir;
pub mod fs;
pub mod inode;
pub mod store;

mod file;

pub use fs::StoreFs;
pub use store::{MemoryStore, SimpleStore, Store, StoreError, Transaction};
