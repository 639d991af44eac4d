//! Strata Core - Types, contracts, and primitives for the strata VFS.
//!
//! This crate provides:
//! - Errno-coded error values shared by every layer
//! - Credential and stat records with POSIX permission checks
//! - Portable absolute-path utilities
//! - Canonical encoding for on-store records
//! - The `FileSystem` / `AsyncFileSystem` / `File` contracts

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod cred;
pub mod encoding;
pub mod error;
pub mod fs;
pub mod path;
pub mod stats;
pub mod time;

pub use cred::Cred;
pub use encoding::{CanonicalDecode, CanonicalEncode, DecodeError};
pub use error::{Errno, FsError, FsResult};
pub use fs::{AsyncFile, AsyncFileSystem, File, FileSystem, FsMetadata, OpenFlag};
pub use stats::{FileType, Ino, Stats};
pub use time::Timestamp;

/// Filesystem type constant reported by `FsMetadata::fs_type` ("zenfs").
pub const FS_TYPE: u64 = 0x7A65_6E66_73;

/// Fixed block size reported in stat records.
pub const BLOCK_SIZE: u32 = 4096;

/// Sector size used to derive the stat `blocks` count.
pub const SECTOR_SIZE: u64 = 512;
