//! Strata VFS - Mount routing and filesystem composition.
//!
//! Provides:
//! - The mount table and path router (`Vfs`)
//! - Composers applicable to any `FileSystem`: `LockedFs`, `ReadonlyFs`,
//!   and the copy-on-write `OverlayFs`
//! - The `AsyncBridge` adapting asynchronous backends to the synchronous
//!   contract through an in-memory mirror with FIFO write-back
//! - The backend registry and mount configuration

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod backend;
pub mod bridge;
pub mod locked;
pub mod mount;
pub mod overlay;
pub mod readonly;
pub mod vfs;

pub use backend::{
    resolve_mount_config, Backend, ConfigValue, Configuration, InMemoryBackend, MountSpec,
    OptionKind, OptionSpec, OptionValue, ResolvedOptions,
};
pub use bridge::AsyncBridge;
pub use locked::LockedFs;
pub use mount::MountTable;
pub use overlay::OverlayFs;
pub use readonly::ReadonlyFs;
pub use vfs::Vfs;
