//! Shared helpers for the integration suites.

use std::sync::Arc;

use strata_core::path as vpath;
use strata_core::{Cred, FileSystem, FsResult};
use strata_store::{MemoryStore, StoreFs};

/// Initializes tracing for tests.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("strata_store=debug,strata_vfs=debug")
        .with_test_writer()
        .try_init();
}

/// A ready in-memory filesystem.
pub fn memfs() -> Arc<dyn FileSystem> {
    Arc::new(StoreFs::open(MemoryStore::new()).expect("memory store never fails to ready"))
}

/// Collects every path reachable from `root`, depth-first, including
/// `root` itself.
pub fn walk(fs: &Arc<dyn FileSystem>, root: &str) -> FsResult<Vec<String>> {
    let mut paths = vec![root.to_string()];
    let stats = fs.stat(root, &Cred::ROOT)?;
    if stats.is_directory() {
        for name in fs.readdir(root, &Cred::ROOT)? {
            paths.extend(walk(fs, &vpath::join(root, &name))?);
        }
    }
    Ok(paths)
}
