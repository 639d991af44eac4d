//! Global-serialization composer.

use std::sync::Arc;

use parking_lot::FairMutex;

use strata_core::{Cred, File, FileSystem, FsMetadata, FsResult, OpenFlag, Stats};

/// Serializes every operation on the wrapped filesystem.
///
/// The mutex is fair, so waiting operations run in arrival order.
/// Reentrancy is forbidden: the wrapped filesystem must never call back
/// into its own public surface.
pub struct LockedFs {
    inner: Arc<dyn FileSystem>,
    lock: FairMutex<()>,
}

impl LockedFs {
    /// Wraps `inner` in a global lock.
    pub fn new(inner: Arc<dyn FileSystem>) -> Self {
        Self {
            inner,
            lock: FairMutex::new(()),
        }
    }
}

impl FileSystem for LockedFs {
    fn ready(&self) -> FsResult<()> {
        let _guard = self.lock.lock();
        self.inner.ready()
    }

    fn metadata(&self) -> FsMetadata {
        let _guard = self.lock.lock();
        self.inner.metadata()
    }

    fn rename(&self, old: &str, new: &str, cred: &Cred) -> FsResult<()> {
        let _guard = self.lock.lock();
        self.inner.rename(old, new, cred)
    }

    fn stat(&self, path: &str, cred: &Cred) -> FsResult<Stats> {
        let _guard = self.lock.lock();
        self.inner.stat(path, cred)
    }

    fn open_file(&self, path: &str, flag: OpenFlag, cred: &Cred) -> FsResult<Box<dyn File>> {
        let _guard = self.lock.lock();
        self.inner.open_file(path, flag, cred)
    }

    fn create_file(
        &self,
        path: &str,
        flag: OpenFlag,
        mode: u32,
        cred: &Cred,
    ) -> FsResult<Box<dyn File>> {
        let _guard = self.lock.lock();
        self.inner.create_file(path, flag, mode, cred)
    }

    fn unlink(&self, path: &str, cred: &Cred) -> FsResult<()> {
        let _guard = self.lock.lock();
        self.inner.unlink(path, cred)
    }

    fn rmdir(&self, path: &str, cred: &Cred) -> FsResult<()> {
        let _guard = self.lock.lock();
        self.inner.rmdir(path, cred)
    }

    fn mkdir(&self, path: &str, mode: u32, cred: &Cred) -> FsResult<()> {
        let _guard = self.lock.lock();
        self.inner.mkdir(path, mode, cred)
    }

    fn readdir(&self, path: &str, cred: &Cred) -> FsResult<Vec<String>> {
        let _guard = self.lock.lock();
        self.inner.readdir(path, cred)
    }

    fn link(&self, src: &str, dst: &str, cred: &Cred) -> FsResult<()> {
        let _guard = self.lock.lock();
        self.inner.link(src, dst, cred)
    }

    fn sync(&self, path: &str, data: &[u8], stats: &Stats) -> FsResult<()> {
        let _guard = self.lock.lock();
        self.inner.sync(path, data, stats)
    }

    fn exists(&self, path: &str, cred: &Cred) -> bool {
        let _guard = self.lock.lock();
        self.inner.exists(path, cred)
    }
}
