//! Read-only projection composer.

use std::sync::Arc;

use strata_core::error::{err, Errno};
use strata_core::{Cred, File, FileSystem, FsMetadata, FsResult, OpenFlag, Stats};

/// Rejects every mutator with `EROFS`, leaving the wrapped filesystem
/// untouched. Reads forward unchanged.
pub struct ReadonlyFs {
    inner: Arc<dyn FileSystem>,
}

impl ReadonlyFs {
    /// Wraps `inner` in a read-only projection.
    pub fn new(inner: Arc<dyn FileSystem>) -> Self {
        Self { inner }
    }
}

impl FileSystem for ReadonlyFs {
    fn ready(&self) -> FsResult<()> {
        self.inner.ready()
    }

    fn metadata(&self) -> FsMetadata {
        let mut metadata = self.inner.metadata();
        metadata.readonly = true;
        metadata
    }

    fn rename(&self, old: &str, _new: &str, _cred: &Cred) -> FsResult<()> {
        Err(err(Errno::EROFS, old).syscall("rename"))
    }

    fn stat(&self, path: &str, cred: &Cred) -> FsResult<Stats> {
        self.inner.stat(path, cred)
    }

    fn open_file(&self, path: &str, flag: OpenFlag, cred: &Cred) -> FsResult<Box<dyn File>> {
        if flag.write || flag.truncate {
            return Err(err(Errno::EROFS, path).syscall("open"));
        }
        self.inner.open_file(path, flag, cred)
    }

    fn create_file(
        &self,
        path: &str,
        _flag: OpenFlag,
        _mode: u32,
        _cred: &Cred,
    ) -> FsResult<Box<dyn File>> {
        Err(err(Errno::EROFS, path).syscall("create"))
    }

    fn unlink(&self, path: &str, _cred: &Cred) -> FsResult<()> {
        Err(err(Errno::EROFS, path).syscall("unlink"))
    }

    fn rmdir(&self, path: &str, _cred: &Cred) -> FsResult<()> {
        Err(err(Errno::EROFS, path).syscall("rmdir"))
    }

    fn mkdir(&self, path: &str, _mode: u32, _cred: &Cred) -> FsResult<()> {
        Err(err(Errno::EROFS, path).syscall("mkdir"))
    }

    fn readdir(&self, path: &str, cred: &Cred) -> FsResult<Vec<String>> {
        self.inner.readdir(path, cred)
    }

    fn link(&self, src: &str, _dst: &str, _cred: &Cred) -> FsResult<()> {
        Err(err(Errno::EROFS, src).syscall("link"))
    }

    fn sync(&self, path: &str, _data: &[u8], _stats: &Stats) -> FsResult<()> {
        Err(err(Errno::EROFS, path).syscall("sync"))
    }

    fn exists(&self, path: &str, cred: &Cred) -> bool {
        self.inner.exists(path, cred)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_store::{MemoryStore, StoreFs};

    fn readonly_with_file() -> (Arc<dyn FileSystem>, ReadonlyFs) {
        let fs: Arc<dyn FileSystem> = Arc::new(StoreFs::open(MemoryStore::new()).unwrap());
        let mut f = fs
            .create_file("/r", OpenFlag::WRITE, 0o644, &Cred::ROOT)
            .unwrap();
        f.write(b"original", None).unwrap();
        f.close().unwrap();
        let ro = ReadonlyFs::new(Arc::clone(&fs));
        (fs, ro)
    }

    #[test]
    fn test_reads_forward() {
        let (_, ro) = readonly_with_file();
        assert_eq!(ro.stat("/r", &Cred::ROOT).unwrap().size, 8);
        assert_eq!(ro.readdir("/", &Cred::ROOT).unwrap(), vec!["r"]);
        assert!(ro.metadata().readonly);
    }

    #[test]
    fn test_every_mutator_is_erofs() {
        let (_, ro) = readonly_with_file();
        let cred = Cred::ROOT;
        assert!(ro.mkdir("/d", 0o755, &cred).unwrap_err().is(Errno::EROFS));
        assert!(ro.unlink("/r", &cred).unwrap_err().is(Errno::EROFS));
        assert!(ro.rmdir("/r", &cred).unwrap_err().is(Errno::EROFS));
        assert!(ro.rename("/r", "/s", &cred).unwrap_err().is(Errno::EROFS));
        assert!(ro.link("/r", "/s", &cred).unwrap_err().is(Errno::EROFS));
        assert!(ro
            .create_file("/n", OpenFlag::WRITE, 0o644, &cred)
            .err().unwrap()
            .is(Errno::EROFS));
        assert!(ro
            .open_file("/r", OpenFlag::parse("w").unwrap(), &cred)
            .err().unwrap()
            .is(Errno::EROFS));
    }

    #[test]
    fn test_underlying_state_untouched() {
        let (inner, ro) = readonly_with_file();
        let _ = ro.unlink("/r", &Cred::ROOT);
        let mut f = inner.open_file("/r", OpenFlag::READ, &Cred::ROOT).unwrap();
        let mut buf = [0u8; 8];
        f.read(&mut buf, None).unwrap();
        assert_eq!(&buf, b"original");
    }
}
