//! Async-backend doubles used by the bridge suites.

use std::sync::Arc;

use async_trait::async_trait;

use strata_core::error::{Errno, FsError};
use strata_core::stats::S_IFDIR;
use strata_core::{
    AsyncFile, AsyncFileSystem, Cred, File, FileSystem, FsMetadata, FsResult, Ino, OpenFlag, Stats,
};

/// Serves the asynchronous contract by calling a synchronous filesystem
/// inline. Stands in for a real remote backend in bridge tests.
pub struct BlockingFs {
    inner: Arc<dyn FileSystem>,
}

impl BlockingFs {
    /// Wraps `inner`.
    pub fn new(inner: Arc<dyn FileSystem>) -> Self {
        Self { inner }
    }
}

struct BlockingFile(Box<dyn File>);

#[async_trait]
impl AsyncFile for BlockingFile {
    async fn read(&mut self, buf: &mut [u8], position: Option<u64>) -> FsResult<usize> {
        self.0.read(buf, position)
    }

    async fn write(&mut self, buf: &[u8], position: Option<u64>) -> FsResult<usize> {
        self.0.write(buf, position)
    }

    async fn stat(&self) -> FsResult<Stats> {
        self.0.stat()
    }

    async fn sync(&mut self) -> FsResult<()> {
        self.0.sync()
    }

    async fn close(&mut self) -> FsResult<()> {
        self.0.close()
    }
}

#[async_trait]
impl AsyncFileSystem for BlockingFs {
    async fn ready(&self) -> FsResult<()> {
        self.inner.ready()
    }

    fn metadata(&self) -> FsMetadata {
        self.inner.metadata()
    }

    async fn rename(&self, old: &str, new: &str, cred: &Cred) -> FsResult<()> {
        self.inner.rename(old, new, cred)
    }

    async fn stat(&self, path: &str, cred: &Cred) -> FsResult<Stats> {
        self.inner.stat(path, cred)
    }

    async fn open_file(
        &self,
        path: &str,
        flag: OpenFlag,
        cred: &Cred,
    ) -> FsResult<Box<dyn AsyncFile>> {
        Ok(Box::new(BlockingFile(self.inner.open_file(path, flag, cred)?)))
    }

    async fn create_file(
        &self,
        path: &str,
        flag: OpenFlag,
        mode: u32,
        cred: &Cred,
    ) -> FsResult<Box<dyn AsyncFile>> {
        Ok(Box::new(BlockingFile(
            self.inner.create_file(path, flag, mode, cred)?,
        )))
    }

    async fn unlink(&self, path: &str, cred: &Cred) -> FsResult<()> {
        self.inner.unlink(path, cred)
    }

    async fn rmdir(&self, path: &str, cred: &Cred) -> FsResult<()> {
        self.inner.rmdir(path, cred)
    }

    async fn mkdir(&self, path: &str, mode: u32, cred: &Cred) -> FsResult<()> {
        self.inner.mkdir(path, mode, cred)
    }

    async fn readdir(&self, path: &str, cred: &Cred) -> FsResult<Vec<String>> {
        self.inner.readdir(path, cred)
    }

    async fn link(&self, src: &str, dst: &str, cred: &Cred) -> FsResult<()> {
        self.inner.link(src, dst, cred)
    }

    async fn sync(&self, path: &str, data: &[u8], stats: &Stats) -> FsResult<()> {
        self.inner.sync(path, data, stats)
    }
}

/// A remote endpoint with no responder attached: the handshake exposes
/// an empty root, and every other RPC times out.
pub struct DeadRemoteFs;

fn rpc_failed(path: &str) -> FsError {
    FsError::with_message(Errno::EIO, "RPC Failed").path(path)
}

#[async_trait]
impl AsyncFileSystem for DeadRemoteFs {
    fn metadata(&self) -> FsMetadata {
        FsMetadata::new("dead-remote")
    }

    async fn rename(&self, old: &str, _new: &str, _cred: &Cred) -> FsResult<()> {
        Err(rpc_failed(old))
    }

    async fn stat(&self, path: &str, _cred: &Cred) -> FsResult<Stats> {
        if path == "/" {
            return Ok(Stats::new(Ino::ROOT, S_IFDIR | 0o755, 0, 0));
        }
        Err(rpc_failed(path))
    }

    async fn open_file(
        &self,
        path: &str,
        _flag: OpenFlag,
        _cred: &Cred,
    ) -> FsResult<Box<dyn AsyncFile>> {
        Err(rpc_failed(path))
    }

    async fn create_file(
        &self,
        path: &str,
        _flag: OpenFlag,
        _mode: u32,
        _cred: &Cred,
    ) -> FsResult<Box<dyn AsyncFile>> {
        Err(rpc_failed(path))
    }

    async fn unlink(&self, path: &str, _cred: &Cred) -> FsResult<()> {
        Err(rpc_failed(path))
    }

    async fn rmdir(&self, path: &str, _cred: &Cred) -> FsResult<()> {
        Err(rpc_failed(path))
    }

    async fn mkdir(&self, path: &str, _mode: u32, _cred: &Cred) -> FsResult<()> {
        Err(rpc_failed(path))
    }

    async fn readdir(&self, path: &str, _cred: &Cred) -> FsResult<Vec<String>> {
        if path == "/" {
            return Ok(Vec::new());
        }
        Err(rpc_failed(path))
    }

    async fn link(&self, src: &str, _dst: &str, _cred: &Cred) -> FsResult<()> {
        Err(rpc_failed(src))
    }

    async fn sync(&self, path: &str, _data: &[u8], _stats: &Stats) -> FsResult<()> {
        Err(rpc_failed(path))
    }
}
