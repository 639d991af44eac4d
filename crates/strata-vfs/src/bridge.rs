//! Async→sync bridge: an in-memory mirror with FIFO write-back.
//!
//! `AsyncBridge::new` walks the async backend from `/` and mirrors every
//! inode into an in-memory `StoreFs`. Afterwards the synchronous
//! contract is served entirely from the mirror; mutations apply to the
//! mirror first (so subsequent sync reads observe them) and are queued
//! against the backend, one in flight at a time, in arrival order.
//!
//! The bridge is eventually consistent: a successful sync call does not
//! imply the backend has persisted it. Callers needing durability await
//! `queue_done()`. The first failed queued operation latches and is
//! surfaced from the next `ready()` or sync call, then cleared.
//!
//! The asynchronous contract is also implemented, by direct forwarding:
//! async mutations run against the backend first and are then applied to
//! the mirror. Writes made through an async file handle bypass the
//! mirror until the file is synced at the filesystem level.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Notify;
use tracing::{debug, warn};

use strata_core::error::{Errno, FsError, FsResult};
use strata_core::path as vpath;
use strata_core::stats::S_IFMT;
use strata_core::{
    AsyncFile, AsyncFileSystem, Cred, File, FileSystem, FsMetadata, OpenFlag, Stats,
};
use strata_store::{MemoryStore, StoreFs};

type Mirror = StoreFs<MemoryStore>;

enum QueuedOp {
    Mkdir {
        path: String,
        mode: u32,
        cred: Cred,
    },
    CreateFile {
        path: String,
        mode: u32,
        cred: Cred,
    },
    Unlink {
        path: String,
        cred: Cred,
    },
    Rmdir {
        path: String,
        cred: Cred,
    },
    Rename {
        old: String,
        new: String,
        cred: Cred,
    },
    Link {
        src: String,
        dst: String,
        cred: Cred,
    },
    Sync {
        path: String,
        data: Bytes,
        stats: Stats,
    },
}

struct Shared {
    pending: AtomicUsize,
    drained: Notify,
    latched: Mutex<Option<FsError>>,
}

fn enqueue_op(queue: &UnboundedSender<QueuedOp>, shared: &Shared, op: QueuedOp) -> FsResult<()> {
    shared.pending.fetch_add(1, Ordering::AcqRel);
    if queue.send(op).is_err() {
        shared.pending.fetch_sub(1, Ordering::AcqRel);
        return Err(FsError::with_message(Errno::EIO, "write-back queue closed"));
    }
    Ok(())
}

/// Adapts an asynchronous backend to the synchronous contract.
pub struct AsyncBridge {
    backend: Arc<dyn AsyncFileSystem>,
    mirror: Option<Mirror>,
    queue: Option<UnboundedSender<QueuedOp>>,
    shared: Arc<Shared>,
}

impl AsyncBridge {
    /// Readies the backend, mirrors it into memory, and starts the
    /// write-back driver.
    pub async fn new(backend: Arc<dyn AsyncFileSystem>) -> FsResult<Self> {
        backend.ready().await?;
        let mirror = StoreFs::open(MemoryStore::new())?;
        cross_copy(&backend, &mirror, "/").await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            pending: AtomicUsize::new(0),
            drained: Notify::new(),
            latched: Mutex::new(None),
        });
        tokio::spawn(drive(Arc::clone(&backend), rx, Arc::clone(&shared)));

        Ok(Self {
            backend,
            mirror: Some(mirror),
            queue: Some(tx),
            shared,
        })
    }

    /// Creates a bridge with the mirror disabled: every synchronous
    /// operation fails with `ENOTSUP`, while the asynchronous contract
    /// still forwards to the backend.
    pub fn disabled(backend: Arc<dyn AsyncFileSystem>) -> Self {
        Self {
            backend,
            mirror: None,
            queue: None,
            shared: Arc::new(Shared {
                pending: AtomicUsize::new(0),
                drained: Notify::new(),
                latched: Mutex::new(None),
            }),
        }
    }

    /// Resolves when every queued mutation has been applied to the
    /// backend (successfully or not).
    pub async fn queue_done(&self) {
        loop {
            let notified = self.shared.drained.notified();
            if self.shared.pending.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }

    fn mirror(&self) -> FsResult<&Mirror> {
        self.mirror.as_ref().ok_or_else(|| {
            FsError::with_message(Errno::ENOTSUP, "synchronous access disabled (no async cache)")
        })
    }

    fn queue(&self) -> FsResult<&UnboundedSender<QueuedOp>> {
        self.queue.as_ref().ok_or_else(|| {
            FsError::with_message(Errno::ENOTSUP, "synchronous access disabled (no async cache)")
        })
    }

    fn check_latched(&self) -> FsResult<()> {
        match self.shared.latched.lock().take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn enqueue(&self, op: QueuedOp) -> FsResult<()> {
        match &self.queue {
            Some(queue) => enqueue_op(queue, &self.shared, op),
            None => Ok(()),
        }
    }
}

async fn drive(
    backend: Arc<dyn AsyncFileSystem>,
    mut rx: UnboundedReceiver<QueuedOp>,
    shared: Arc<Shared>,
) {
    while let Some(op) = rx.recv().await {
        if let Err(e) = apply(&backend, op).await {
            warn!(error = %e, "queued operation failed against async backend");
            *shared.latched.lock() = Some(e);
        }
        if shared.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            shared.drained.notify_waiters();
        }
    }
}

async fn apply(backend: &Arc<dyn AsyncFileSystem>, op: QueuedOp) -> FsResult<()> {
    match op {
        QueuedOp::Mkdir { path, mode, cred } => backend.mkdir(&path, mode, &cred).await,
        QueuedOp::CreateFile { path, mode, cred } => {
            let mut file = backend
                .create_file(&path, OpenFlag::WRITE, mode, &cred)
                .await?;
            file.close().await
        }
        QueuedOp::Unlink { path, cred } => backend.unlink(&path, &cred).await,
        QueuedOp::Rmdir { path, cred } => backend.rmdir(&path, &cred).await,
        QueuedOp::Rename { old, new, cred } => backend.rename(&old, &new, &cred).await,
        QueuedOp::Link { src, dst, cred } => backend.link(&src, &dst, &cred).await,
        QueuedOp::Sync { path, data, stats } => backend.sync(&path, &data, &stats).await,
    }
}

/// Mirrors the async backend's tree rooted at `path` into `mirror`.
async fn cross_copy(
    backend: &Arc<dyn AsyncFileSystem>,
    mirror: &Mirror,
    path: &str,
) -> FsResult<()> {
    let stats = backend.stat(path, &Cred::ROOT).await?;
    if stats.is_directory() {
        if path != "/" {
            mirror.mkdir(path, stats.mode & !S_IFMT, &Cred::ROOT)?;
        }
        for name in backend.readdir(path, &Cred::ROOT).await? {
            let child = vpath::join(path, &name);
            Box::pin(cross_copy(backend, mirror, &child)).await?;
        }
        Ok(())
    } else {
        debug!(path = %path, size = stats.size, "mirroring file");
        let data = read_all_async(backend, path).await?;
        let mut file =
            mirror.create_file(path, OpenFlag::WRITE, stats.mode & !S_IFMT, &Cred::ROOT)?;
        file.close()?;
        mirror.sync(path, &data, &stats)
    }
}

async fn read_all_async(backend: &Arc<dyn AsyncFileSystem>, path: &str) -> FsResult<Vec<u8>> {
    let mut file = backend.open_file(path, OpenFlag::READ, &Cred::ROOT).await?;
    let size = file.stat().await?.size as usize;
    let mut buf = vec![0; size];
    let mut read = 0;
    while read < size {
        let n = file.read(&mut buf[read..], None).await?;
        if n == 0 {
            break;
        }
        read += n;
    }
    buf.truncate(read);
    file.close().await?;
    Ok(buf)
}

impl FileSystem for AsyncBridge {
    fn ready(&self) -> FsResult<()> {
        self.check_latched()
    }

    fn metadata(&self) -> FsMetadata {
        let mut metadata = self.backend.metadata();
        metadata.no_async_cache = self.mirror.is_none();
        metadata
    }

    fn rename(&self, old: &str, new: &str, cred: &Cred) -> FsResult<()> {
        self.check_latched()?;
        self.mirror()?.rename(old, new, cred)?;
        self.enqueue(QueuedOp::Rename {
            old: old.to_string(),
            new: new.to_string(),
            cred: *cred,
        })
    }

    fn stat(&self, path: &str, cred: &Cred) -> FsResult<Stats> {
        self.check_latched()?;
        self.mirror()?.stat(path, cred)
    }

    fn open_file(&self, path: &str, flag: OpenFlag, cred: &Cred) -> FsResult<Box<dyn File>> {
        self.check_latched()?;
        let mirror = self.mirror()?;
        let queue = self.queue()?.clone();
        let existed = mirror.exists(path, cred);

        // The mirror handle always carries read access so the wrapper
        // can replay the final contents into the queue.
        let mut mirror_flag = flag;
        mirror_flag.read = true;
        let inner = mirror.open_file(path, mirror_flag, cred)?;
        if !existed && flag.create {
            self.enqueue(QueuedOp::CreateFile {
                path: vpath::normalize(path),
                mode: 0o644,
                cred: *cred,
            })?;
        }
        Ok(Box::new(BridgeFile {
            inner,
            path: vpath::normalize(path),
            flag,
            queue,
            shared: Arc::clone(&self.shared),
            closed: false,
        }))
    }

    fn create_file(
        &self,
        path: &str,
        flag: OpenFlag,
        mode: u32,
        cred: &Cred,
    ) -> FsResult<Box<dyn File>> {
        self.check_latched()?;
        let mirror = self.mirror()?;
        let queue = self.queue()?.clone();
        let mut mirror_flag = flag;
        mirror_flag.read = true;
        let inner = mirror.create_file(path, mirror_flag, mode, cred)?;
        self.enqueue(QueuedOp::CreateFile {
            path: vpath::normalize(path),
            mode,
            cred: *cred,
        })?;
        Ok(Box::new(BridgeFile {
            inner,
            path: vpath::normalize(path),
            flag,
            queue,
            shared: Arc::clone(&self.shared),
            closed: false,
        }))
    }

    fn unlink(&self, path: &str, cred: &Cred) -> FsResult<()> {
        self.check_latched()?;
        self.mirror()?.unlink(path, cred)?;
        self.enqueue(QueuedOp::Unlink {
            path: path.to_string(),
            cred: *cred,
        })
    }

    fn rmdir(&self, path: &str, cred: &Cred) -> FsResult<()> {
        self.check_latched()?;
        self.mirror()?.rmdir(path, cred)?;
        self.enqueue(QueuedOp::Rmdir {
            path: path.to_string(),
            cred: *cred,
        })
    }

    fn mkdir(&self, path: &str, mode: u32, cred: &Cred) -> FsResult<()> {
        self.check_latched()?;
        self.mirror()?.mkdir(path, mode, cred)?;
        self.enqueue(QueuedOp::Mkdir {
            path: path.to_string(),
            mode,
            cred: *cred,
        })
    }

    fn readdir(&self, path: &str, cred: &Cred) -> FsResult<Vec<String>> {
        self.check_latched()?;
        self.mirror()?.readdir(path, cred)
    }

    fn link(&self, src: &str, dst: &str, cred: &Cred) -> FsResult<()> {
        self.check_latched()?;
        self.mirror()?.link(src, dst, cred)?;
        self.enqueue(QueuedOp::Link {
            src: src.to_string(),
            dst: dst.to_string(),
            cred: *cred,
        })
    }

    fn sync(&self, path: &str, data: &[u8], stats: &Stats) -> FsResult<()> {
        self.check_latched()?;
        self.mirror()?.sync(path, data, stats)?;
        self.enqueue(QueuedOp::Sync {
            path: path.to_string(),
            data: Bytes::copy_from_slice(data),
            stats: *stats,
        })
    }

    fn exists(&self, path: &str, cred: &Cred) -> bool {
        match self.mirror() {
            Ok(mirror) => mirror.exists(path, cred),
            Err(_) => false,
        }
    }
}

#[async_trait]
impl AsyncFileSystem for AsyncBridge {
    async fn ready(&self) -> FsResult<()> {
        self.check_latched()?;
        self.backend.ready().await
    }

    fn metadata(&self) -> FsMetadata {
        FileSystem::metadata(self)
    }

    async fn rename(&self, old: &str, new: &str, cred: &Cred) -> FsResult<()> {
        self.backend.rename(old, new, cred).await?;
        if let Some(mirror) = &self.mirror {
            mirror.rename(old, new, cred)?;
        }
        Ok(())
    }

    async fn stat(&self, path: &str, cred: &Cred) -> FsResult<Stats> {
        self.backend.stat(path, cred).await
    }

    async fn open_file(
        &self,
        path: &str,
        flag: OpenFlag,
        cred: &Cred,
    ) -> FsResult<Box<dyn AsyncFile>> {
        self.backend.open_file(path, flag, cred).await
    }

    async fn create_file(
        &self,
        path: &str,
        flag: OpenFlag,
        mode: u32,
        cred: &Cred,
    ) -> FsResult<Box<dyn AsyncFile>> {
        let file = self.backend.create_file(path, flag, mode, cred).await?;
        if let Some(mirror) = &self.mirror {
            mirror.create_file(path, flag, mode, cred)?.close()?;
        }
        Ok(file)
    }

    async fn unlink(&self, path: &str, cred: &Cred) -> FsResult<()> {
        self.backend.unlink(path, cred).await?;
        if let Some(mirror) = &self.mirror {
            mirror.unlink(path, cred)?;
        }
        Ok(())
    }

    async fn rmdir(&self, path: &str, cred: &Cred) -> FsResult<()> {
        self.backend.rmdir(path, cred).await?;
        if let Some(mirror) = &self.mirror {
            mirror.rmdir(path, cred)?;
        }
        Ok(())
    }

    async fn mkdir(&self, path: &str, mode: u32, cred: &Cred) -> FsResult<()> {
        self.backend.mkdir(path, mode, cred).await?;
        if let Some(mirror) = &self.mirror {
            mirror.mkdir(path, mode, cred)?;
        }
        Ok(())
    }

    async fn readdir(&self, path: &str, cred: &Cred) -> FsResult<Vec<String>> {
        self.backend.readdir(path, cred).await
    }

    async fn link(&self, src: &str, dst: &str, cred: &Cred) -> FsResult<()> {
        self.backend.link(src, dst, cred).await?;
        if let Some(mirror) = &self.mirror {
            mirror.link(src, dst, cred)?;
        }
        Ok(())
    }

    async fn sync(&self, path: &str, data: &[u8], stats: &Stats) -> FsResult<()> {
        self.backend.sync(path, data, stats).await?;
        if let Some(mirror) = &self.mirror {
            mirror.sync(path, data, stats)?;
        }
        Ok(())
    }
}

/// Sync handle over the mirror whose flushed contents are replayed into
/// the write-back queue.
struct BridgeFile {
    inner: Box<dyn File>,
    path: String,
    flag: OpenFlag,
    queue: UnboundedSender<QueuedOp>,
    shared: Arc<Shared>,
    closed: bool,
}

impl BridgeFile {
    fn replay(&mut self) -> FsResult<()> {
        let stats = self.inner.stat()?;
        let mut data = vec![0; stats.size as usize];
        let mut read = 0;
        while read < data.len() {
            let n = self.inner.read(&mut data[read..], Some(read as u64))?;
            if n == 0 {
                break;
            }
            read += n;
        }
        enqueue_op(
            &self.queue,
            &self.shared,
            QueuedOp::Sync {
                path: self.path.clone(),
                data: Bytes::from(data),
                stats,
            },
        )
    }
}

impl File for BridgeFile {
    fn read(&mut self, buf: &mut [u8], position: Option<u64>) -> FsResult<usize> {
        if !self.flag.read {
            return Err(FsError::new(Errno::EBADF).path(&self.path).syscall("read"));
        }
        self.inner.read(buf, position)
    }

    fn write(&mut self, buf: &[u8], position: Option<u64>) -> FsResult<usize> {
        self.inner.write(buf, position)
    }

    fn stat(&self) -> FsResult<Stats> {
        self.inner.stat()
    }

    fn truncate(&mut self, len: u64) -> FsResult<()> {
        self.inner.truncate(len)
    }

    fn chmod(&mut self, mode: u32) -> FsResult<()> {
        self.inner.chmod(mode)
    }

    fn chown(&mut self, uid: u32, gid: u32) -> FsResult<()> {
        self.inner.chown(uid, gid)
    }

    fn sync(&mut self) -> FsResult<()> {
        self.inner.sync()?;
        if self.flag.write {
            self.replay()?;
        }
        Ok(())
    }

    fn close(&mut self) -> FsResult<()> {
        if self.closed {
            return Ok(());
        }
        self.inner.sync()?;
        if self.flag.write {
            self.replay()?;
        }
        self.inner.close()?;
        self.closed = true;
        Ok(())
    }
}
