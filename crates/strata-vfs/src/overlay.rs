//! Copy-on-write overlay: a writable layer projected over a read-only
//! base, with a durable deletion log.
//!
//! Reads prefer the writable layer and fall back to the base; mutations
//! always land on the writable layer, materializing parent directories
//! (and, for in-place edits, file contents) from the base on demand.
//! Deletions of base-only paths are recorded in `/.deleted` on the
//! writable layer so they survive remounts.
//!
//! The overlay's internal bookkeeping is not synchronized against
//! concurrent entry; wrap it in `LockedFs` when shared across tasks.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use strata_core::error::{err, Errno, FsError, FsResult};
use strata_core::path as vpath;
use strata_core::stats::S_IFMT;
use strata_core::{Cred, File, FileSystem, FsMetadata, OpenFlag, Stats};

use crate::vfs::{read_all_on, write_all_on};

/// Reserved path of the deletion log on the writable layer.
pub const DELETION_LOG: &str = "/.deleted";

/// Write bits forced onto stats projected from the read-only base.
const COPY_UP_WRITE_BITS: u32 = 0o222;

#[derive(Default)]
struct FlushState {
    in_flight: bool,
    dirty: bool,
}

struct Inner {
    writable: Arc<dyn FileSystem>,
    readable: Arc<dyn FileSystem>,
    deleted: RwLock<HashSet<String>>,
    flush: Mutex<FlushState>,
    latched: Mutex<Option<FsError>>,
}

/// Writable-over-readable composition with a durable deletion log.
pub struct OverlayFs {
    inner: Arc<Inner>,
}

impl Clone for OverlayFs {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl OverlayFs {
    /// Composes `writable` over `readable`. Call `ready()` before use to
    /// recover the deletion log.
    pub fn new(writable: Arc<dyn FileSystem>, readable: Arc<dyn FileSystem>) -> Self {
        Self {
            inner: Arc::new(Inner {
                writable,
                readable,
                deleted: RwLock::new(HashSet::new()),
                flush: Mutex::new(FlushState::default()),
                latched: Mutex::new(None),
            }),
        }
    }

    fn writable(&self) -> &Arc<dyn FileSystem> {
        &self.inner.writable
    }

    fn readable(&self) -> &Arc<dyn FileSystem> {
        &self.inner.readable
    }

    /// Surfaces a latched background failure exactly once.
    fn check_latched(&self) -> FsResult<()> {
        match self.inner.latched.lock().take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn guard_path(path: &str) -> FsResult<()> {
        if path == DELETION_LOG {
            return Err(err(Errno::EPERM, path));
        }
        Ok(())
    }

    fn is_deleted(&self, path: &str) -> bool {
        self.inner.deleted.read().contains(path)
    }

    fn mark_deleted(&self, path: &str) {
        self.inner.deleted.write().insert(path.to_string());
        self.flush_log();
    }

    fn unmark_deleted(&self, path: &str) {
        if self.inner.deleted.write().remove(path) {
            self.flush_log();
        }
    }

    /// Persists the deletion log to the writable layer.
    ///
    /// At most one flush runs at a time; deletions arriving while one is
    /// in flight set the dirty flag and trigger a re-flush. A failed
    /// flush latches its error for the next user-visible operation.
    fn flush_log(&self) {
        {
            let mut state = self.inner.flush.lock();
            if state.in_flight {
                state.dirty = true;
                return;
            }
            state.in_flight = true;
        }
        loop {
            self.inner.flush.lock().dirty = false;

            let mut lines: Vec<String> = self
                .inner
                .deleted
                .read()
                .iter()
                .map(|p| format!("d{p}"))
                .collect();
            lines.sort_unstable();
            let mut text = lines.join("\n");
            if !text.is_empty() {
                text.push('\n');
            }

            if let Err(e) = write_all_on(
                self.writable(),
                DELETION_LOG,
                text.as_bytes(),
                0o644,
                &Cred::ROOT,
            ) {
                warn!(error = %e, "deletion log flush failed");
                *self.inner.latched.lock() = Some(e);
                self.inner.flush.lock().in_flight = false;
                return;
            }

            let mut state = self.inner.flush.lock();
            if !state.dirty {
                state.in_flight = false;
                return;
            }
        }
    }

    /// True when `path` is visible through the overlay.
    fn visible(&self, path: &str, cred: &Cred) -> bool {
        if self.writable().exists(path, cred) {
            return true;
        }
        !self.is_deleted(path) && self.readable().exists(path, cred)
    }

    /// Creates every missing ancestor of `path` on the writable layer,
    /// copying directory modes from the base where it has them.
    fn ensure_parents(&self, path: &str, cred: &Cred) -> FsResult<()> {
        let mut ancestors = Vec::new();
        let mut current = vpath::dirname(path).to_string();
        while current != "/" {
            ancestors.push(current.clone());
            current = vpath::dirname(&current).to_string();
        }
        for ancestor in ancestors.into_iter().rev() {
            if self.writable().exists(&ancestor, cred) {
                continue;
            }
            let mode = self
                .readable()
                .stat(&ancestor, cred)
                .map(|s| s.mode & !S_IFMT)
                .unwrap_or(0o755);
            self.writable().mkdir(&ancestor, mode, cred)?;
        }
        Ok(())
    }

    /// Ensures `path` exists on the writable layer, copying it (and, for
    /// directories, its visible children) up from the base.
    fn materialize(&self, path: &str, cred: &Cred) -> FsResult<()> {
        if self.writable().exists(path, cred) {
            return Ok(());
        }
        let stats = self.readable().stat(path, cred)?;
        self.ensure_parents(path, cred)?;
        if stats.is_directory() {
            self.writable().mkdir(path, stats.mode & !S_IFMT, cred)?;
            for name in self.readable().readdir(path, cred)? {
                let child = vpath::join(path, &name);
                if !self.is_deleted(&child) {
                    self.materialize(&child, cred)?;
                }
            }
            Ok(())
        } else {
            debug!(path = %path, "copying file up to writable layer");
            let data = read_all_on(self.readable(), path, cred)?;
            let mut stats = stats;
            stats.mode |= COPY_UP_WRITE_BITS;
            write_all_on(self.writable(), path, &data, stats.mode & !S_IFMT, cred)?;
            self.writable().sync(path, &data, &stats)
        }
    }
}

impl FileSystem for OverlayFs {
    /// Readies both layers and recovers the deletion log: each line of
    /// `/.deleted` beginning with `d` names a hidden path; other lines
    /// are ignored.
    fn ready(&self) -> FsResult<()> {
        self.writable().ready()?;
        self.readable().ready()?;
        if self.writable().exists(DELETION_LOG, &Cred::ROOT) {
            let raw = read_all_on(self.writable(), DELETION_LOG, &Cred::ROOT)?;
            let text = String::from_utf8_lossy(&raw);
            let mut deleted = self.inner.deleted.write();
            for line in text.lines() {
                if let Some(path) = line.strip_prefix('d') {
                    deleted.insert(path.to_string());
                }
            }
            debug!(hidden = deleted.len(), "recovered deletion log");
        }
        Ok(())
    }

    fn metadata(&self) -> FsMetadata {
        FsMetadata::new("overlay")
    }

    fn rename(&self, old: &str, new: &str, cred: &Cred) -> FsResult<()> {
        self.check_latched()?;
        let old = vpath::normalize(old);
        let new = vpath::normalize(new);
        Self::guard_path(&old)?;
        Self::guard_path(&new)?;
        if !self.visible(&old, cred) {
            return Err(err(Errno::ENOENT, &old).syscall("rename"));
        }
        self.materialize(&old, cred)?;
        self.ensure_parents(&new, cred)?;
        self.writable().rename(&old, &new, cred)?;
        if self.readable().exists(&old, cred) {
            self.mark_deleted(&old);
        }
        self.unmark_deleted(&new);
        Ok(())
    }

    fn stat(&self, path: &str, cred: &Cred) -> FsResult<Stats> {
        self.check_latched()?;
        let path = vpath::normalize(path);
        Self::guard_path(&path)?;
        if self.writable().exists(&path, cred) {
            return self.writable().stat(&path, cred);
        }
        if self.is_deleted(&path) {
            return Err(err(Errno::ENOENT, &path).syscall("stat"));
        }
        let mut stats = self.readable().stat(&path, cred)?;
        stats.mode |= COPY_UP_WRITE_BITS;
        Ok(stats)
    }

    fn open_file(&self, path: &str, flag: OpenFlag, cred: &Cred) -> FsResult<Box<dyn File>> {
        self.check_latched()?;
        let path = vpath::normalize(path);
        Self::guard_path(&path)?;
        if self.writable().exists(&path, cred) {
            return self.writable().open_file(&path, flag, cred);
        }
        if self.is_deleted(&path) || !self.readable().exists(&path, cred) {
            if flag.create {
                return self.create_file(&path, flag, 0o644, cred);
            }
            return Err(err(Errno::ENOENT, &path).syscall("open"));
        }
        if flag.exclusive {
            return Err(err(Errno::EEXIST, &path).syscall("open"));
        }

        // Base-only file: serve from memory and copy up on first sync.
        let mut stats = self.readable().stat(&path, cred)?;
        stats.mode |= COPY_UP_WRITE_BITS;
        let buf = if flag.truncate {
            Vec::new()
        } else {
            read_all_on(self.readable(), &path, cred)?
        };
        stats.size = buf.len() as u64;
        Ok(Box::new(CowFile {
            overlay: self.clone(),
            cred: *cred,
            path,
            stats,
            buf,
            pos: 0,
            flag,
            dirty: flag.truncate,
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
        let path = vpath::normalize(path);
        Self::guard_path(&path)?;
        if self.visible(&path, cred) {
            return Err(err(Errno::EEXIST, &path).syscall("create"));
        }
        self.ensure_parents(&path, cred)?;
        let file = self.writable().create_file(&path, flag, mode, cred)?;
        self.unmark_deleted(&path);
        Ok(file)
    }

    fn unlink(&self, path: &str, cred: &Cred) -> FsResult<()> {
        self.check_latched()?;
        let path = vpath::normalize(path);
        Self::guard_path(&path)?;
        let mut removed = false;
        if self.writable().exists(&path, cred) {
            self.writable().unlink(&path, cred)?;
            removed = true;
        }
        if !self.is_deleted(&path) {
            if let Ok(stats) = self.readable().stat(&path, cred) {
                if stats.is_directory() {
                    return Err(err(Errno::EISDIR, &path).syscall("unlink"));
                }
                self.mark_deleted(&path);
                removed = true;
            }
        }
        if !removed {
            return Err(err(Errno::ENOENT, &path).syscall("unlink"));
        }
        Ok(())
    }

    fn rmdir(&self, path: &str, cred: &Cred) -> FsResult<()> {
        self.check_latched()?;
        let path = vpath::normalize(path);
        Self::guard_path(&path)?;
        let stats = self.stat(&path, cred)?;
        if !stats.is_directory() {
            return Err(err(Errno::ENOTDIR, &path).syscall("rmdir"));
        }
        if !self.readdir(&path, cred)?.is_empty() {
            return Err(err(Errno::ENOTEMPTY, &path).syscall("rmdir"));
        }
        if self.writable().exists(&path, cred) {
            self.writable().rmdir(&path, cred)?;
        }
        if !self.is_deleted(&path) && self.readable().exists(&path, cred) {
            self.mark_deleted(&path);
        }
        Ok(())
    }

    fn mkdir(&self, path: &str, mode: u32, cred: &Cred) -> FsResult<()> {
        self.check_latched()?;
        let path = vpath::normalize(path);
        Self::guard_path(&path)?;
        if self.visible(&path, cred) {
            return Err(err(Errno::EEXIST, &path).syscall("mkdir"));
        }
        self.ensure_parents(&path, cred)?;
        self.writable().mkdir(&path, mode, cred)?;
        self.unmark_deleted(&path);
        Ok(())
    }

    /// Union of both layers: writable entries first, base entries after,
    /// first occurrence winning, hidden and reserved names filtered out.
    fn readdir(&self, path: &str, cred: &Cred) -> FsResult<Vec<String>> {
        self.check_latched()?;
        let path = vpath::normalize(path);
        Self::guard_path(&path)?;
        let stats = self.stat(&path, cred)?;
        if !stats.is_directory() {
            return Err(err(Errno::ENOTDIR, &path).syscall("readdir"));
        }

        let mut names: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut push = |name: String, overlay: &Self| {
            let full = vpath::join(&path, &name);
            if full == DELETION_LOG || overlay.is_deleted(&full) {
                return;
            }
            if seen.insert(name.clone()) {
                names.push(name);
            }
        };

        if self.writable().exists(&path, cred) {
            for name in self.writable().readdir(&path, cred)? {
                push(name, self);
            }
        }
        if !self.is_deleted(&path) && self.readable().exists(&path, cred) {
            for name in self.readable().readdir(&path, cred)? {
                push(name, self);
            }
        }
        Ok(names)
    }

    fn link(&self, src: &str, dst: &str, cred: &Cred) -> FsResult<()> {
        self.check_latched()?;
        let src = vpath::normalize(src);
        let dst = vpath::normalize(dst);
        Self::guard_path(&src)?;
        Self::guard_path(&dst)?;
        if !self.visible(&src, cred) {
            return Err(err(Errno::ENOENT, &src).syscall("link"));
        }
        self.materialize(&src, cred)?;
        self.ensure_parents(&dst, cred)?;
        self.writable().link(&src, &dst, cred)?;
        self.unmark_deleted(&dst);
        Ok(())
    }

    fn sync(&self, path: &str, data: &[u8], stats: &Stats) -> FsResult<()> {
        self.check_latched()?;
        let path = vpath::normalize(path);
        Self::guard_path(&path)?;
        if !self.writable().exists(&path, &Cred::ROOT) {
            self.ensure_parents(&path, &Cred::ROOT)?;
            write_all_on(self.writable(), &path, data, stats.mode & !S_IFMT, &Cred::ROOT)?;
        }
        self.unmark_deleted(&path);
        self.writable().sync(&path, data, stats)
    }

    fn exists(&self, path: &str, cred: &Cred) -> bool {
        self.stat(path, cred).is_ok()
    }
}

/// In-memory handle for a base-only file; the contents copy up to the
/// writable layer on the first sync.
struct CowFile {
    overlay: OverlayFs,
    cred: Cred,
    path: String,
    stats: Stats,
    buf: Vec<u8>,
    pos: u64,
    flag: OpenFlag,
    dirty: bool,
    closed: bool,
}

impl CowFile {
    fn check_open(&self) -> FsResult<()> {
        if self.closed {
            return Err(err(Errno::EBADF, &self.path));
        }
        Ok(())
    }

    fn flush(&mut self) -> FsResult<()> {
        if self.dirty {
            self.stats.size = self.buf.len() as u64;
            self.overlay.ensure_parents(&self.path, &self.cred)?;
            write_all_on(
                self.overlay.writable(),
                &self.path,
                &self.buf,
                self.stats.mode & !S_IFMT,
                &self.cred,
            )?;
            self.overlay.writable().sync(&self.path, &self.buf, &self.stats)?;
            self.overlay.unmark_deleted(&self.path);
            self.dirty = false;
        }
        Ok(())
    }
}

impl File for CowFile {
    fn read(&mut self, buf: &mut [u8], position: Option<u64>) -> FsResult<usize> {
        self.check_open()?;
        if !self.flag.read {
            return Err(err(Errno::EBADF, &self.path).syscall("read"));
        }
        let start = position.unwrap_or(self.pos) as usize;
        if start >= self.buf.len() {
            return Ok(0);
        }
        let n = buf.len().min(self.buf.len() - start);
        buf[..n].copy_from_slice(&self.buf[start..start + n]);
        if position.is_none() {
            self.pos = (start + n) as u64;
        }
        Ok(n)
    }

    fn write(&mut self, buf: &[u8], position: Option<u64>) -> FsResult<usize> {
        self.check_open()?;
        if !self.flag.write {
            return Err(err(Errno::EBADF, &self.path).syscall("write"));
        }
        let start = if self.flag.append {
            self.buf.len()
        } else {
            position.unwrap_or(self.pos) as usize
        };
        let end = start + buf.len();
        if self.buf.len() < end {
            self.buf.resize(end, 0);
        }
        self.buf[start..end].copy_from_slice(buf);
        if position.is_none() || self.flag.append {
            self.pos = end as u64;
        }
        self.stats.size = self.buf.len() as u64;
        self.stats.touch();
        self.dirty = true;
        Ok(buf.len())
    }

    fn stat(&self) -> FsResult<Stats> {
        self.check_open()?;
        Ok(self.stats)
    }

    fn truncate(&mut self, len: u64) -> FsResult<()> {
        self.check_open()?;
        if !self.flag.write {
            return Err(err(Errno::EBADF, &self.path).syscall("ftruncate"));
        }
        self.buf.resize(len as usize, 0);
        self.stats.size = len;
        self.stats.touch();
        self.dirty = true;
        Ok(())
    }

    fn chmod(&mut self, mode: u32) -> FsResult<()> {
        self.check_open()?;
        self.stats.mode = (self.stats.mode & S_IFMT) | (mode & !S_IFMT);
        self.stats.touch();
        self.dirty = true;
        Ok(())
    }

    fn chown(&mut self, uid: u32, gid: u32) -> FsResult<()> {
        self.check_open()?;
        self.stats.uid = uid;
        self.stats.gid = gid;
        self.stats.touch();
        self.dirty = true;
        Ok(())
    }

    fn sync(&mut self) -> FsResult<()> {
        self.check_open()?;
        self.flush()
    }

    fn close(&mut self) -> FsResult<()> {
        if self.closed {
            return Ok(());
        }
        self.flush()?;
        self.closed = true;
        Ok(())
    }
}

impl Drop for CowFile {
    fn drop(&mut self) {
        if !self.closed && self.dirty {
            let _ = self.flush();
        }
    }
}
