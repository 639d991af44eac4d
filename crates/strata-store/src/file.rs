//! Buffering file handle for `StoreFs`.
//!
//! The handle owns a byte buffer; reads and writes operate on it and the
//! data blob is only persisted on `sync`/`close`, each in one store
//! transaction.

use strata_core::error::{err, Errno};
use strata_core::stats::S_IFMT;
use strata_core::{File, FileSystem, FsResult, OpenFlag, Stats};

use crate::fs::StoreFs;
use crate::store::Store;

pub(crate) struct StoreFile<S: Store> {
    fs: StoreFs<S>,
    path: String,
    stats: Stats,
    buf: Vec<u8>,
    pos: u64,
    flag: OpenFlag,
    dirty: bool,
    closed: bool,
}

impl<S: Store> StoreFile<S> {
    pub(crate) fn new(
        fs: StoreFs<S>,
        path: String,
        stats: Stats,
        buf: Vec<u8>,
        flag: OpenFlag,
        dirty: bool,
    ) -> Self {
        let pos = if flag.append { buf.len() as u64 } else { 0 };
        Self {
            fs,
            path,
            stats,
            buf,
            pos,
            flag,
            dirty,
            closed: false,
        }
    }

    fn check_open(&self) -> FsResult<()> {
        if self.closed {
            return Err(err(Errno::EBADF, &self.path));
        }
        Ok(())
    }

    fn flush(&mut self) -> FsResult<()> {
        if self.dirty {
            self.stats.size = self.buf.len() as u64;
            self.fs.sync(&self.path, &self.buf, &self.stats)?;
            self.dirty = false;
        }
        Ok(())
    }
}

impl<S: Store> File for StoreFile<S> {
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

impl<S: Store> Drop for StoreFile<S> {
    fn drop(&mut self) {
        if !self.closed && self.dirty {
            let _ = self.flush();
        }
    }
}
