//! The filesystem and file-handle contracts every backend implements.
//!
//! Both contracts come in a synchronous and an asynchronous form. The
//! synchronous form is the primary one: composers and the mount router
//! operate on `dyn FileSystem`. Inherently asynchronous backends
//! implement `AsyncFileSystem` and are adapted to the synchronous
//! contract by the bridge in `strata-vfs`.
//!
//! All trait methods take `&self`; implementations use interior
//! mutability and must be safe to share across tasks.

use async_trait::async_trait;

use crate::error::{Errno, FsError, FsResult};
use crate::stats::Stats;
use crate::{Cred, FS_TYPE};

/// Parsed open flags.
///
/// String forms follow the usual `"r" | "r+" | "w" | "w+" | "a" | "a+"`
/// convention, with an optional `x` suffix for exclusive creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpenFlag {
    /// Open for reading.
    pub read: bool,
    /// Open for writing.
    pub write: bool,
    /// Create the file when missing.
    pub create: bool,
    /// Truncate existing contents.
    pub truncate: bool,
    /// All writes go to the end of the file.
    pub append: bool,
    /// Fail with `EEXIST` when the file already exists.
    pub exclusive: bool,
}

impl OpenFlag {
    /// Read-only open.
    pub const READ: OpenFlag = OpenFlag {
        read: true,
        write: false,
        create: false,
        truncate: false,
        append: false,
        exclusive: false,
    };

    /// Write-only open, creating and truncating.
    pub const WRITE: OpenFlag = OpenFlag {
        read: false,
        write: true,
        create: true,
        truncate: true,
        append: false,
        exclusive: false,
    };

    /// Parses a string flag.
    pub fn parse(flag: &str) -> FsResult<Self> {
        let mut chars = flag.chars();
        let mut out = match chars.next() {
            Some('r') => OpenFlag {
                read: true,
                ..Default::default()
            },
            Some('w') => OpenFlag::WRITE,
            Some('a') => OpenFlag {
                write: true,
                create: true,
                append: true,
                ..Default::default()
            },
            _ => {
                return Err(FsError::with_message(
                    Errno::EINVAL,
                    format!("invalid flag string '{flag}'"),
                ))
            }
        };
        let (mut plus, mut excl) = (false, false);
        for c in chars {
            match c {
                '+' if !plus => {
                    plus = true;
                    out.read = true;
                    out.write = true;
                }
                'x' if !excl => {
                    excl = true;
                    out.exclusive = true;
                }
                _ => {
                    return Err(FsError::with_message(
                        Errno::EINVAL,
                        format!("invalid flag string '{flag}'"),
                    ))
                }
            }
        }
        Ok(out)
    }
}

/// Metadata reported by `FileSystem::metadata`.
#[derive(Debug, Clone)]
pub struct FsMetadata {
    /// Backend name.
    pub name: String,
    /// True when every mutator fails with `EROFS`.
    pub readonly: bool,
    /// Total space in bytes; zero when not meaningful.
    pub total_space: u64,
    /// Free space in bytes; zero when not meaningful.
    pub free_space: u64,
    /// Preferred I/O block size.
    pub block_size: u32,
    /// Total inode slots; zero when unbounded.
    pub total_nodes: u64,
    /// Free inode slots; zero when unbounded.
    pub free_nodes: u64,
    /// Filesystem type constant.
    pub fs_type: u64,
    /// True when the async cache/bridge is disabled for this filesystem.
    pub no_async_cache: bool,
}

impl FsMetadata {
    /// Creates metadata with defaults for the given backend name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            readonly: false,
            total_space: 0,
            free_space: 0,
            block_size: crate::BLOCK_SIZE,
            total_nodes: 0,
            free_nodes: 0,
            fs_type: FS_TYPE,
            no_async_cache: false,
        }
    }
}

/// An open file handle.
///
/// Handles buffer in memory between explicit syncs; `close` flushes
/// pending data. A handle must not outlive its filesystem's unmount.
pub trait File: Send + Sync {
    /// Reads into `buf` from `position`, or from the cursor (advancing
    /// it) when `position` is `None`. Returns the bytes read.
    fn read(&mut self, buf: &mut [u8], position: Option<u64>) -> FsResult<usize>;

    /// Writes `buf` at `position`, or at the cursor (advancing it) when
    /// `position` is `None`. Returns the bytes written.
    fn write(&mut self, buf: &[u8], position: Option<u64>) -> FsResult<usize>;

    /// Current stats for the open file.
    fn stat(&self) -> FsResult<Stats>;

    /// Truncates or extends the buffered contents to `len`.
    fn truncate(&mut self, len: u64) -> FsResult<()>;

    /// Updates permission bits.
    fn chmod(&mut self, mode: u32) -> FsResult<()>;

    /// Updates ownership.
    fn chown(&mut self, uid: u32, gid: u32) -> FsResult<()>;

    /// Flushes buffered data and stats to the filesystem.
    fn sync(&mut self) -> FsResult<()>;

    /// Flushes and invalidates the handle.
    fn close(&mut self) -> FsResult<()>;
}

/// The synchronous filesystem contract.
pub trait FileSystem: Send + Sync {
    /// Completes initialization; must be called before other operations.
    fn ready(&self) -> FsResult<()> {
        Ok(())
    }

    /// Reports backend metadata.
    fn metadata(&self) -> FsMetadata;

    /// Moves `old` to `new`.
    fn rename(&self, old: &str, new: &str, cred: &Cred) -> FsResult<()>;

    /// Stats the node at `path` without following symlinks.
    fn stat(&self, path: &str, cred: &Cred) -> FsResult<Stats>;

    /// Opens the file at `path`.
    fn open_file(&self, path: &str, flag: OpenFlag, cred: &Cred) -> FsResult<Box<dyn File>>;

    /// Creates the file at `path` and opens it.
    fn create_file(
        &self,
        path: &str,
        flag: OpenFlag,
        mode: u32,
        cred: &Cred,
    ) -> FsResult<Box<dyn File>>;

    /// Removes the file at `path`.
    fn unlink(&self, path: &str, cred: &Cred) -> FsResult<()>;

    /// Removes the empty directory at `path`.
    fn rmdir(&self, path: &str, cred: &Cred) -> FsResult<()>;

    /// Creates a directory at `path`.
    fn mkdir(&self, path: &str, mode: u32, cred: &Cred) -> FsResult<()>;

    /// Lists the names in the directory at `path`.
    fn readdir(&self, path: &str, cred: &Cred) -> FsResult<Vec<String>>;

    /// Creates a new directory entry `dst` for the inode at `src`.
    fn link(&self, src: &str, dst: &str, cred: &Cred) -> FsResult<()>;

    /// Persists `data` and `stats` for the file at `path`.
    fn sync(&self, path: &str, data: &[u8], stats: &Stats) -> FsResult<()>;

    /// Returns true when `path` exists and is accessible.
    fn exists(&self, path: &str, cred: &Cred) -> bool {
        self.stat(path, cred).is_ok()
    }
}

/// An open file handle on an asynchronous backend.
#[async_trait]
pub trait AsyncFile: Send {
    /// See [`File::read`].
    async fn read(&mut self, buf: &mut [u8], position: Option<u64>) -> FsResult<usize>;

    /// See [`File::write`].
    async fn write(&mut self, buf: &[u8], position: Option<u64>) -> FsResult<usize>;

    /// See [`File::stat`].
    async fn stat(&self) -> FsResult<Stats>;

    /// See [`File::sync`].
    async fn sync(&mut self) -> FsResult<()>;

    /// See [`File::close`].
    async fn close(&mut self) -> FsResult<()>;
}

/// The asynchronous filesystem contract, mirroring [`FileSystem`].
#[async_trait]
pub trait AsyncFileSystem: Send + Sync {
    /// Completes initialization; must be called before other operations.
    async fn ready(&self) -> FsResult<()> {
        Ok(())
    }

    /// Reports backend metadata.
    fn metadata(&self) -> FsMetadata;

    /// See [`FileSystem::rename`].
    async fn rename(&self, old: &str, new: &str, cred: &Cred) -> FsResult<()>;

    /// See [`FileSystem::stat`].
    async fn stat(&self, path: &str, cred: &Cred) -> FsResult<Stats>;

    /// See [`FileSystem::open_file`].
    async fn open_file(
        &self,
        path: &str,
        flag: OpenFlag,
        cred: &Cred,
    ) -> FsResult<Box<dyn AsyncFile>>;

    /// See [`FileSystem::create_file`].
    async fn create_file(
        &self,
        path: &str,
        flag: OpenFlag,
        mode: u32,
        cred: &Cred,
    ) -> FsResult<Box<dyn AsyncFile>>;

    /// See [`FileSystem::unlink`].
    async fn unlink(&self, path: &str, cred: &Cred) -> FsResult<()>;

    /// See [`FileSystem::rmdir`].
    async fn rmdir(&self, path: &str, cred: &Cred) -> FsResult<()>;

    /// See [`FileSystem::mkdir`].
    async fn mkdir(&self, path: &str, mode: u32, cred: &Cred) -> FsResult<()>;

    /// See [`FileSystem::readdir`].
    async fn readdir(&self, path: &str, cred: &Cred) -> FsResult<Vec<String>>;

    /// See [`FileSystem::link`].
    async fn link(&self, src: &str, dst: &str, cred: &Cred) -> FsResult<()>;

    /// See [`FileSystem::sync`].
    async fn sync(&self, path: &str, data: &[u8], stats: &Stats) -> FsResult<()>;

    /// See [`FileSystem::exists`].
    async fn exists(&self, path: &str, cred: &Cred) -> bool {
        self.stat(path, cred).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_flags() {
        let r = OpenFlag::parse("r").unwrap();
        assert!(r.read && !r.write && !r.create);

        let rp = OpenFlag::parse("r+").unwrap();
        assert!(rp.read && rp.write && !rp.truncate);

        let w = OpenFlag::parse("w").unwrap();
        assert!(w.write && w.create && w.truncate && !w.read);

        let wp = OpenFlag::parse("w+").unwrap();
        assert!(wp.read && wp.write && wp.truncate);

        let a = OpenFlag::parse("a").unwrap();
        assert!(a.write && a.create && a.append && !a.truncate);

        let ap = OpenFlag::parse("a+").unwrap();
        assert!(ap.read && ap.write && ap.append);
    }

    #[test]
    fn test_parse_exclusive() {
        let wx = OpenFlag::parse("wx").unwrap();
        assert!(wx.exclusive && wx.create);

        let axp = OpenFlag::parse("ax+").unwrap();
        assert!(axp.exclusive && axp.append && axp.read);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(OpenFlag::parse("").is_err());
        assert!(OpenFlag::parse("z").is_err());
        assert!(OpenFlag::parse("rw").is_err());
        assert!(OpenFlag::parse("r++").is_err());
    }
}
