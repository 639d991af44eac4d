//! The top-level router: mount lifecycle plus credential-checked
//! dispatch of the file API to the owning mount.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use strata_core::error::{Errno, FsResult};
use strata_core::path as vpath;
use strata_core::{Cred, File, FileSystem, OpenFlag, Stats};

use crate::mount::MountTable;

/// Router over a process-wide mount table.
///
/// Operations take absolute paths, resolve the owning mount, and forward
/// with the process credentials established by `configure`. Tests
/// construct fresh instances rather than sharing global state.
pub struct Vfs {
    mounts: RwLock<MountTable>,
    cred: RwLock<Cred>,
    disable_async_cache: RwLock<bool>,
}

impl Vfs {
    /// Creates a router with no mounts and root credentials.
    pub fn new() -> Self {
        Self {
            mounts: RwLock::new(MountTable::new()),
            cred: RwLock::new(Cred::ROOT),
            disable_async_cache: RwLock::new(false),
        }
    }

    /// The process credentials used for permission checks.
    pub fn cred(&self) -> Cred {
        *self.cred.read()
    }

    /// Replaces the process credentials.
    pub fn set_cred(&self, cred: Cred) {
        *self.cred.write() = cred;
    }

    /// True when async-backend mirroring is disabled for this process.
    pub fn async_cache_disabled(&self) -> bool {
        *self.disable_async_cache.read()
    }

    pub(crate) fn set_async_cache_disabled(&self, disabled: bool) {
        *self.disable_async_cache.write() = disabled;
    }

    /// Binds `fs` at `prefix`.
    pub fn mount(&self, prefix: &str, fs: Arc<dyn FileSystem>) -> FsResult<()> {
        self.mounts.write().mount(prefix, fs)?;
        info!(prefix = prefix, "mounted filesystem");
        Ok(())
    }

    /// Removes the mount at `prefix`.
    pub fn umount(&self, prefix: &str) -> FsResult<()> {
        self.mounts.write().umount(prefix)?;
        info!(prefix = prefix, "unmounted filesystem");
        Ok(())
    }

    /// Resolves `path` to its owning filesystem and mount-relative path.
    pub fn resolve(&self, path: &str) -> FsResult<(Arc<dyn FileSystem>, String)> {
        self.mounts.read().resolve(path)
    }

    /// All mounted prefixes.
    pub fn prefixes(&self) -> Vec<String> {
        self.mounts.read().prefixes()
    }

    /// Stats the node at `path`.
    pub fn stat(&self, path: &str) -> FsResult<Stats> {
        let (fs, rel) = self.resolve(path)?;
        fs.stat(&rel, &self.cred())
    }

    /// Returns true when `path` exists.
    pub fn exists(&self, path: &str) -> bool {
        self.stat(path).is_ok()
    }

    /// Opens the file at `path` with a string flag (`"r"`, `"w"`, ...).
    pub fn open_file(&self, path: &str, flag: &str) -> FsResult<Box<dyn File>> {
        let flag = OpenFlag::parse(flag)?;
        let (fs, rel) = self.resolve(path)?;
        fs.open_file(&rel, flag, &self.cred())
    }

    /// Creates the file at `path`.
    pub fn create_file(&self, path: &str, flag: &str, mode: u32) -> FsResult<Box<dyn File>> {
        let flag = OpenFlag::parse(flag)?;
        let (fs, rel) = self.resolve(path)?;
        fs.create_file(&rel, flag, mode, &self.cred())
    }

    /// Creates a directory at `path`.
    pub fn mkdir(&self, path: &str, mode: u32) -> FsResult<()> {
        let (fs, rel) = self.resolve(path)?;
        fs.mkdir(&rel, mode, &self.cred())
    }

    /// Removes the file at `path`.
    pub fn unlink(&self, path: &str) -> FsResult<()> {
        let (fs, rel) = self.resolve(path)?;
        fs.unlink(&rel, &self.cred())
    }

    /// Removes the empty directory at `path`.
    pub fn rmdir(&self, path: &str) -> FsResult<()> {
        let (fs, rel) = self.resolve(path)?;
        fs.rmdir(&rel, &self.cred())
    }

    /// Lists the directory at `path`, including the names of mounts
    /// bound directly beneath it.
    pub fn readdir(&self, path: &str) -> FsResult<Vec<String>> {
        let path = vpath::normalize(path);
        let (fs, rel) = self.resolve(&path)?;
        let mut names = fs.readdir(&rel, &self.cred())?;
        for prefix in self.prefixes() {
            if prefix == path {
                continue;
            }
            if vpath::dirname(&prefix) == path {
                let name = vpath::basename(&prefix).to_string();
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        Ok(names)
    }

    /// Creates a new directory entry `dst` for the inode at `src`.
    ///
    /// Same-filesystem linking is not enforced: both relative paths are
    /// forwarded to the source's mount.
    pub fn link(&self, src: &str, dst: &str) -> FsResult<()> {
        let (fs, src_rel) = self.resolve(src)?;
        let (_, dst_rel) = self.resolve(dst)?;
        fs.link(&src_rel, &dst_rel, &self.cred())
    }

    /// Moves `old` to `new`.
    ///
    /// Within one mount this is the backend's atomic rename. Across
    /// mounts the tree is copied through the router (so entries spanning
    /// nested mounts participate) and the source is then removed,
    /// best-effort: a mid-way failure leaves the partial destination in
    /// place and surfaces the original error.
    pub fn rename(&self, old: &str, new: &str) -> FsResult<()> {
        let cred = self.cred();
        let (src_fs, src_rel) = self.resolve(old)?;
        let (dst_fs, dst_rel) = self.resolve(new)?;
        if Arc::ptr_eq(&src_fs, &dst_fs) {
            return src_fs.rename(&src_rel, &dst_rel, &cred);
        }
        debug!(old = old, new = new, "cross-mount rename");
        self.copy_tree(old, new)?;
        self.remove_tree(old)
    }

    fn copy_tree(&self, src: &str, dst: &str) -> FsResult<()> {
        let stats = self.stat(src)?;
        if stats.is_directory() {
            if !self.exists(dst) {
                self.mkdir(dst, stats.mode & 0o7777)?;
            }
            for name in self.readdir(src)? {
                self.copy_tree(&vpath::join(src, &name), &vpath::join(dst, &name))?;
            }
            Ok(())
        } else {
            let data = self.read_file(src)?;
            let (fs, rel) = self.resolve(dst)?;
            write_all_on(&fs, &rel, &data, stats.mode & 0o7777, &self.cred())
        }
    }

    fn remove_tree(&self, path: &str) -> FsResult<()> {
        let stats = self.stat(path)?;
        if stats.is_directory() {
            for name in self.readdir(path)? {
                self.remove_tree(&vpath::join(path, &name))?;
            }
            self.rmdir(path)
        } else {
            self.unlink(path)
        }
    }

    /// Reads the whole file at `path`.
    pub fn read_file(&self, path: &str) -> FsResult<Vec<u8>> {
        let (fs, rel) = self.resolve(path)?;
        read_all_on(&fs, &rel, &self.cred())
    }

    /// Writes `data` to the file at `path`, creating or truncating it.
    pub fn write_file(&self, path: &str, data: &[u8]) -> FsResult<()> {
        let (fs, rel) = self.resolve(path)?;
        write_all_on(&fs, &rel, data, 0o644, &self.cred())
    }
}

impl Default for Vfs {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads the full contents of `path` on `fs`.
pub(crate) fn read_all_on(
    fs: &Arc<dyn FileSystem>,
    path: &str,
    cred: &Cred,
) -> FsResult<Vec<u8>> {
    let mut file = fs.open_file(path, OpenFlag::READ, cred)?;
    let size = file.stat()?.size as usize;
    let mut buf = vec![0; size];
    let mut read = 0;
    while read < size {
        let n = file.read(&mut buf[read..], None)?;
        if n == 0 {
            break;
        }
        read += n;
    }
    buf.truncate(read);
    file.close()?;
    Ok(buf)
}

/// Writes `data` to `path` on `fs`, creating the file with `mode` when
/// missing and truncating it otherwise.
pub(crate) fn write_all_on(
    fs: &Arc<dyn FileSystem>,
    path: &str,
    data: &[u8],
    mode: u32,
    cred: &Cred,
) -> FsResult<()> {
    let mut file = match fs.create_file(path, OpenFlag::WRITE, mode, cred) {
        Ok(file) => file,
        Err(e) if e.is(Errno::EEXIST) => fs.open_file(path, OpenFlag::WRITE, cred)?,
        Err(e) => return Err(e),
    };
    if !data.is_empty() {
        file.write(data, Some(0))?;
    }
    file.close()
}
