//! The store-backed filesystem.
//!
//! `StoreFs` reifies a POSIX-like filesystem on top of any [`Store`]:
//! paths resolve by walking directory blobs from `Ino::ROOT`, and every
//! mutation runs in a single transaction spanning all touched inodes, so
//! a failed operation leaves no partial state behind.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;

use strata_core::error::{err, Errno, FsError, FsResult};
use strata_core::path as vpath;
use strata_core::stats::{R_OK, W_OK, X_OK};
use strata_core::{
    CanonicalDecode, CanonicalEncode, Cred, File, FileSystem, FsMetadata, Ino, OpenFlag, Stats,
};

use crate::dir::{decode_dir, encode_dir, DirMap};
use crate::file::StoreFile;
use crate::inode::{data_key, meta_key, new_directory, new_file};
use crate::store::{Store, StoreError, Transaction};

/// Permission bits given to the root directory on first mount.
const ROOT_MODE: u32 = 0o777;

/// A filesystem reified on top of a byte key/value store.
pub struct StoreFs<S: Store> {
    inner: Arc<Inner<S>>,
}

struct Inner<S> {
    store: S,
    next_ino: AtomicU64,
}

impl<S: Store> Clone for StoreFs<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

fn store_err(e: StoreError) -> FsError {
    FsError::with_message(Errno::EIO, e.to_string())
}

fn corrupt(path: &str, detail: impl std::fmt::Display) -> FsError {
    FsError::with_message(Errno::EIO, format!("corrupt record: {detail}")).path(path)
}

impl<S: Store> StoreFs<S> {
    /// Creates a filesystem over `store`. Call `ready()` before use.
    pub fn new(store: S) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                next_ino: AtomicU64::new(1),
            }),
        }
    }

    /// Creates a filesystem over `store` and readies it.
    pub fn open(store: S) -> FsResult<Self> {
        let fs = Self::new(store);
        fs.ready()?;
        Ok(fs)
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.inner.store
    }

    fn alloc_ino(&self) -> Ino {
        Ino(self.inner.next_ino.fetch_add(1, Ordering::Relaxed))
    }

    fn load_stats(&self, ino: Ino, path: &str) -> FsResult<Stats> {
        let bytes = self
            .inner
            .store
            .get(meta_key(ino))
            .ok_or_else(|| err(Errno::ENOENT, path))?;
        Stats::from_bytes(&bytes).map_err(|e| corrupt(path, e))
    }

    fn load_dir(&self, ino: Ino, path: &str) -> FsResult<DirMap> {
        let bytes = self
            .inner
            .store
            .get(data_key(ino))
            .ok_or_else(|| corrupt(path, "missing directory blob"))?;
        decode_dir(&bytes).map_err(|e| corrupt(path, e))
    }

    fn tx_stats(&self, tx: &mut (dyn Transaction + '_), ino: Ino, path: &str) -> FsResult<Stats> {
        let bytes = tx
            .get(meta_key(ino))
            .ok_or_else(|| err(Errno::ENOENT, path))?;
        Stats::from_bytes(&bytes).map_err(|e| corrupt(path, e))
    }

    fn tx_dir(&self, tx: &mut (dyn Transaction + '_), ino: Ino, path: &str) -> FsResult<DirMap> {
        let bytes = tx
            .get(data_key(ino))
            .ok_or_else(|| corrupt(path, "missing directory blob"))?;
        decode_dir(&bytes).map_err(|e| corrupt(path, e))
    }

    /// Walks `path` from the root, checking search permission on every
    /// traversed directory. Symlinks are returned as-is, never followed.
    fn resolve(&self, path: &str, cred: &Cred) -> FsResult<Stats> {
        let mut current = self.load_stats(Ino::ROOT, path)?;
        for component in vpath::components(path) {
            if !current.is_directory() {
                return Err(err(Errno::ENOTDIR, path));
            }
            if !current.has_access(X_OK, cred) {
                return Err(err(Errno::EACCES, path));
            }
            let map = self.load_dir(current.ino, path)?;
            let ino = *map.get(component).ok_or_else(|| err(Errno::ENOENT, path))?;
            current = self.load_stats(ino, path)?;
        }
        Ok(current)
    }

    /// Resolves the parent directory of `path` and the final component.
    /// Fails with `EINVAL` for the root itself.
    fn parent_of(&self, path: &str, cred: &Cred) -> FsResult<(Stats, String)> {
        let name = vpath::basename(path);
        if name.is_empty() {
            return Err(err(Errno::EINVAL, path));
        }
        let parent = self.resolve(vpath::dirname(path), cred)?;
        if !parent.is_directory() {
            return Err(err(Errno::ENOTDIR, path));
        }
        Ok((parent, name.to_string()))
    }

    fn check_access(stats: &Stats, requested: u32, cred: &Cred, path: &str) -> FsResult<()> {
        if !stats.has_access(requested, cred) {
            return Err(err(Errno::EACCES, path));
        }
        Ok(())
    }

    fn write_dir(tx: &mut (dyn Transaction + '_), dir: &mut Stats, map: &DirMap) {
        let blob = encode_dir(map);
        dir.size = blob.len() as u64;
        dir.touch();
        tx.put(data_key(dir.ino), blob, true);
        tx.put(meta_key(dir.ino), dir.to_bytes(), true);
    }

    fn in_transaction<'s, T>(
        &'s self,
        body: impl FnOnce(&mut (dyn Transaction + 's)) -> FsResult<T>,
    ) -> FsResult<T> {
        let mut tx = self.inner.store.begin();
        match body(&mut *tx) {
            Ok(value) => {
                tx.commit().map_err(store_err)?;
                Ok(value)
            }
            Err(e) => {
                tx.abort();
                Err(e)
            }
        }
    }

    /// Loads the full contents of the file at `path`.
    fn load_file(&self, stats: &Stats, path: &str) -> FsResult<Vec<u8>> {
        let bytes = self
            .inner
            .store
            .get(data_key(stats.ino))
            .ok_or_else(|| corrupt(path, "missing data blob"))?;
        Ok(bytes.to_vec())
    }
}

impl<S: Store> FileSystem for StoreFs<S> {
    /// Materializes the root directory on first use and seeds the inode
    /// allocator past every inode already present in the store.
    fn ready(&self) -> FsResult<()> {
        if self.inner.store.get(meta_key(Ino::ROOT)).is_none() {
            debug!(store = self.inner.store.name(), "creating root directory");
            self.in_transaction(|tx| {
                let root = new_directory(Ino::ROOT, ROOT_MODE, &Cred::ROOT);
                tx.put(meta_key(Ino::ROOT), root.to_bytes(), false);
                tx.put(data_key(Ino::ROOT), encode_dir(&DirMap::new()), false);
                Ok(())
            })?;
        }
        let max_ino = self
            .inner
            .store
            .keys()
            .into_iter()
            .map(|key| key >> 1)
            .max()
            .unwrap_or(0);
        self.inner.next_ino.fetch_max(max_ino + 1, Ordering::Relaxed);
        Ok(())
    }

    fn metadata(&self) -> FsMetadata {
        let keys = self.inner.store.keys().len() as u64;
        let mut metadata = FsMetadata::new(self.inner.store.name());
        metadata.total_nodes = keys / 2;
        metadata
    }

    fn rename(&self, old: &str, new: &str, cred: &Cred) -> FsResult<()> {
        let old = vpath::normalize(old);
        let new = vpath::normalize(new);
        debug!(old = %old, new = %new, "rename");
        if old == new {
            return Ok(());
        }
        if new.starts_with(&format!("{old}/")) || old == "/" {
            return Err(err(Errno::EINVAL, &old).syscall("rename"));
        }

        let (old_parent, old_name) = self.parent_of(&old, cred)?;
        let (new_parent, new_name) = self.parent_of(&new, cred)?;
        Self::check_access(&old_parent, W_OK | X_OK, cred, &old)?;
        Self::check_access(&new_parent, W_OK | X_OK, cred, &new)?;

        self.in_transaction(|tx| {
            let mut old_map = self.tx_dir(tx, old_parent.ino, &old)?;
            let src_ino = *old_map
                .get(&old_name)
                .ok_or_else(|| err(Errno::ENOENT, &old).syscall("rename"))?;
            let mut src = self.tx_stats(tx, src_ino, &old)?;

            let same_parent = old_parent.ino == new_parent.ino;
            let mut new_map = if same_parent {
                DirMap::new() // unused; the old map is rewritten once
            } else {
                self.tx_dir(tx, new_parent.ino, &new)?
            };
            let target_map = if same_parent { &old_map } else { &new_map };

            if let Some(&dst_ino) = target_map.get(&new_name) {
                let dst = self.tx_stats(tx, dst_ino, &new)?;
                match (src.is_directory(), dst.is_directory()) {
                    (true, false) => return Err(err(Errno::ENOTDIR, &new).syscall("rename")),
                    (false, true) => return Err(err(Errno::EISDIR, &new).syscall("rename")),
                    (true, true) => {
                        let dst_map = self.tx_dir(tx, dst_ino, &new)?;
                        if !dst_map.is_empty() {
                            return Err(err(Errno::ENOTEMPTY, &new).syscall("rename"));
                        }
                        tx.delete(meta_key(dst_ino));
                        tx.delete(data_key(dst_ino));
                    }
                    (false, false) => {
                        tx.delete(meta_key(dst_ino));
                        tx.delete(data_key(dst_ino));
                    }
                }
            }

            src.ctime = strata_core::Timestamp::now();
            tx.put(meta_key(src_ino), src.to_bytes(), true);

            if same_parent {
                old_map.remove(&old_name);
                old_map.insert(new_name.clone(), src_ino);
                let mut parent = old_parent;
                Self::write_dir(tx, &mut parent, &old_map);
            } else {
                old_map.remove(&old_name);
                new_map.insert(new_name.clone(), src_ino);
                let mut parent = old_parent;
                Self::write_dir(tx, &mut parent, &old_map);
                let mut parent = new_parent;
                Self::write_dir(tx, &mut parent, &new_map);
            }
            Ok(())
        })
    }

    fn stat(&self, path: &str, cred: &Cred) -> FsResult<Stats> {
        let path = vpath::normalize(path);
        self.resolve(&path, cred)
    }

    fn open_file(&self, path: &str, flag: OpenFlag, cred: &Cred) -> FsResult<Box<dyn File>> {
        let path = vpath::normalize(path);
        debug!(path = %path, ?flag, "open");
        match self.resolve(&path, cred) {
            Ok(stats) => {
                if flag.exclusive {
                    return Err(err(Errno::EEXIST, &path).syscall("open"));
                }
                if stats.is_directory() {
                    return Err(err(Errno::EISDIR, &path).syscall("open"));
                }
                let mut requested = 0;
                if flag.read {
                    requested |= R_OK;
                }
                if flag.write {
                    requested |= W_OK;
                }
                Self::check_access(&stats, requested, cred, &path)?;

                let (buf, dirty) = if flag.truncate {
                    (Vec::new(), true)
                } else {
                    (self.load_file(&stats, &path)?, false)
                };
                let mut stats = stats;
                stats.size = buf.len() as u64;
                Ok(Box::new(StoreFile::new(
                    self.clone(),
                    path,
                    stats,
                    buf,
                    flag,
                    dirty,
                )))
            }
            Err(e) if e.is(Errno::ENOENT) && flag.create => {
                self.create_file(&path, flag, 0o644, cred)
            }
            Err(e) => Err(e),
        }
    }

    fn create_file(
        &self,
        path: &str,
        flag: OpenFlag,
        mode: u32,
        cred: &Cred,
    ) -> FsResult<Box<dyn File>> {
        let path = vpath::normalize(path);
        debug!(path = %path, mode = mode, "create");
        let (parent, name) = self.parent_of(&path, cred)?;
        Self::check_access(&parent, W_OK | X_OK, cred, &path)?;

        let stats = self.in_transaction(|tx| {
            let mut map = self.tx_dir(tx, parent.ino, &path)?;
            if map.contains_key(&name) {
                return Err(err(Errno::EEXIST, &path).syscall("create"));
            }
            let ino = self.alloc_ino();
            let stats = new_file(ino, mode, cred);
            tx.put(meta_key(ino), stats.to_bytes(), false);
            tx.put(data_key(ino), Bytes::new(), false);
            map.insert(name.clone(), ino);
            let mut parent = parent;
            Self::write_dir(tx, &mut parent, &map);
            Ok(stats)
        })?;

        Ok(Box::new(StoreFile::new(
            self.clone(),
            path,
            stats,
            Vec::new(),
            flag,
            false,
        )))
    }

    fn unlink(&self, path: &str, cred: &Cred) -> FsResult<()> {
        let path = vpath::normalize(path);
        debug!(path = %path, "unlink");
        if path == "/" {
            return Err(err(Errno::EISDIR, &path).syscall("unlink"));
        }
        let (parent, name) = self.parent_of(&path, cred)?;
        Self::check_access(&parent, W_OK | X_OK, cred, &path)?;

        self.in_transaction(|tx| {
            let mut map = self.tx_dir(tx, parent.ino, &path)?;
            let ino = *map
                .get(&name)
                .ok_or_else(|| err(Errno::ENOENT, &path).syscall("unlink"))?;
            let target = self.tx_stats(tx, ino, &path)?;
            if target.is_directory() {
                return Err(err(Errno::EISDIR, &path).syscall("unlink"));
            }
            map.remove(&name);
            tx.delete(meta_key(ino));
            tx.delete(data_key(ino));
            let mut parent = parent;
            Self::write_dir(tx, &mut parent, &map);
            Ok(())
        })
    }

    fn rmdir(&self, path: &str, cred: &Cred) -> FsResult<()> {
        let path = vpath::normalize(path);
        debug!(path = %path, "rmdir");
        if path == "/" {
            return Err(err(Errno::EINVAL, &path).syscall("rmdir"));
        }
        let (parent, name) = self.parent_of(&path, cred)?;
        Self::check_access(&parent, W_OK | X_OK, cred, &path)?;

        self.in_transaction(|tx| {
            let mut map = self.tx_dir(tx, parent.ino, &path)?;
            let ino = *map
                .get(&name)
                .ok_or_else(|| err(Errno::ENOENT, &path).syscall("rmdir"))?;
            let target = self.tx_stats(tx, ino, &path)?;
            if !target.is_directory() {
                return Err(err(Errno::ENOTDIR, &path).syscall("rmdir"));
            }
            if !self.tx_dir(tx, ino, &path)?.is_empty() {
                return Err(err(Errno::ENOTEMPTY, &path).syscall("rmdir"));
            }
            map.remove(&name);
            tx.delete(meta_key(ino));
            tx.delete(data_key(ino));
            let mut parent = parent;
            Self::write_dir(tx, &mut parent, &map);
            Ok(())
        })
    }

    fn mkdir(&self, path: &str, mode: u32, cred: &Cred) -> FsResult<()> {
        let path = vpath::normalize(path);
        debug!(path = %path, mode = mode, "mkdir");
        if path == "/" {
            return Err(err(Errno::EEXIST, &path).syscall("mkdir"));
        }
        let (parent, name) = self.parent_of(&path, cred)?;
        Self::check_access(&parent, W_OK | X_OK, cred, &path)?;

        self.in_transaction(|tx| {
            let mut map = self.tx_dir(tx, parent.ino, &path)?;
            if map.contains_key(&name) {
                return Err(err(Errno::EEXIST, &path).syscall("mkdir"));
            }
            let ino = self.alloc_ino();
            let dir = new_directory(ino, mode, cred);
            tx.put(meta_key(ino), dir.to_bytes(), false);
            tx.put(data_key(ino), encode_dir(&DirMap::new()), false);
            map.insert(name, ino);
            let mut parent = parent;
            Self::write_dir(tx, &mut parent, &map);
            Ok(())
        })
    }

    fn readdir(&self, path: &str, cred: &Cred) -> FsResult<Vec<String>> {
        let path = vpath::normalize(path);
        let stats = self.resolve(&path, cred)?;
        if !stats.is_directory() {
            return Err(err(Errno::ENOTDIR, &path).syscall("readdir"));
        }
        Self::check_access(&stats, R_OK, cred, &path)?;
        Ok(self.load_dir(stats.ino, &path)?.into_keys().collect())
    }

    fn link(&self, src: &str, dst: &str, cred: &Cred) -> FsResult<()> {
        let src = vpath::normalize(src);
        let dst = vpath::normalize(dst);
        debug!(src = %src, dst = %dst, "link");
        let source = self.resolve(&src, cred)?;
        if source.is_directory() {
            return Err(err(Errno::EPERM, &src).syscall("link"));
        }
        let (parent, name) = self.parent_of(&dst, cred)?;
        Self::check_access(&parent, W_OK | X_OK, cred, &dst)?;

        self.in_transaction(|tx| {
            let mut map = self.tx_dir(tx, parent.ino, &dst)?;
            if map.contains_key(&name) {
                return Err(err(Errno::EEXIST, &dst).syscall("link"));
            }
            map.insert(name, source.ino);
            let mut source = source;
            source.ctime = strata_core::Timestamp::now();
            tx.put(meta_key(source.ino), source.to_bytes(), true);
            let mut parent = parent;
            Self::write_dir(tx, &mut parent, &map);
            Ok(())
        })
    }

    fn sync(&self, path: &str, data: &[u8], stats: &Stats) -> FsResult<()> {
        let path = vpath::normalize(path);
        let current = self.resolve(&path, &Cred::ROOT)?;
        if current.is_directory() {
            return Err(err(Errno::EISDIR, &path).syscall("sync"));
        }
        self.in_transaction(|tx| {
            let mut updated = *stats;
            updated.ino = current.ino;
            updated.size = data.len() as u64;
            tx.put(data_key(current.ino), Bytes::copy_from_slice(data), true);
            tx.put(meta_key(current.ino), updated.to_bytes(), true);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn fs() -> StoreFs<MemoryStore> {
        StoreFs::open(MemoryStore::new()).unwrap()
    }

    fn write_file(fs: &StoreFs<MemoryStore>, path: &str, data: &[u8]) {
        let mut f = fs
            .create_file(path, OpenFlag::WRITE, 0o644, &Cred::ROOT)
            .unwrap();
        f.write(data, None).unwrap();
        f.close().unwrap();
    }

    fn read_file(fs: &StoreFs<MemoryStore>, path: &str) -> Vec<u8> {
        let mut f = fs.open_file(path, OpenFlag::READ, &Cred::ROOT).unwrap();
        let size = f.stat().unwrap().size as usize;
        let mut buf = vec![0; size];
        f.read(&mut buf, None).unwrap();
        buf
    }

    #[test]
    fn test_root_exists_after_ready() {
        let fs = fs();
        let root = fs.stat("/", &Cred::ROOT).unwrap();
        assert!(root.is_directory());
        assert_eq!(root.ino, Ino::ROOT);
    }

    #[test]
    fn test_write_read_roundtrip() {
        let fs = fs();
        write_file(&fs, "/a.txt", b"hello");
        assert_eq!(read_file(&fs, "/a.txt"), b"hello");
        assert_eq!(fs.stat("/a.txt", &Cred::ROOT).unwrap().size, 5);
    }

    #[test]
    fn test_positional_write() {
        let fs = fs();
        write_file(&fs, "/f", b"aaaa");
        let mut f = fs
            .open_file("/f", OpenFlag::parse("r+").unwrap(), &Cred::ROOT)
            .unwrap();
        f.write(b"bb", Some(1)).unwrap();
        f.close().unwrap();
        assert_eq!(read_file(&fs, "/f"), b"abba");
    }

    #[test]
    fn test_append() {
        let fs = fs();
        write_file(&fs, "/log", b"one");
        let mut f = fs
            .open_file("/log", OpenFlag::parse("a").unwrap(), &Cred::ROOT)
            .unwrap();
        f.write(b"+two", None).unwrap();
        f.close().unwrap();
        assert_eq!(read_file(&fs, "/log"), b"one+two");
    }

    #[test]
    fn test_mkdir_and_nested_files() {
        let fs = fs();
        fs.mkdir("/a", 0o755, &Cred::ROOT).unwrap();
        fs.mkdir("/a/b", 0o755, &Cred::ROOT).unwrap();
        write_file(&fs, "/a/b/x", b"1");
        assert_eq!(fs.readdir("/a", &Cred::ROOT).unwrap(), vec!["b"]);
        assert_eq!(fs.readdir("/a/b", &Cred::ROOT).unwrap(), vec!["x"]);
    }

    #[test]
    fn test_mkdir_exists() {
        let fs = fs();
        fs.mkdir("/a", 0o755, &Cred::ROOT).unwrap();
        let e = fs.mkdir("/a", 0o755, &Cred::ROOT).unwrap_err();
        assert!(e.is(Errno::EEXIST));
    }

    #[test]
    fn test_mkdir_missing_parent() {
        let fs = fs();
        let e = fs.mkdir("/no/sub", 0o755, &Cred::ROOT).unwrap_err();
        assert!(e.is(Errno::ENOENT));
    }

    #[test]
    fn test_enotdir_traversal() {
        let fs = fs();
        write_file(&fs, "/file", b"x");
        let e = fs.stat("/file/sub", &Cred::ROOT).unwrap_err();
        assert!(e.is(Errno::ENOTDIR));
    }

    #[test]
    fn test_unlink() {
        let fs = fs();
        write_file(&fs, "/gone", b"x");
        fs.unlink("/gone", &Cred::ROOT).unwrap();
        assert!(!fs.exists("/gone", &Cred::ROOT));
        assert!(fs.readdir("/", &Cred::ROOT).unwrap().is_empty());
    }

    #[test]
    fn test_unlink_directory_fails() {
        let fs = fs();
        fs.mkdir("/d", 0o755, &Cred::ROOT).unwrap();
        assert!(fs.unlink("/d", &Cred::ROOT).unwrap_err().is(Errno::EISDIR));
    }

    #[test]
    fn test_rmdir_notempty() {
        let fs = fs();
        fs.mkdir("/d", 0o755, &Cred::ROOT).unwrap();
        write_file(&fs, "/d/x", b"1");
        assert!(fs
            .rmdir("/d", &Cred::ROOT)
            .unwrap_err()
            .is(Errno::ENOTEMPTY));
        fs.unlink("/d/x", &Cred::ROOT).unwrap();
        fs.rmdir("/d", &Cred::ROOT).unwrap();
        assert!(!fs.exists("/d", &Cred::ROOT));
    }

    #[test]
    fn test_rename_directory_tree() {
        let fs = fs();
        fs.mkdir("/a", 0o755, &Cred::ROOT).unwrap();
        fs.mkdir("/a/b", 0o755, &Cred::ROOT).unwrap();
        fs.rename("/a", "/c", &Cred::ROOT).unwrap();
        assert!(fs.stat("/c/b", &Cred::ROOT).unwrap().is_directory());
        assert!(fs.stat("/a", &Cred::ROOT).unwrap_err().is(Errno::ENOENT));
    }

    #[test]
    fn test_rename_overwrites_file() {
        let fs = fs();
        write_file(&fs, "/src", b"new");
        write_file(&fs, "/dst", b"old");
        fs.rename("/src", "/dst", &Cred::ROOT).unwrap();
        assert_eq!(read_file(&fs, "/dst"), b"new");
        assert!(!fs.exists("/src", &Cred::ROOT));
    }

    #[test]
    fn test_rename_cross_type_fails() {
        let fs = fs();
        write_file(&fs, "/f", b"x");
        fs.mkdir("/d", 0o755, &Cred::ROOT).unwrap();
        assert!(fs.rename("/f", "/d", &Cred::ROOT).unwrap_err().is(Errno::EISDIR));
        assert!(fs
            .rename("/d", "/f", &Cred::ROOT)
            .unwrap_err()
            .is(Errno::ENOTDIR));
    }

    #[test]
    fn test_rename_into_nonempty_dir_fails() {
        let fs = fs();
        fs.mkdir("/a", 0o755, &Cred::ROOT).unwrap();
        fs.mkdir("/b", 0o755, &Cred::ROOT).unwrap();
        write_file(&fs, "/b/x", b"1");
        assert!(fs
            .rename("/a", "/b", &Cred::ROOT)
            .unwrap_err()
            .is(Errno::ENOTEMPTY));
    }

    #[test]
    fn test_rename_into_own_subtree_fails() {
        let fs = fs();
        fs.mkdir("/a", 0o755, &Cred::ROOT).unwrap();
        assert!(fs
            .rename("/a", "/a/b", &Cred::ROOT)
            .unwrap_err()
            .is(Errno::EINVAL));
    }

    #[test]
    fn test_link_shares_ino() {
        let fs = fs();
        write_file(&fs, "/orig", b"shared");
        fs.link("/orig", "/alias", &Cred::ROOT).unwrap();
        let a = fs.stat("/orig", &Cred::ROOT).unwrap();
        let b = fs.stat("/alias", &Cred::ROOT).unwrap();
        assert_eq!(a.ino, b.ino);
        assert_eq!(read_file(&fs, "/alias"), b"shared");

        // Links are independent entries; unlinking one leaves the other.
        fs.unlink("/orig", &Cred::ROOT).unwrap();
        assert!(!fs.exists("/orig", &Cred::ROOT));
    }

    #[test]
    fn test_exclusive_open() {
        let fs = fs();
        write_file(&fs, "/f", b"x");
        let e = fs
            .open_file("/f", OpenFlag::parse("wx").unwrap(), &Cred::ROOT)
            .err().unwrap();
        assert!(e.is(Errno::EEXIST));
    }

    #[test]
    fn test_open_create_missing() {
        let fs = fs();
        let mut f = fs
            .open_file("/new", OpenFlag::parse("w").unwrap(), &Cred::ROOT)
            .unwrap();
        f.write(b"made", None).unwrap();
        f.close().unwrap();
        assert_eq!(read_file(&fs, "/new"), b"made");
    }

    #[test]
    fn test_open_missing_read_fails() {
        let fs = fs();
        let e = fs
            .open_file("/nope", OpenFlag::READ, &Cred::ROOT)
            .err().unwrap();
        assert!(e.is(Errno::ENOENT));
    }

    #[test]
    fn test_permission_denied_for_other() {
        let fs = fs();
        let owner = Cred::new(1000, 1000);
        fs.mkdir("/private", 0o700, &owner).unwrap();
        let outsider = Cred::new(2000, 2000);
        assert!(fs
            .readdir("/private", &outsider)
            .unwrap_err()
            .is(Errno::EACCES));
        assert!(fs
            .mkdir("/private/sub", 0o755, &outsider)
            .unwrap_err()
            .is(Errno::EACCES));
    }

    #[test]
    fn test_failed_mkdir_leaves_no_partial_state() {
        let fs = fs();
        fs.mkdir("/a", 0o755, &Cred::ROOT).unwrap();
        let before = fs.store().keys().len();
        assert!(fs.mkdir("/a", 0o755, &Cred::ROOT).is_err());
        assert_eq!(fs.store().keys().len(), before);
    }

    #[test]
    fn test_stat_idempotent() {
        let fs = fs();
        write_file(&fs, "/s", b"abc");
        let a = fs.stat("/s", &Cred::ROOT).unwrap();
        let b = fs.stat("/s", &Cred::ROOT).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_allocator_never_reuses_inos() {
        let fs = fs();
        fs.mkdir("/a", 0o755, &Cred::ROOT).unwrap();
        let ino_a = fs.stat("/a", &Cred::ROOT).unwrap().ino;
        fs.rmdir("/a", &Cred::ROOT).unwrap();

        fs.mkdir("/b", 0o755, &Cred::ROOT).unwrap();
        let ino_b = fs.stat("/b", &Cred::ROOT).unwrap().ino;
        assert!(ino_b > ino_a);
    }
}
