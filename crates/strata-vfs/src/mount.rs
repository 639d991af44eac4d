//! The mount table: absolute-path prefixes bound to filesystems.

use std::collections::BTreeMap;
use std::sync::Arc;

use strata_core::error::{err, Errno, FsResult};
use strata_core::path as vpath;
use strata_core::FileSystem;

/// A mapping from absolute-path prefixes to filesystems.
///
/// Prefixes never carry a trailing slash (`/` itself excepted) and are
/// unique; resolution picks the longest prefix that is a component-wise
/// prefix of the queried path.
#[derive(Default)]
pub struct MountTable {
    mounts: BTreeMap<String, Arc<dyn FileSystem>>,
}

impl MountTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `prefix` to `fs`.
    pub fn mount(&mut self, prefix: &str, fs: Arc<dyn FileSystem>) -> FsResult<()> {
        if !vpath::is_absolute(prefix) || vpath::normalize(prefix) != prefix {
            return Err(err(Errno::EINVAL, prefix).syscall("mount"));
        }
        if self.mounts.contains_key(prefix) {
            return Err(err(Errno::EEXIST, prefix).syscall("mount"));
        }
        self.mounts.insert(prefix.to_string(), fs);
        Ok(())
    }

    /// Removes the binding at `prefix`.
    pub fn umount(&mut self, prefix: &str) -> FsResult<Arc<dyn FileSystem>> {
        self.mounts
            .remove(prefix)
            .ok_or_else(|| err(Errno::ENOENT, prefix).syscall("umount"))
    }

    /// Resolves `path` to its owning filesystem and the path relative to
    /// the mount (always absolute, `/`-rooted at the mount).
    pub fn resolve(&self, path: &str) -> FsResult<(Arc<dyn FileSystem>, String)> {
        let path = vpath::normalize(path);
        let mut best: Option<(&String, &Arc<dyn FileSystem>)> = None;
        for (prefix, fs) in &self.mounts {
            if !Self::is_prefix_of(prefix, &path) {
                continue;
            }
            if best.map_or(true, |(b, _)| prefix.len() > b.len()) {
                best = Some((prefix, fs));
            }
        }
        let (prefix, fs) = best.ok_or_else(|| err(Errno::ENOENT, &path).syscall("resolve"))?;
        let rel = if prefix == "/" {
            path.clone()
        } else if path == *prefix {
            "/".to_string()
        } else {
            path[prefix.len()..].to_string()
        };
        Ok((Arc::clone(fs), rel))
    }

    /// Component-aligned prefix test: `/a/b` owns `/a/b` and `/a/b/c`,
    /// but not `/a/bc`.
    fn is_prefix_of(prefix: &str, path: &str) -> bool {
        if prefix == "/" {
            return true;
        }
        match path.strip_prefix(prefix) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    /// All mounted prefixes.
    pub fn prefixes(&self) -> Vec<String> {
        self.mounts.keys().cloned().collect()
    }

    /// Returns true when no filesystems are mounted.
    pub fn is_empty(&self) -> bool {
        self.mounts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_store::{MemoryStore, StoreFs};

    fn memfs() -> Arc<dyn FileSystem> {
        Arc::new(StoreFs::open(MemoryStore::new()).unwrap())
    }

    #[test]
    fn test_mount_validation() {
        let mut table = MountTable::new();
        assert!(table.mount("relative", memfs()).unwrap_err().is(Errno::EINVAL));
        assert!(table.mount("/a/", memfs()).unwrap_err().is(Errno::EINVAL));

        table.mount("/a", memfs()).unwrap();
        assert!(table.mount("/a", memfs()).unwrap_err().is(Errno::EEXIST));
    }

    #[test]
    fn test_umount_missing() {
        let mut table = MountTable::new();
        assert!(table.umount("/nope").err().unwrap().is(Errno::ENOENT));
    }

    #[test]
    fn test_longest_prefix_wins() {
        let mut table = MountTable::new();
        table.mount("/", memfs()).unwrap();
        table.mount("/a", memfs()).unwrap();
        table.mount("/a/b", memfs()).unwrap();

        let (_, rel) = table.resolve("/a/b/c").unwrap();
        assert_eq!(rel, "/c");
        let (_, rel) = table.resolve("/a/x").unwrap();
        assert_eq!(rel, "/x");
        let (_, rel) = table.resolve("/other").unwrap();
        assert_eq!(rel, "/other");
    }

    #[test]
    fn test_component_boundaries() {
        let mut table = MountTable::new();
        table.mount("/", memfs()).unwrap();
        table.mount("/a/b", memfs()).unwrap();

        // `/a/bc` is not under `/a/b`.
        let (_, rel) = table.resolve("/a/bc").unwrap();
        assert_eq!(rel, "/a/bc");

        let (_, rel) = table.resolve("/a/b").unwrap();
        assert_eq!(rel, "/");
    }

    #[test]
    fn test_no_match() {
        let mut table = MountTable::new();
        table.mount("/mnt", memfs()).unwrap();
        assert!(table.resolve("/elsewhere").err().unwrap().is(Errno::ENOENT));
    }
}
