//! Stat records, mode bits, and the POSIX access check.

use std::fmt;

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::encoding::{CanonicalDecode, CanonicalEncode, DecodeError};
use crate::time::Timestamp;
use crate::{Cred, BLOCK_SIZE, SECTOR_SIZE};

/// File type mask.
pub const S_IFMT: u32 = 0o170000;
/// Regular file.
pub const S_IFREG: u32 = 0o100000;
/// Directory.
pub const S_IFDIR: u32 = 0o040000;
/// Symbolic link.
pub const S_IFLNK: u32 = 0o120000;

/// Owner read/write/execute mask.
pub const S_IRWXU: u32 = 0o700;
/// Group read/write/execute mask.
pub const S_IRWXG: u32 = 0o070;
/// Other read/write/execute mask.
pub const S_IRWXO: u32 = 0o007;

/// Requested-access bit: read.
pub const R_OK: u32 = 0o4;
/// Requested-access bit: write.
pub const W_OK: u32 = 0o2;
/// Requested-access bit: execute (search, for directories).
pub const X_OK: u32 = 0o1;

/// Inode number, unique within one Store.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Ino(pub u64);

impl Ino {
    /// The filesystem root directory.
    pub const ROOT: Ino = Ino(0);
}

impl fmt::Display for Ino {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Ino {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl CanonicalEncode for Ino {
    fn encode(&self, buf: &mut BytesMut) {
        self.0.encode(buf);
    }
}

impl CanonicalDecode for Ino {
    fn decode(buf: &mut Bytes) -> Result<Self, DecodeError> {
        Ok(Self(u64::decode(buf)?))
    }
}

/// File types the core distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// Regular file
    Regular,
    /// Directory
    Directory,
    /// Symbolic link
    Symlink,
}

impl FileType {
    /// Extracts the type from a mode word; None when the type bits are
    /// unset or unknown.
    pub const fn from_mode(mode: u32) -> Option<Self> {
        match mode & S_IFMT {
            S_IFREG => Some(FileType::Regular),
            S_IFDIR => Some(FileType::Directory),
            S_IFLNK => Some(FileType::Symlink),
            _ => None,
        }
    }

    /// The type bits for this file type.
    pub const fn mode_bits(self) -> u32 {
        match self {
            FileType::Regular => S_IFREG,
            FileType::Directory => S_IFDIR,
            FileType::Symlink => S_IFLNK,
        }
    }
}

/// A stat record.
///
/// `blocks` and `blksize` are derived, `nlink` is reported as a constant:
/// links are independent directory entries and the core keeps no
/// reference counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    /// Inode number.
    pub ino: Ino,
    /// Size in bytes (for directories, the encoded blob size).
    pub size: u64,
    /// Type and permission bits.
    pub mode: u32,
    /// Owning user.
    pub uid: u32,
    /// Owning group.
    pub gid: u32,
    /// Last access time.
    pub atime: Timestamp,
    /// Last data modification time.
    pub mtime: Timestamp,
    /// Last status change time.
    pub ctime: Timestamp,
    /// Creation time.
    pub birthtime: Timestamp,
}

impl Stats {
    /// Creates a stat record, forcing the type bits to regular-file when
    /// the mode carries none.
    pub fn new(ino: Ino, mode: u32, uid: u32, gid: u32) -> Self {
        let mode = if mode & S_IFMT == 0 { mode | S_IFREG } else { mode };
        let now = Timestamp::now();
        Self {
            ino,
            size: 0,
            mode,
            uid,
            gid,
            atime: now,
            mtime: now,
            ctime: now,
            birthtime: now,
        }
    }

    /// The file type encoded in `mode`.
    pub fn file_type(&self) -> FileType {
        FileType::from_mode(self.mode).unwrap_or(FileType::Regular)
    }

    /// Returns true for directories.
    pub fn is_directory(&self) -> bool {
        self.mode & S_IFMT == S_IFDIR
    }

    /// Returns true for regular files.
    pub fn is_regular(&self) -> bool {
        self.mode & S_IFMT == S_IFREG
    }

    /// Returns true for symbolic links.
    pub fn is_symlink(&self) -> bool {
        self.mode & S_IFMT == S_IFLNK
    }

    /// 512-byte sectors backing this file.
    pub fn blocks(&self) -> u64 {
        self.size.div_ceil(SECTOR_SIZE)
    }

    /// Preferred I/O block size.
    pub const fn blksize(&self) -> u32 {
        BLOCK_SIZE
    }

    /// Reported hard-link count.
    pub const fn nlink(&self) -> u32 {
        1
    }

    /// POSIX access check.
    ///
    /// `requested` is a mask of `R_OK | W_OK | X_OK`. An effective uid or
    /// gid of zero bypasses the check; otherwise the requested bits must
    /// all be granted by the applicable permission classes.
    pub fn has_access(&self, requested: u32, cred: &Cred) -> bool {
        if cred.is_root() {
            return true;
        }
        let mut granted = self.mode & S_IRWXO;
        if cred.uid == self.uid {
            granted |= (self.mode & S_IRWXU) >> 6;
        }
        if cred.gid == self.gid {
            granted |= (self.mode & S_IRWXG) >> 3;
        }
        requested & granted == requested
    }

    /// Refreshes mtime and ctime.
    pub fn touch(&mut self) {
        let now = Timestamp::now();
        self.mtime = now;
        self.ctime = now;
    }
}

impl CanonicalEncode for Stats {
    fn encode(&self, buf: &mut BytesMut) {
        self.ino.encode(buf);
        self.size.encode(buf);
        self.mode.encode(buf);
        self.uid.encode(buf);
        self.gid.encode(buf);
        self.atime.encode(buf);
        self.mtime.encode(buf);
        self.ctime.encode(buf);
        self.birthtime.encode(buf);
    }
}

impl CanonicalDecode for Stats {
    fn decode(buf: &mut Bytes) -> Result<Self, DecodeError> {
        Ok(Self {
            ino: Ino::decode(buf)?,
            size: u64::decode(buf)?,
            mode: u32::decode(buf)?,
            uid: u32::decode(buf)?,
            gid: u32::decode(buf)?,
            atime: Timestamp::decode(buf)?,
            mtime: Timestamp::decode(buf)?,
            ctime: Timestamp::decode(buf)?,
            birthtime: Timestamp::decode(buf)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_forced_to_regular() {
        let stats = Stats::new(Ino(1), 0o644, 0, 0);
        assert!(stats.is_regular());
        assert_eq!(stats.mode, S_IFREG | 0o644);
    }

    #[test]
    fn test_blocks_derivation() {
        let mut stats = Stats::new(Ino(1), 0o644, 0, 0);
        stats.size = 5;
        assert_eq!(stats.blocks(), 1);
        stats.size = 1024;
        assert_eq!(stats.blocks(), 2);
        stats.size = 0;
        assert_eq!(stats.blocks(), 0);
        assert_eq!(stats.blksize(), 4096);
    }

    #[test]
    fn test_access_root_bypass() {
        let stats = Stats::new(Ino(1), 0o000, 1000, 1000);
        assert!(stats.has_access(R_OK | W_OK | X_OK, &Cred::ROOT));
    }

    #[test]
    fn test_access_owner_group_other() {
        let mut stats = Stats::new(Ino(1), 0o640, 1000, 100);

        let owner = Cred::new(1000, 1000);
        assert!(stats.has_access(R_OK | W_OK, &owner));
        assert!(!stats.has_access(X_OK, &owner));

        let group = Cred::new(2000, 100);
        assert!(group.gid == stats.gid);
        assert!(stats.has_access(R_OK, &group));
        assert!(!stats.has_access(W_OK, &group));

        let other = Cred::new(3000, 3000);
        assert!(!stats.has_access(R_OK, &other));

        stats.mode |= 0o004;
        assert!(stats.has_access(R_OK, &other));
    }

    #[test]
    fn test_stats_roundtrip() {
        let mut stats = Stats::new(Ino(7), S_IFDIR | 0o755, 1, 2);
        stats.size = 4096;
        let decoded = Stats::from_bytes(&stats.to_vec()).unwrap();
        assert_eq!(stats, decoded);
    }
}
