//! Inode records and the store key layout.
//!
//! Each inode owns two logical store keys: the inode record (the encoded
//! stat fields) and the data blob. For a regular file the blob is the
//! contents; for a directory it is the encoded name→ino map.

use strata_core::stats::{S_IFDIR, S_IFMT, S_IFREG};
use strata_core::{Cred, Ino, Stats};

/// Store key of the inode record for `ino`.
pub const fn meta_key(ino: Ino) -> u64 {
    ino.0 << 1
}

/// Store key of the data blob for `ino`.
pub const fn data_key(ino: Ino) -> u64 {
    (ino.0 << 1) | 1
}

/// The inode a store key belongs to.
pub const fn ino_of(key: u64) -> Ino {
    Ino(key >> 1)
}

/// Returns true when `key` addresses an inode record.
pub const fn is_meta_key(key: u64) -> bool {
    key & 1 == 0
}

/// Builds the stat record for a fresh directory inode.
pub fn new_directory(ino: Ino, mode: u32, cred: &Cred) -> Stats {
    Stats::new(ino, (mode & !S_IFMT) | S_IFDIR, cred.euid, cred.egid)
}

/// Builds the stat record for a fresh regular-file inode.
pub fn new_file(ino: Ino, mode: u32, cred: &Cred) -> Stats {
    Stats::new(ino, (mode & !S_IFMT) | S_IFREG, cred.euid, cred.egid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        assert_eq!(meta_key(Ino::ROOT), 0);
        assert_eq!(data_key(Ino::ROOT), 1);
        assert_eq!(meta_key(Ino(7)), 14);
        assert_eq!(data_key(Ino(7)), 15);
        assert_eq!(ino_of(14), Ino(7));
        assert_eq!(ino_of(15), Ino(7));
        assert!(is_meta_key(14));
        assert!(!is_meta_key(15));
    }

    #[test]
    fn test_constructors_set_type_bits() {
        let dir = new_directory(Ino(1), 0o755, &Cred::ROOT);
        assert!(dir.is_directory());
        assert_eq!(dir.mode & 0o777, 0o755);

        let file = new_file(Ino(2), 0o644, &Cred::new(1000, 1000));
        assert!(file.is_regular());
        assert_eq!(file.uid, 1000);
    }
}
