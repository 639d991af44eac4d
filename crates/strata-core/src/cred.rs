//! Process credentials used for permission checks.

use serde::{Deserialize, Serialize};

/// A credential record: real, saved, and effective uid/gid.
///
/// The VFS only ever reads credentials; it never derives or changes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cred {
    /// Real user id.
    pub uid: u32,
    /// Real group id.
    pub gid: u32,
    /// Saved user id.
    pub suid: u32,
    /// Saved group id.
    pub sgid: u32,
    /// Effective user id.
    pub euid: u32,
    /// Effective group id.
    pub egid: u32,
}

impl Cred {
    /// The superuser credential (all ids zero).
    pub const ROOT: Cred = Cred {
        uid: 0,
        gid: 0,
        suid: 0,
        sgid: 0,
        euid: 0,
        egid: 0,
    };

    /// Creates a credential where all ids derive from one uid/gid pair.
    pub const fn new(uid: u32, gid: u32) -> Self {
        Self {
            uid,
            gid,
            suid: uid,
            sgid: gid,
            euid: uid,
            egid: gid,
        }
    }

    /// Returns true if the effective user or group is the superuser.
    pub const fn is_root(&self) -> bool {
        self.euid == 0 || self.egid == 0
    }
}

impl Default for Cred {
    fn default() -> Self {
        Self::ROOT
    }
}
