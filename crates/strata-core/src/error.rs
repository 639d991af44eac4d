//! Errno-coded error values.
//!
//! Every failure in the VFS is a single tagged value: an errno kind, a
//! human message, and optionally the path and syscall that produced it.
//! Layers preserve inner errors verbatim unless a component's contract
//! says otherwise (readonly projection, bridge latching).

use std::fmt;

use thiserror::Error;

/// Result alias used throughout the workspace.
pub type FsResult<T> = Result<T, FsError>;

/// Errno kinds the core emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Errno {
    ENOENT,
    EEXIST,
    ENOTDIR,
    EISDIR,
    ENOTEMPTY,
    EINVAL,
    EROFS,
    EPERM,
    EACCES,
    ENOTSUP,
    EIO,
    EBADF,
}

impl Errno {
    /// Numeric errno code (Linux values).
    pub const fn code(self) -> i32 {
        match self {
            Errno::ENOENT => 2,
            Errno::EIO => 5,
            Errno::EBADF => 9,
            Errno::EACCES => 13,
            Errno::EEXIST => 17,
            Errno::ENOTDIR => 20,
            Errno::EISDIR => 21,
            Errno::EINVAL => 22,
            Errno::EROFS => 30,
            Errno::ENOTEMPTY => 39,
            Errno::EPERM => 1,
            Errno::ENOTSUP => 95,
        }
    }

    /// Default human message for this kind.
    pub const fn message(self) -> &'static str {
        match self {
            Errno::ENOENT => "no such file or directory",
            Errno::EEXIST => "file already exists",
            Errno::ENOTDIR => "not a directory",
            Errno::EISDIR => "is a directory",
            Errno::ENOTEMPTY => "directory not empty",
            Errno::EINVAL => "invalid argument",
            Errno::EROFS => "read-only file system",
            Errno::EPERM => "operation not permitted",
            Errno::EACCES => "permission denied",
            Errno::ENOTSUP => "operation not supported",
            Errno::EIO => "input/output error",
            Errno::EBADF => "bad file descriptor",
        }
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// A single VFS error value.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{errno}: {message}{}{}", fmt_syscall(.syscall), fmt_path(.path))]
pub struct FsError {
    /// Errno kind.
    pub errno: Errno,
    /// Human-readable message.
    pub message: String,
    /// Path the operation was applied to, when known.
    pub path: Option<String>,
    /// Syscall-style operation name, when known.
    pub syscall: Option<&'static str>,
}

fn fmt_path(path: &Option<String>) -> String {
    match path {
        Some(p) => format!(" '{p}'"),
        None => String::new(),
    }
}

fn fmt_syscall(syscall: &Option<&'static str>) -> String {
    match syscall {
        Some(s) => format!(", {s}"),
        None => String::new(),
    }
}

impl FsError {
    /// Creates an error with the kind's default message.
    pub fn new(errno: Errno) -> Self {
        Self {
            errno,
            message: errno.message().to_string(),
            path: None,
            syscall: None,
        }
    }

    /// Creates an error with a custom message.
    pub fn with_message(errno: Errno, message: impl Into<String>) -> Self {
        Self {
            errno,
            message: message.into(),
            path: None,
            syscall: None,
        }
    }

    /// Attaches the path the operation was applied to.
    pub fn path(mut self, path: impl AsRef<str>) -> Self {
        self.path = Some(path.as_ref().to_string());
        self
    }

    /// Attaches the syscall-style operation name.
    pub fn syscall(mut self, syscall: &'static str) -> Self {
        self.syscall = Some(syscall);
        self
    }

    /// Returns true if this error carries the given kind.
    pub fn is(&self, errno: Errno) -> bool {
        self.errno == errno
    }
}

impl From<Errno> for FsError {
    fn from(errno: Errno) -> Self {
        Self::new(errno)
    }
}

/// Shorthand constructor used at call sites: `err(ENOENT, path)`.
pub fn err(errno: Errno, path: impl AsRef<str>) -> FsError {
    FsError::new(errno).path(path)
}
