//! Portable absolute-path utilities.
//!
//! VFS paths are plain `/`-separated UTF-8 strings, independent of the
//! host platform. Every public API takes absolute paths; mounts strip
//! their prefix and hand the remainder (also absolute) to the owning
//! filesystem.

/// Returns true if the path is absolute.
pub fn is_absolute(path: &str) -> bool {
    path.starts_with('/')
}

/// Splits a path into its non-empty components.
pub fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|c| !c.is_empty())
}

/// Normalizes an absolute path: collapses `//` and `.`, resolves `..`
/// against preceding components, and strips any trailing slash.
///
/// `..` at the root is dropped, so the result is always absolute.
pub fn normalize(path: &str) -> String {
    let mut stack: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                stack.pop();
            }
            part => stack.push(part),
        }
    }
    if stack.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", stack.join("/"))
    }
}

/// Joins a relative segment onto an absolute base and normalizes.
pub fn join(base: &str, segment: &str) -> String {
    if segment.starts_with('/') {
        normalize(segment)
    } else {
        normalize(&format!("{base}/{segment}"))
    }
}

/// Returns the parent directory of a normalized path.
///
/// The parent of `/` is `/`.
pub fn dirname(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}

/// Returns the final component of a normalized path.
///
/// The basename of `/` is the empty string.
pub fn basename(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}
