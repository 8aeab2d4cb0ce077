//! Symlink target normalization.

use crate::error::{Error, Kind, Result};

/// Lexically cleans a slash-separated absolute path.
///
/// Collapses repeated separators and `.` components, applies `..`
/// against the stack, and never escapes the root.
pub fn clean(path: &str) -> String {
    let mut stack: Vec<&str> = Vec::new();
    for component in path.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                stack.pop();
            }
            other => stack.push(other),
        }
    }
    if stack.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", stack.join("/"))
    }
}

/// Parent of a slash-separated path, staying within the root.
fn parent(path: &str) -> String {
    let cleaned = clean(path);
    match cleaned.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(split) => cleaned[..split].to_string(),
    }
}

/// Normalizes a raw UnixFS symlink target into a guest-relative path.
///
/// `name` is the guest path of the symlink itself; `allowed_prefix` is the
/// namespace the guest accepts in absolute targets (`/ipfs/` or `/ipns/`).
/// The returned path is absolute within the guest; `/` is the guest root.
pub fn normalize_link_target(name: &str, target: &str, allowed_prefix: &str) -> Result<String> {
    if let Some(rest) = target.strip_prefix(allowed_prefix) {
        return Ok(clean(&format!("/{rest}")));
    }
    if target == "/" {
        return Ok("/".to_string());
    }
    if target == ".." {
        return Ok(parent(name));
    }
    if target == "." {
        return Ok(clean(&format!("/{name}")));
    }
    if target.starts_with('/') {
        // Absolute target outside this guest's namespace.
        return Err(Error::new("readlink", name, Kind::InvalidItem));
    }
    Ok(clean(&format!("/{name}/{target}")))
}
