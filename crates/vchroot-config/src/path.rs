//! Host-side path helpers used when preparing a virtual root.
//!
//! These run in the launcher, never inside the target process, so they are
//! free to use `std::fs` and `std::env`.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Resolve a root directory to its canonical absolute form.
///
/// The root must exist; symlinks are resolved so that the prefix the
/// inception layer strips matches what the kernel reports from `getcwd`.
pub fn normalize_root(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    let canonical = path
        .canonicalize()
        .with_context(|| format!("Failed to resolve root directory: {}", path.display()))?;
    if !canonical.is_dir() {
        anyhow::bail!("Root is not a directory: {}", canonical.display());
    }
    Ok(canonical)
}

/// Render a root for the environment contract: no trailing slash.
pub fn display_root(path: &Path) -> String {
    let s = path.to_string_lossy();
    let trimmed = s.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Prefix `entries` onto a colon-separated search path.
///
/// Entries already present are not duplicated; an empty `existing` yields
/// just the new entries.
pub fn prepend_search_path(entries: &[String], existing: Option<&str>) -> String {
    let existing: Vec<&str> = existing
        .unwrap_or("")
        .split(':')
        .filter(|e| !e.is_empty())
        .collect();

    let mut out: Vec<&str> = Vec::with_capacity(entries.len() + existing.len());
    for entry in entries {
        if !out.contains(&entry.as_str()) {
            out.push(entry);
        }
    }
    for entry in existing {
        if !out.contains(&entry) {
            out.push(entry);
        }
    }
    out.join(":")
}

/// Check if a path is within a directory, by component.
///
/// Purely lexical; used to decide whether a host path already lies under the
/// virtual root.
pub fn is_within_directory(path: impl AsRef<Path>, dir: impl AsRef<Path>) -> bool {
    path.as_ref().starts_with(dir.as_ref())
}
