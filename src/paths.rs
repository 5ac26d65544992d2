//! Project identity and path canonicalization.
//!
//! Every project is identified by the canonical absolute path of its
//! configuration file. Two identifiers are equal iff their canonical
//! forms compare bytewise equal, so all graph and map keys go through
//! [`canonical_project_path`] exactly once, at the boundary.

use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Canonical identifier of a project: the normalized absolute path to
/// its configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProjectId(PathBuf);

impl ProjectId {
    /// Wrap an already-canonical path. Callers outside this module
    /// should prefer [`ProjectId::new`].
    pub(crate) fn from_canonical(path: PathBuf) -> Self {
        ProjectId(path)
    }

    /// Canonicalize `path` against `cwd` and wrap it.
    pub fn new(cwd: &Path, path: &Path) -> Self {
        ProjectId(canonical_project_path(cwd, path))
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// Directory containing the configuration file.
    pub fn dir(&self) -> &Path {
        self.0.parent().unwrap_or(Path::new("/"))
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl AsRef<Path> for ProjectId {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

/// Absolute-resolve `path` against `cwd` and normalize it so that equal
/// paths compare bytewise equal: `.` and `..` segments are folded
/// lexically, separators are normalized, and on Windows the
/// single-letter drive prefix is uppercased.
pub fn canonical_project_path(cwd: &Path, path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // Keep leading `..` that would escape the root; fold the rest.
                if !normalized.pop() {
                    normalized.push(Component::ParentDir);
                }
            }
            Component::Prefix(prefix) => {
                normalized.push(normalize_prefix(prefix.as_os_str()));
            }
            other => normalized.push(other),
        }
    }

    normalized
}

/// Resolve a root or reference target to a configuration file path: a
/// directory receives an implicit `tsconfig.json` suffix.
pub fn resolve_config_path(cwd: &Path, path: &Path) -> PathBuf {
    let canonical = canonical_project_path(cwd, path);
    if canonical.is_dir() {
        canonical.join("tsconfig.json")
    } else {
        canonical
    }
}

/// Render `path` relative to `base` when it is underneath it, for
/// single-line reporting. Falls back to the absolute form.
pub fn relative_for_display(base: &Path, path: &Path) -> PathBuf {
    path.strip_prefix(base)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(windows)]
fn normalize_prefix(prefix: &std::ffi::OsStr) -> std::ffi::OsString {
    let text = prefix.to_string_lossy();
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some(drive), Some(':')) if drive.is_ascii_lowercase() => {
            let mut upper = String::with_capacity(text.len());
            upper.push(drive.to_ascii_uppercase());
            upper.push(':');
            upper.extend(chars);
            upper.into()
        }
        _ => prefix.to_os_string(),
    }
}

#[cfg(not(windows))]
fn normalize_prefix(prefix: &std::ffi::OsStr) -> std::ffi::OsString {
    prefix.to_os_string()
}
