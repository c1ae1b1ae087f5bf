//! Path Sandbox
//!
//! Confines every user-supplied path to that user's partition under the
//! node root. Resolution is lexical first (`.` and `..`), then symlinks are
//! followed for the part of the path that exists on disk, and the result must
//! stay below the user's own partition. Containment is checked per path
//! component, so `<root>/7` never admits `<root>/70`.

use std::ffi::OsString;
use std::io;
use std::path::{Component, Path, PathBuf};

use super::{Role, UserId, BACKUP_SUFFIX};
use crate::error::{Error, Result};

/// Resolves user-relative paths against a node root
#[derive(Debug, Clone)]
pub struct Sandbox {
    root: PathBuf,
}

impl Sandbox {
    /// Create a sandbox over a node root, made absolute against the
    /// current directory
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = std::path::absolute(root.into())?;
        Ok(Self {
            root: normalize(&root),
        })
    }

    /// The node root every partition lives under
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding a user's partition in the given role
    pub fn user_root(&self, user_id: UserId, role: Role) -> PathBuf {
        self.root.join(role.dir_name(user_id))
    }

    /// Resolve `relative` inside the user's partition.
    ///
    /// Fails with [`Error::InvalidPath`] if the path escapes the partition by
    /// traversal, absolute-path injection or a symlink pointing outside.
    pub fn resolve(&self, user_id: UserId, role: Role, relative: &str) -> Result<PathBuf> {
        self.resolve_inner(user_id, role, relative).map(|(real, _)| real)
    }

    /// Like [`Sandbox::resolve`], but the path must name something below the
    /// partition directory rather than the partition itself.
    pub fn resolve_file(&self, user_id: UserId, role: Role, relative: &str) -> Result<PathBuf> {
        let (real, real_base) = self.resolve_inner(user_id, role, relative)?;
        if real == real_base {
            return Err(Error::InvalidPath {
                user_id,
                path: relative.to_string(),
            });
        }
        Ok(real)
    }

    fn resolve_inner(&self, user_id: UserId, role: Role, relative: &str) -> Result<(PathBuf, PathBuf)> {
        let invalid = || Error::InvalidPath {
            user_id,
            path: relative.to_string(),
        };

        let base = self.user_root(user_id, role);
        let candidate = normalize(&base.join(relative));
        if !candidate.starts_with(&base) {
            return Err(invalid());
        }

        let real_base = canonicalize_existing(&base)?;
        let real = canonicalize_existing(&candidate)?;
        if !real.starts_with(&real_base) {
            tracing::warn!(user_id, path = relative, "Symlink escape rejected");
            return Err(invalid());
        }

        Ok((real, real_base))
    }

    /// Derive the owner of a path already known to be under the node root.
    ///
    /// The first segment below the root names the partition: `7` and
    /// `7_backup` both belong to user 7. Files directly in the root and
    /// segments that are not numeric are unowned (`None`).
    pub fn classify_owner(&self, path: &Path) -> Option<(UserId, Role)> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let mut components = relative.components();

        let first = match components.next()? {
            Component::Normal(segment) => segment.to_str()?,
            _ => return None,
        };
        // A bare file in the root has no partition segment
        components.next()?;

        let (digits, role) = match first.strip_suffix(BACKUP_SUFFIX) {
            Some(digits) => (digits, Role::Backup),
            None => (first, Role::Primary),
        };

        digits.parse::<UserId>().ok().map(|user_id| (user_id, role))
    }
}

/// Lexically resolve `.` and `..` without touching the filesystem
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Canonicalize the longest existing ancestor and re-append the rest.
///
/// The tail is already normalized, so it contains only plain names.
fn canonicalize_existing(path: &Path) -> io::Result<PathBuf> {
    let mut existing = path;
    let mut tail: Vec<OsString> = Vec::new();

    loop {
        match std::fs::canonicalize(existing) {
            Ok(mut real) => {
                for name in tail.iter().rev() {
                    real.push(name);
                }
                return Ok(real);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                match (existing.parent(), existing.file_name()) {
                    (Some(parent), Some(name)) => {
                        tail.push(name.to_os_string());
                        existing = parent;
                    }
                    _ => return Ok(path.to_path_buf()),
                }
            }
            Err(e) => return Err(e),
        }
    }
}
