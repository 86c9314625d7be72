//! Sandbox path authorization.
//!
//! [`PathGuard`] is the single choke point between client-supplied paths and
//! the filesystem. Every path is resolved against the sandbox root and
//! canonicalized (symlinks followed, `.` and `..` collapsed) before it is
//! compared, component by component, against the root and the blacklist.

use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use protocol::EntryKind;
use thiserror::Error;

/// Errors produced while authorizing a path.
///
/// Path strings carried here are the client-supplied form, never the
/// canonical absolute path.
#[derive(Debug, Error)]
pub enum GuardError {
    /// The requested path does not exist.
    #[error("path does not exist: {0}")]
    NotFound(String),

    /// The canonical target is outside the sandbox root.
    #[error("path is outside the sandbox: {0}")]
    OutsideSandbox(String),

    /// The canonical target is blacklisted.
    #[error("path is blacklisted: {0}")]
    Blacklisted(String),

    /// A new path tries to climb out with `..`.
    #[error("path traversal detected: {0}")]
    PathTraversal(String),

    /// The target is neither a regular file nor a directory.
    #[error("unsupported file type: {0}")]
    UnsupportedType(String),

    /// The OS refused to resolve the path.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Something already exists where a new file was requested.
    #[error("path already exists: {0}")]
    AlreadyExists(String),

    /// An ancestor of a new path is a file.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// The request does not name a usable path.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// IO error while inspecting the path.
    #[error("IO error on {path}: {source}")]
    Io {
        /// The client-supplied path.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
}

/// An existing path proven to be inside the sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizedPath {
    canonical: PathBuf,
    relative: String,
    kind: EntryKind,
}

impl AuthorizedPath {
    /// Canonical absolute path.
    pub fn canonical(&self) -> &Path {
        &self.canonical
    }

    /// Path relative to the sandbox root, forward-slash separated.
    pub fn relative(&self) -> &str {
        &self.relative
    }

    /// Filesystem kind observed at authorization time.
    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    /// Last component of the path, empty for the root.
    pub fn name(&self) -> String {
        self.relative
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string()
    }
}

/// A not-yet-existing path whose nearest existing ancestor is inside the
/// sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPath {
    /// Canonical deepest existing ancestor.
    anchor: PathBuf,
    /// Components to create below the anchor, the last one being the file.
    tail: Vec<OsString>,
    relative: String,
}

impl NewPath {
    /// Canonical deepest existing ancestor.
    pub fn anchor(&self) -> &Path {
        &self.anchor
    }

    /// Full target path.
    pub fn target(&self) -> PathBuf {
        let mut target = self.anchor.clone();
        target.extend(&self.tail);
        target
    }

    /// Directory that will contain the new file.
    pub fn parent(&self) -> PathBuf {
        let mut parent = self.anchor.clone();
        parent.extend(&self.tail[..self.tail.len() - 1]);
        parent
    }

    /// Path relative to the sandbox root, forward-slash separated.
    pub fn relative(&self) -> &str {
        &self.relative
    }

    /// File name of the new file.
    pub fn name(&self) -> String {
        self.tail
            .last()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// Sandbox guard holding the canonical root and blacklist.
///
/// Both are fixed at construction and never change, so a guard can be
/// shared across request handlers without locking.
#[derive(Debug, Clone)]
pub struct PathGuard {
    root: PathBuf,
    blacklist: HashSet<PathBuf>,
}

impl PathGuard {
    /// Create a guard rooted at `root`.
    ///
    /// The root must be an existing directory. Relative blacklist entries are
    /// resolved against the root; entries that exist are canonicalized, the
    /// others are normalized lexically so they cannot be created either.
    pub fn new<P, I>(root: P, blacklist: I) -> Result<Self, GuardError>
    where
        P: AsRef<Path>,
        I: IntoIterator<Item = PathBuf>,
    {
        let requested = root.as_ref();
        let display = requested.display().to_string();
        let root = fs::canonicalize(requested).map_err(|e| io_error(&display, e))?;
        if !root.is_dir() {
            return Err(GuardError::NotADirectory(display));
        }

        let blacklist = blacklist
            .into_iter()
            .map(|entry| {
                let absolute = root.join(entry);
                fs::canonicalize(&absolute).unwrap_or_else(|_| normalize_lexically(&absolute))
            })
            .collect();

        Ok(Self { root, blacklist })
    }

    /// Canonical sandbox root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Blacklisted canonical paths.
    pub fn blacklist(&self) -> impl Iterator<Item = &Path> {
        self.blacklist.iter().map(PathBuf::as_path)
    }

    /// Check whether a canonical path is inside the sandbox.
    ///
    /// This compares path components, so `/srv/data2` is not inside
    /// `/srv/data`.
    pub fn contains(&self, canonical: &Path) -> bool {
        canonical.starts_with(&self.root)
    }

    /// Check whether a canonical path is blacklisted or below a blacklisted
    /// directory.
    pub fn is_blacklisted(&self, canonical: &Path) -> bool {
        self.blacklist
            .iter()
            .any(|entry| canonical.starts_with(entry))
    }

    /// Render a canonical in-sandbox path relative to the root.
    ///
    /// Returns an empty string for the root itself and for paths outside it.
    pub fn relative(&self, canonical: &Path) -> String {
        canonical
            .strip_prefix(&self.root)
            .map(|rel| {
                rel.components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/")
            })
            .unwrap_or_default()
    }

    /// Authorize an existing path.
    pub fn authorize(&self, requested: &str) -> Result<AuthorizedPath, GuardError> {
        let canonical = fs::canonicalize(self.root.join(requested)).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => GuardError::NotFound(requested.to_string()),
            io::ErrorKind::PermissionDenied => GuardError::PermissionDenied(requested.to_string()),
            // A file used as a directory in the middle of the path.
            io::ErrorKind::NotADirectory => GuardError::NotFound(requested.to_string()),
            _ => io_error(requested, e),
        })?;

        self.check(&canonical, requested)?;

        let metadata = fs::metadata(&canonical).map_err(|e| io_error(requested, e))?;
        let kind = if metadata.is_dir() {
            EntryKind::Directory
        } else if metadata.is_file() {
            EntryKind::File
        } else {
            return Err(GuardError::UnsupportedType(requested.to_string()));
        };

        Ok(AuthorizedPath {
            relative: self.relative(&canonical),
            canonical,
            kind,
        })
    }

    /// Authorize the sandbox root itself.
    pub fn authorize_root(&self) -> AuthorizedPath {
        AuthorizedPath {
            canonical: self.root.clone(),
            relative: String::new(),
            kind: EntryKind::Directory,
        }
    }

    /// Authorize a path that must not exist yet.
    ///
    /// Anything already present at the path, a dangling symlink included,
    /// is reported as [`GuardError::AlreadyExists`] unless it resolves
    /// outside the sandbox, in which case the denial wins.
    pub fn authorize_new(&self, requested: &str) -> Result<NewPath, GuardError> {
        let joined = self.root.join(requested);

        if fs::symlink_metadata(&joined).is_ok() {
            return match self.authorize(requested) {
                Ok(_) | Err(GuardError::NotFound(_)) => {
                    Err(GuardError::AlreadyExists(requested.to_string()))
                }
                Err(e) => Err(e),
            };
        }

        let (anchor, tail) = self.split_existing(&joined, requested)?;
        let anchor = fs::canonicalize(&anchor).map_err(|e| io_error(requested, e))?;
        self.check(&anchor, requested)?;
        if !anchor.is_dir() {
            return Err(GuardError::NotADirectory(requested.to_string()));
        }

        let new_path = NewPath {
            anchor,
            tail,
            relative: String::new(),
        };
        let target = new_path.target();
        if self.is_blacklisted(&target) {
            return Err(GuardError::Blacklisted(requested.to_string()));
        }

        Ok(NewPath {
            relative: self.relative(&target),
            ..new_path
        })
    }

    /// Containment and blacklist checks on a canonical path.
    fn check(&self, canonical: &Path, requested: &str) -> Result<(), GuardError> {
        if self.is_blacklisted(canonical) {
            tracing::warn!(path = %requested, "Rejected blacklisted path");
            return Err(GuardError::Blacklisted(requested.to_string()));
        }
        if !self.contains(canonical) {
            tracing::warn!(path = %requested, "Rejected path outside sandbox");
            return Err(GuardError::OutsideSandbox(requested.to_string()));
        }
        Ok(())
    }

    /// Split `joined` into its deepest existing ancestor and the missing
    /// components below it.
    fn split_existing(
        &self,
        joined: &Path,
        requested: &str,
    ) -> Result<(PathBuf, Vec<OsString>), GuardError> {
        let anchor = joined
            .ancestors()
            .skip(1)
            .find(|candidate| fs::symlink_metadata(candidate).is_ok())
            .ok_or_else(|| GuardError::NotFound(requested.to_string()))?;

        let missing = joined
            .strip_prefix(anchor)
            .map_err(|_| GuardError::InvalidPath(format!("cannot resolve '{}'", requested)))?;

        let mut tail = Vec::new();
        for component in missing.components() {
            match component {
                Component::Normal(name) => tail.push(name.to_os_string()),
                Component::CurDir => {}
                Component::ParentDir => {
                    return Err(GuardError::PathTraversal(requested.to_string()));
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(GuardError::InvalidPath(format!(
                        "cannot resolve '{}'",
                        requested
                    )));
                }
            }
        }

        if tail.is_empty() {
            return Err(GuardError::InvalidPath(format!(
                "'{}' does not name a file",
                requested
            )));
        }

        Ok((anchor.to_path_buf(), tail))
    }
}

fn io_error(path: &str, source: io::Error) -> GuardError {
    GuardError::Io {
        path: path.to_string(),
        source,
    }
}

/// Resolve `.` and `..` without touching the filesystem.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}
