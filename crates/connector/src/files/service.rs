//! Filesystem operations on authorized paths.
//!
//! [`FileService`] only ever touches paths produced by its [`PathGuard`]:
//! [`AuthorizedPath`] for existing entries and [`NewPath`] for creation.
//! Overwrites truncate and rewrite the existing file in place, so hard links
//! see the new content and read-only files stay protected.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use protocol::{CreateRequest, DirectoryEntry, EntryKind, FileRecord, WriteRequest};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::guard::{AuthorizedPath, NewPath, PathGuard};
use crate::error::{ConnectorError, ConnectorResult};

/// Result of a `GET` on a path: a listing or a file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Resource {
    /// Children of a directory.
    Listing(Vec<DirectoryEntry>),
    /// Content and metadata of a file.
    File(FileRecord),
}

/// Filesystem operations confined to one sandbox.
#[derive(Debug, Clone)]
pub struct FileService {
    guard: Arc<PathGuard>,
}

impl FileService {
    /// Create a service over the given guard.
    pub fn new(guard: Arc<PathGuard>) -> Self {
        Self { guard }
    }

    /// The guard every path goes through.
    pub fn guard(&self) -> &PathGuard {
        &self.guard
    }

    /// Authorize `requested` and list or read it depending on its kind.
    pub fn get(&self, requested: &str) -> ConnectorResult<Resource> {
        let target = self.guard.authorize(requested)?;
        match target.kind() {
            EntryKind::Directory => self.list(&target).map(Resource::Listing),
            EntryKind::File => self.read(&target).map(Resource::File),
        }
    }

    /// List the immediate children of a directory.
    ///
    /// Blacklisted children, children resolving outside the sandbox and
    /// children that are neither files nor directories are left out.
    /// Directories come first, then files, each sorted by name.
    pub fn list(&self, dir: &AuthorizedPath) -> ConnectorResult<Vec<DirectoryEntry>> {
        let entries = fs::read_dir(dir.canonical()).map_err(|e| {
            warn!(path = %dir.relative(), error = %e, "Failed to read directory");
            ConnectorError::NotFound(display_path(dir.relative()))
        })?;

        let mut results = Vec::new();
        for entry_result in entries {
            let entry = match entry_result {
                Ok(e) => e,
                Err(_) => continue,
            };

            // Follows symlinks; dangling links drop out here.
            let canonical = match fs::canonicalize(entry.path()) {
                Ok(p) => p,
                Err(_) => continue,
            };
            if !self.guard.contains(&canonical) || self.guard.is_blacklisted(&canonical) {
                debug!(entry = ?entry.file_name(), "Hiding entry from listing");
                continue;
            }

            let kind = match fs::metadata(&canonical) {
                Ok(m) if m.is_dir() => EntryKind::Directory,
                Ok(m) if m.is_file() => EntryKind::File,
                _ => continue,
            };

            // Names that are not UTF-8 could not be requested back.
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(raw) => {
                    debug!(entry = ?raw, "Hiding non UTF-8 entry from listing");
                    continue;
                }
            };
            let path = if dir.relative().is_empty() {
                name.clone()
            } else {
                format!("{}/{}", dir.relative(), name)
            };

            results.push(DirectoryEntry::new(name, path, kind));
        }

        results.sort_by(|a, b| {
            let a_is_dir = a.kind == EntryKind::Directory;
            let b_is_dir = b.kind == EntryKind::Directory;
            b_is_dir
                .cmp(&a_is_dir)
                .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
                .then_with(|| a.name.cmp(&b.name))
        });

        Ok(results)
    }

    /// Read a file's raw bytes with its size and modification time.
    pub fn read(&self, file: &AuthorizedPath) -> ConnectorResult<FileRecord> {
        let (bytes, mtime) = read_with_mtime(file.canonical()).map_err(|e| {
            warn!(path = %file.relative(), error = %e, "Failed to read file");
            ConnectorError::NotFound(display_path(file.relative()))
        })?;

        Ok(FileRecord::from_bytes(
            file.name(),
            file.relative(),
            bytes,
            mtime,
        ))
    }

    /// Overwrite an existing file.
    ///
    /// `url_path` is the path as it appeared in the request URL; the body's
    /// declared `path` must match it exactly or nothing is written.
    pub fn write(
        &self,
        file: &AuthorizedPath,
        url_path: &str,
        request: &WriteRequest,
    ) -> ConnectorResult<FileRecord> {
        if request.path != url_path {
            warn!(url_path = %url_path, body_path = %request.path, "Write path mismatch");
            return Err(ConnectorError::BadRequest("path mismatch".to_string()));
        }
        if file.kind() == EntryKind::Directory {
            return Err(ConnectorError::BadRequest(format!(
                "'{}' is a directory",
                url_path
            )));
        }

        let bytes = request.bytes()?;
        overwrite_in_place(file.canonical(), &bytes).map_err(|e| {
            warn!(path = %file.relative(), error = %e, "Failed to write file");
            ConnectorError::NotFound(display_path(file.relative()))
        })?;
        info!(path = %file.relative(), size = bytes.len(), "File written");

        self.read(file)
    }

    /// Create a new file, along with any missing parent directories.
    pub fn create(&self, target: &NewPath, request: &CreateRequest) -> ConnectorResult<FileRecord> {
        let bytes = request.bytes()?;

        let parent = target.parent();
        fs::create_dir_all(&parent).map_err(|e| {
            warn!(path = %target.relative(), error = %e, "Failed to create parent directories");
            ConnectorError::NotFound(target.relative().to_string())
        })?;

        // Re-check the parent now that it exists.
        let parent_canonical = fs::canonicalize(&parent)
            .map_err(|_| ConnectorError::NotFound(target.relative().to_string()))?;
        if !self.guard.contains(&parent_canonical) {
            return Err(ConnectorError::Forbidden(target.relative().to_string()));
        }

        let path = parent_canonical.join(target.name());
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                io::ErrorKind::AlreadyExists => ConnectorError::BadRequest(format!(
                    "File '{}' already exists",
                    target.relative()
                )),
                _ => {
                    warn!(path = %target.relative(), error = %e, "Failed to create file");
                    ConnectorError::NotFound(target.relative().to_string())
                }
            })?;

        let written = file.write_all(&bytes).and_then(|_| file.sync_all());
        if let Err(e) = written {
            warn!(path = %target.relative(), error = %e, "Failed to write new file");
            let _ = fs::remove_file(&path);
            return Err(ConnectorError::NotFound(target.relative().to_string()));
        }
        info!(path = %target.relative(), size = bytes.len(), "File created");

        let created = self.guard.authorize(target.relative())?;
        self.read(&created)
    }
}

/// Label for a path in messages; the root has an empty relative path.
fn display_path(relative: &str) -> String {
    if relative.is_empty() {
        "/".to_string()
    } else {
        relative.to_string()
    }
}

/// Read a file and the modification time of the same open handle.
fn read_with_mtime(path: &Path) -> io::Result<(Vec<u8>, f64)> {
    let mut file = File::open(path)?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    let modified = file.metadata()?.modified()?;
    Ok((bytes, seconds_since_epoch(modified)))
}

fn seconds_since_epoch(time: SystemTime) -> f64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Truncate `path` and write `bytes` into the same inode.
fn overwrite_in_place(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if fs::metadata(path)?.permissions().readonly() {
        return Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "file is read-only",
        ));
    }

    let mut file = OpenOptions::new().write(true).open(path)?;
    file.set_len(0)?;
    file.write_all(bytes)?;
    file.sync_all()
}
