//! Sandboxed file access.
//!
//! [`PathGuard`] turns client-supplied path strings into paths proven to lie
//! inside the sandbox root, and [`FileService`] performs the actual list,
//! read, write and create operations on those paths.
//!
//! # Security
//!
//! Every path is canonicalized before it is compared against the root, so
//! `..` segments and symlinks pointing outside the sandbox are rejected.
//! Blacklisted paths (the configuration file, the running executable) are
//! never listed, served or created.

pub mod guard;
pub mod service;

pub use guard::{AuthorizedPath, GuardError, NewPath, PathGuard};
pub use service::{FileService, Resource};
