//! # fsconnector Protocol Library
//!
//! Wire-level types shared by the fsconnector server and its clients.
//!
//! ## Overview
//!
//! Every HTTP response body produced by the connector is an [`Envelope`]:
//! a JSON object with exactly two keys, `status` and `data`.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  Envelope { status, data }              │  JSON
//! ├─────────────────────────────────────────┤
//! │  DirectoryEntry[] | FileRecord | String │  payload
//! ├─────────────────────────────────────────┤
//! │  HTTP (status code from ErrorKind)      │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```rust
//! use protocol::{DirectoryEntry, EntryKind, Envelope};
//!
//! let entries = vec![DirectoryEntry::new("notes.txt", "docs/notes.txt", EntryKind::File)];
//! let bytes = Envelope::success(entries).to_json().unwrap();
//! assert!(String::from_utf8(bytes).unwrap().starts_with(r#"{"status":"success""#));
//! ```
//!
//! ## Modules
//!
//! - [`envelope`]: Success/failure envelope and its JSON codec
//! - [`records`]: Directory entries, file records and request bodies
//! - [`error`]: Error taxonomy and codec errors

pub mod envelope;
pub mod error;
pub mod records;

pub use envelope::{Envelope, Status};
pub use error::{ErrorKind, ProtocolError, Result};
pub use records::{
    ContentEncoding, CreateRequest, DirectoryEntry, EntryKind, FileRecord, WriteRequest,
};
