//! Payload records exchanged with connector clients.
//!
//! Listing returns [`DirectoryEntry`] values, reading and writing return a
//! [`FileRecord`]. Write and create bodies are parsed into [`WriteRequest`]
//! and [`CreateRequest`].

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ProtocolError, Result};

// ============================================================================
// Entries
// ============================================================================

/// Type of a sandbox entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Regular file.
    File,
    /// Directory.
    Directory,
}

/// One child of a listed directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Entry name (last path component).
    pub name: String,
    /// Path relative to the sandbox root, forward-slash separated.
    pub path: String,
    /// Entry type.
    pub kind: EntryKind,
}

impl DirectoryEntry {
    /// Create a new directory entry.
    pub fn new(name: impl Into<String>, path: impl Into<String>, kind: EntryKind) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            kind,
        }
    }
}

// ============================================================================
// File content
// ============================================================================

/// How file bytes are represented inside a JSON string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ContentEncoding {
    /// The bytes are valid UTF-8 and are carried verbatim.
    #[default]
    #[serde(rename = "utf-8")]
    Utf8,
    /// The bytes are carried as standard padded base64.
    #[serde(rename = "base64")]
    Base64,
}

impl ContentEncoding {
    /// Encode raw bytes, choosing UTF-8 when possible.
    pub fn encode(bytes: Vec<u8>) -> (String, ContentEncoding) {
        match String::from_utf8(bytes) {
            Ok(text) => (text, ContentEncoding::Utf8),
            Err(e) => (STANDARD.encode(e.into_bytes()), ContentEncoding::Base64),
        }
    }

    /// Decode a content string back into raw bytes.
    pub fn decode(self, content: &str) -> Result<Vec<u8>> {
        match self {
            ContentEncoding::Utf8 => Ok(content.as_bytes().to_vec()),
            ContentEncoding::Base64 => Ok(STANDARD.decode(content)?),
        }
    }
}

/// A file together with its content and metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    /// File name (last path component).
    pub name: String,
    /// Path relative to the sandbox root, forward-slash separated.
    pub path: String,
    /// Always [`EntryKind::File`].
    pub kind: EntryKind,
    /// File content, represented according to `encoding`.
    pub content: String,
    /// Representation used for `content`.
    pub encoding: ContentEncoding,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time, seconds since the Unix epoch.
    pub mtime: f64,
}

impl FileRecord {
    /// Build a record from raw bytes.
    pub fn from_bytes(
        name: impl Into<String>,
        path: impl Into<String>,
        bytes: Vec<u8>,
        mtime: f64,
    ) -> Self {
        let size = bytes.len() as u64;
        let (content, encoding) = ContentEncoding::encode(bytes);
        Self {
            name: name.into(),
            path: path.into(),
            kind: EntryKind::File,
            content,
            encoding,
            size,
            mtime,
        }
    }

    /// Raw bytes carried by this record.
    pub fn bytes(&self) -> Result<Vec<u8>> {
        self.encoding.decode(&self.content)
    }
}

// ============================================================================
// Request bodies
// ============================================================================

/// Body of a `PUT` (overwrite) request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteRequest {
    /// Declared target path; must equal the path in the URL.
    pub path: String,
    /// New content.
    pub content: String,
    /// Representation of `content`.
    pub encoding: ContentEncoding,
}

impl WriteRequest {
    /// Parse a write body, naming the first missing field.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let object = parse_object(bytes)?;
        Ok(Self {
            path: required_string(&object, "path")?,
            content: required_string(&object, "content")?,
            encoding: optional_encoding(&object)?,
        })
    }

    /// Decoded bytes of `content`.
    pub fn bytes(&self) -> Result<Vec<u8>> {
        self.encoding.decode(&self.content)
    }
}

/// Body of a `POST` (create) request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateRequest {
    /// Initial content.
    pub content: String,
    /// Representation of `content`.
    pub encoding: ContentEncoding,
}

impl CreateRequest {
    /// Parse a create body, naming the missing field.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let object = parse_object(bytes)?;
        Ok(Self {
            content: required_string(&object, "content")?,
            encoding: optional_encoding(&object)?,
        })
    }

    /// Decoded bytes of `content`.
    pub fn bytes(&self) -> Result<Vec<u8>> {
        self.encoding.decode(&self.content)
    }
}

fn parse_object(bytes: &[u8]) -> Result<Map<String, Value>> {
    match serde_json::from_slice::<Value>(bytes)? {
        Value::Object(object) => Ok(object),
        _ => Err(ProtocolError::Deserialization(
            "request body must be a JSON object".to_string(),
        )),
    }
}

fn required_string(object: &Map<String, Value>, field: &'static str) -> Result<String> {
    match object.get(field) {
        None | Some(Value::Null) => Err(ProtocolError::MissingField(field)),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(ProtocolError::InvalidField {
            field,
            reason: "expected a string".to_string(),
        }),
    }
}

fn optional_encoding(object: &Map<String, Value>) -> Result<ContentEncoding> {
    match object.get("encoding") {
        None | Some(Value::Null) => Ok(ContentEncoding::default()),
        Some(value) => {
            serde_json::from_value(value.clone()).map_err(|_| ProtocolError::InvalidField {
                field: "encoding",
                reason: "expected \"utf-8\" or \"base64\"".to_string(),
            })
        }
    }
}
