//! Shared-secret authentication for connector requests.
//!
//! The connector knows one credential: the exact `Authorization` header value
//! a client must present (`Basic base64(username:password)`). Presented
//! values are compared in constant time over their SHA-256 digests.

use std::fmt;

use axum::http::{header, HeaderMap};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Realm announced in the `WWW-Authenticate` challenge.
pub const REALM: &str = "fsconnector";

/// Authentication failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    /// No `Authorization` header, or one that is not valid text.
    #[error("missing credential")]
    Missing,

    /// A credential was presented but does not match.
    #[error("invalid credential")]
    Invalid,
}

/// The expected `Authorization` header value.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Build the Basic credential for a username/password pair.
    pub fn basic(username: &str, password: &str) -> Self {
        let token = STANDARD.encode(format!("{}:{}", username, password));
        Self(format!("Basic {}", token))
    }

    /// Use a raw header value as the credential.
    pub fn from_header_value(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The header value clients must send.
    pub fn header_value(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(****)")
    }
}

/// Checks presented credentials against the configured one.
#[derive(Debug, Clone)]
pub struct CredentialGate {
    expected: [u8; 32],
    challenge: String,
}

impl CredentialGate {
    /// Create a gate for the given credential.
    pub fn new(credential: &Credential) -> Self {
        Self {
            expected: digest(credential.header_value()),
            challenge: format!("Basic realm=\"{}\"", REALM),
        }
    }

    /// Check a presented `Authorization` value.
    pub fn authenticate(&self, presented: Option<&str>) -> Result<(), AuthError> {
        let presented = presented.ok_or(AuthError::Missing)?;
        if constant_time_eq(&digest(presented), &self.expected) {
            Ok(())
        } else {
            Err(AuthError::Invalid)
        }
    }

    /// Check the `Authorization` header of a request.
    pub fn validate_headers(&self, headers: &HeaderMap) -> Result<(), AuthError> {
        let presented = match headers.get(header::AUTHORIZATION) {
            Some(value) => Some(value.to_str().map_err(|_| AuthError::Missing)?),
            None => None,
        };
        self.authenticate(presented)
    }

    /// Value of the `WWW-Authenticate` header sent with a 401.
    pub fn challenge(&self) -> &str {
        &self.challenge
    }
}

fn digest(value: &str) -> [u8; 32] {
    Sha256::digest(value.as_bytes()).into()
}

fn constant_time_eq(a: &[u8; 32], b: &[u8; 32]) -> bool {
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
