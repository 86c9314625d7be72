//! Uniform success/failure envelope for every connector response.
//!
//! The envelope carries exactly two fields: `status`, which is either
//! `"success"` or `"failure"`, and `data`, which holds the payload on success
//! or a human-readable message on failure.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Outcome literal carried in the `status` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// The operation completed and `data` holds its result.
    Success,
    /// The operation failed and `data` holds the reason.
    Failure,
}

/// Envelope wrapper for all response payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Envelope<T> {
    /// Whether the operation succeeded.
    pub status: Status,
    /// The payload or failure message.
    pub data: T,
}

impl<T> Envelope<T> {
    /// Wrap `data` with an explicit outcome.
    pub fn wrap(data: T, is_success: bool) -> Self {
        let status = if is_success {
            Status::Success
        } else {
            Status::Failure
        };
        Self { status, data }
    }

    /// Wrap a successful result.
    pub fn success(data: T) -> Self {
        Self::wrap(data, true)
    }

    /// Check whether this envelope reports success.
    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }
}

impl Envelope<String> {
    /// Wrap a failure message.
    pub fn failure(message: impl Into<String>) -> Self {
        Self::wrap(message.into(), false)
    }
}

impl<T: Serialize> Envelope<T> {
    /// Serialize the envelope to JSON bytes.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

impl<T: DeserializeOwned> Envelope<T> {
    /// Deserialize an envelope from JSON bytes.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProtocolError;
    use serde_json::Value;

    #[test]
    fn test_success_has_exactly_two_keys() {
        let bytes = Envelope::success(vec!["a", "b"]).to_json().unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();

        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 2);
        assert_eq!(object["status"], "success");
        assert_eq!(object["data"], serde_json::json!(["a", "b"]));
    }

    #[test]
    fn test_failure_carries_message() {
        let envelope = Envelope::failure("Not found: missing.txt");
        assert!(!envelope.is_success());

        let bytes = envelope.to_json().unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"status":"failure","data":"Not found: missing.txt"}"#
        );
    }

    #[test]
    fn test_wrap_selects_status() {
        assert_eq!(Envelope::wrap(1, true).status, Status::Success);
        assert_eq!(Envelope::wrap(1, false).status, Status::Failure);
    }

    #[test]
    fn test_from_json_parses_server_output() {
        let envelope: Envelope<String> =
            Envelope::from_json(br#"{"status":"success","data":"fsconnector/0.6.1"}"#).unwrap();
        assert!(envelope.is_success());
        assert_eq!(envelope.data, "fsconnector/0.6.1");
    }

    #[test]
    fn test_from_json_rejects_unknown_status() {
        let result: Result<Envelope<String>> =
            Envelope::from_json(br#"{"status":"error","data":"x"}"#);
        assert!(matches!(result, Err(ProtocolError::Deserialization(_))));
    }

    #[test]
    fn test_from_json_rejects_extra_keys() {
        let result: Result<Envelope<String>> =
            Envelope::from_json(br#"{"status":"success","data":"x","code":1}"#);
        assert!(result.is_err());
    }
}
