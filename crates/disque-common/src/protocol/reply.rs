//! Disque Reply Types
//!
//! This module defines the closed set of reply kinds a Disque node can send
//! back for a command.

use bytes::Bytes;
use serde_json::Value;

use super::error::{DisqueError, Result};

/// A single decoded server reply.
///
/// Every kind of RESP reply a Disque node emits maps onto exactly one variant,
/// so callers dispatch on the variant instead of probing the shape of the data.
///
/// # Variants
///
/// - `Status`: simple string such as `OK` or `PONG`
/// - `Integer`: signed 64-bit integer
/// - `Bulk`: binary-safe string, `None` for the null bulk string
/// - `Error`: error reply with its raw text (e.g. `ERR unknown command 'FOOBAR'`)
/// - `Array`: ordered nested replies, `None` for the null array
///
/// # Example
///
/// ```
/// use disque_common::protocol::Reply;
///
/// let reply = Reply::Array(Some(vec![Reply::bulk("q1"), Reply::Integer(3)]));
/// assert_eq!(reply.as_array().map(|items| items.len()), Some(2));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Status(String),
    Integer(i64),
    Bulk(Option<Bytes>),
    Error(String),
    Array(Option<Vec<Reply>>),
}

impl Reply {
    /// Creates a non-null bulk reply.
    pub fn bulk(value: impl Into<Bytes>) -> Self {
        Reply::Bulk(Some(value.into()))
    }

    /// Creates a bulk reply from a string slice.
    pub fn bulk_str(value: &str) -> Self {
        Reply::Bulk(Some(Bytes::copy_from_slice(value.as_bytes())))
    }

    /// Creates a status reply.
    pub fn status(value: impl Into<String>) -> Self {
        Reply::Status(value.into())
    }

    /// Creates an error reply.
    pub fn error(value: impl Into<String>) -> Self {
        Reply::Error(value.into())
    }

    /// Creates a non-null array reply.
    pub fn array(items: Vec<Reply>) -> Self {
        Reply::Array(Some(items))
    }

    /// Whether this is a null bulk string or a null array.
    pub fn is_nil(&self) -> bool {
        matches!(self, Reply::Bulk(None) | Reply::Array(None))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }

    /// Returns the textual value of a status or bulk reply.
    ///
    /// Bulk payloads that are not valid UTF-8 yield `None`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Reply::Status(s) => Some(s),
            Reply::Bulk(Some(b)) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// Returns the integer value of an integer reply, or of a bulk/status
    /// reply holding a decimal number.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Reply::Integer(n) => Some(*n),
            Reply::Status(_) | Reply::Bulk(Some(_)) => self.as_str()?.parse().ok(),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Reply]> {
        match self {
            Reply::Array(Some(items)) => Some(items),
            _ => None,
        }
    }

    pub fn into_array(self) -> Option<Vec<Reply>> {
        match self {
            Reply::Array(Some(items)) => Some(items),
            _ => None,
        }
    }

    /// Extracts a string, failing with `InvalidResponse` for any other kind.
    pub fn into_string(self) -> Result<String> {
        match self {
            Reply::Status(s) => Ok(s),
            Reply::Bulk(Some(b)) => String::from_utf8(b.to_vec())
                .map_err(|e| DisqueError::InvalidResponse(format!("non UTF-8 bulk reply: {}", e))),
            other => Err(DisqueError::InvalidResponse(format!(
                "expected string reply, got {}",
                other.kind()
            ))),
        }
    }

    /// Extracts an integer, failing with `InvalidResponse` for any other kind.
    pub fn into_integer(self) -> Result<i64> {
        self.as_integer().ok_or_else(|| {
            DisqueError::InvalidResponse(format!("expected integer reply, got {}", self.kind()))
        })
    }

    /// Converts an error reply into a `Command` error, passing every other
    /// kind through untouched.
    pub fn into_result(self) -> Result<Reply> {
        match self {
            Reply::Error(text) => Err(DisqueError::Command(text)),
            other => Ok(other),
        }
    }

    /// Short name of the reply kind, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Reply::Status(_) => "status",
            Reply::Integer(_) => "integer",
            Reply::Bulk(Some(_)) => "bulk",
            Reply::Bulk(None) => "nil",
            Reply::Error(_) => "error",
            Reply::Array(Some(_)) => "array",
            Reply::Array(None) => "nil array",
        }
    }

    /// Converts the reply into a JSON value for display.
    ///
    /// Nulls map to `null`, arrays to JSON arrays, errors to `{"error": text}`
    /// and binary bulk strings are decoded lossily.
    pub fn to_json(&self) -> Value {
        match self {
            Reply::Status(s) => Value::String(s.clone()),
            Reply::Integer(n) => Value::from(*n),
            Reply::Bulk(Some(b)) => Value::String(String::from_utf8_lossy(b).into_owned()),
            Reply::Bulk(None) | Reply::Array(None) => Value::Null,
            Reply::Error(e) => serde_json::json!({ "error": e }),
            Reply::Array(Some(items)) => Value::Array(items.iter().map(Reply::to_json).collect()),
        }
    }
}

impl From<&Reply> for Value {
    fn from(reply: &Reply) -> Self {
        reply.to_json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_reply_becomes_command_error() {
        let err = Reply::error("ERR unknown command 'FOOBAR'").into_result().unwrap_err();
        assert!(err.is_command_error());
        assert!(err.to_string().starts_with("ERR unknown command"));
    }

    #[test]
    fn test_non_error_reply_passes_through() {
        let reply = Reply::status("PONG").into_result().unwrap();
        assert_eq!(reply, Reply::Status("PONG".to_string()));
    }

    #[test]
    fn test_as_integer_accepts_numeric_bulk() {
        assert_eq!(Reply::bulk_str("7711").as_integer(), Some(7711));
        assert_eq!(Reply::Integer(3).as_integer(), Some(3));
        assert_eq!(Reply::bulk_str("abc").as_integer(), None);
        assert_eq!(Reply::Bulk(None).as_integer(), None);
    }

    #[test]
    fn test_into_string_rejects_other_kinds() {
        assert!(Reply::Integer(1).into_string().is_err());
        assert_eq!(Reply::bulk_str("D-1").into_string().unwrap(), "D-1");
    }

    #[test]
    fn test_nil_detection() {
        assert!(Reply::Bulk(None).is_nil());
        assert!(Reply::Array(None).is_nil());
        assert!(!Reply::array(vec![]).is_nil());
    }

    #[test]
    fn test_to_json() {
        let reply = Reply::array(vec![
            Reply::bulk_str("q1"),
            Reply::Integer(2),
            Reply::Bulk(None),
            Reply::error("ERR x"),
        ]);
        assert_eq!(reply.to_json(), json!(["q1", 2, null, {"error": "ERR x"}]));
    }
}
