//! Error types for the Neovim RPC client.
//!
//! Errors fall into two groups: fatal ones that tear down the whole session and
//! are broadcast to every outstanding call (`Codec`, `ConnectionClosed`), and
//! per-call ones that only affect the request that raised them.

use rmpv::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Error type id Neovim uses for generic failures.
pub const EXCEPTION_ERROR_TYPE: i64 = 0;
/// Error type id Neovim uses for argument validation failures.
pub const VALIDATION_ERROR_TYPE: i64 = 1;

/// Main error type for the client.
///
/// Cloneable so that a single transport failure can resolve every outstanding
/// call with the same error.
#[derive(Debug, Clone, Error)]
pub enum NvimError {
    // Session-fatal errors
    #[error("Codec error: {message}")]
    Codec { message: String },

    #[error("Connection closed: {reason}")]
    ConnectionClosed { reason: String },

    // Per-call errors
    #[error("RPC error{}: {message}", kind_suffix(.kind))]
    Rpc {
        /// Error type id reported by the peer, when present.
        code: Option<i64>,
        /// Error type name resolved from API metadata.
        kind: Option<String>,
        message: String,
    },

    #[error("Unknown method: {method}")]
    UnknownMethod { method: String },

    #[error("Index {index} out of bounds for length {length}")]
    Index { index: i64, length: usize },

    #[error("Invalid argument: {message}")]
    Argument { message: String },

    #[error("Request {id} ({method}) timed out after {timeout:?}")]
    Timeout {
        id: u64,
        method: String,
        timeout: Duration,
    },

    // Metadata and decoding errors
    #[error("API metadata error: {message}")]
    Metadata { message: String },

    #[error("Unexpected value for {context}: {message}")]
    Decode { context: String, message: String },

    // Transport construction errors
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<Arc<std::io::Error>>,
    },
}

fn kind_suffix(kind: &Option<String>) -> String {
    kind.as_ref().map(|k| format!(" ({k})")).unwrap_or_default()
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, NvimError>;

impl From<std::io::Error> for NvimError {
    fn from(err: std::io::Error) -> Self {
        NvimError::Io {
            message: err.to_string(),
            source: Some(Arc::new(err)),
        }
    }
}

impl From<rmpv::decode::Error> for NvimError {
    fn from(err: rmpv::decode::Error) -> Self {
        NvimError::Codec {
            message: err.to_string(),
        }
    }
}

impl From<rmpv::encode::Error> for NvimError {
    fn from(err: rmpv::encode::Error) -> Self {
        NvimError::Codec {
            message: err.to_string(),
        }
    }
}

impl From<rmpv::ext::Error> for NvimError {
    fn from(err: rmpv::ext::Error) -> Self {
        NvimError::Decode {
            context: "msgpack value".to_string(),
            message: err.to_string(),
        }
    }
}

impl NvimError {
    /// Build an `Rpc` error from the error payload of a response frame.
    ///
    /// Neovim reports errors as `[type_id, message]`; older peers and other
    /// msgpack-RPC servers may send a bare string or an arbitrary value.
    pub fn from_peer(payload: Value) -> Self {
        match payload {
            Value::Array(items) if items.len() == 2 => {
                let code = items[0].as_i64();
                let message = match &items[1] {
                    Value::String(s) => s.as_str().unwrap_or_default().to_string(),
                    other => other.to_string(),
                };
                NvimError::Rpc {
                    code,
                    kind: None,
                    message,
                }
            }
            Value::String(s) => NvimError::Rpc {
                code: None,
                kind: None,
                message: s.into_str().unwrap_or_default(),
            },
            other => NvimError::Rpc {
                code: None,
                kind: None,
                message: other.to_string(),
            },
        }
    }

    /// Shorthand for a `Decode` error.
    pub fn decode(context: impl Into<String>, message: impl Into<String>) -> Self {
        NvimError::Decode {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Whether this error ends the session for every outstanding call.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            NvimError::Codec { .. } | NvimError::ConnectionClosed { .. }
        )
    }

    /// Map to the error type id sent back to the peer.
    ///
    /// Validation failures on our side use Neovim's `Validation` id; everything
    /// else is reported as an `Exception`.
    pub fn to_error_code(&self) -> i64 {
        match self {
            NvimError::Rpc { code: Some(code), .. } => *code,

            NvimError::UnknownMethod { .. }
            | NvimError::Index { .. }
            | NvimError::Argument { .. }
            | NvimError::Decode { .. } => VALIDATION_ERROR_TYPE,

            _ => EXCEPTION_ERROR_TYPE,
        }
    }

    /// Encode this error as a response error payload: `[type_id, message]`.
    pub fn to_error_payload(&self) -> Value {
        let message = match self {
            NvimError::Rpc { message, .. } => message.clone(),
            other => other.to_string(),
        };
        Value::Array(vec![Value::from(self.to_error_code()), Value::from(message)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = NvimError::UnknownMethod {
            method: "bad_method".into(),
        };
        assert_eq!(err.to_string(), "Unknown method: bad_method");

        let err = NvimError::Rpc {
            code: Some(0),
            kind: Some("Exception".into()),
            message: "E492: Not an editor command".into(),
        };
        assert_eq!(
            err.to_string(),
            "RPC error (Exception): E492: Not an editor command"
        );
    }

    #[test]
    fn test_from_peer_array_payload() {
        let payload = Value::Array(vec![Value::from(1), Value::from("Wrong type for argument 1")]);
        match NvimError::from_peer(payload) {
            NvimError::Rpc { code, message, .. } => {
                assert_eq!(code, Some(1));
                assert_eq!(message, "Wrong type for argument 1");
            }
            other => panic!("Expected Rpc error, got: {:?}", other),
        }
    }

    #[test]
    fn test_from_peer_string_payload() {
        match NvimError::from_peer(Value::from("boom")) {
            NvimError::Rpc { code, message, .. } => {
                assert_eq!(code, None);
                assert_eq!(message, "boom");
            }
            other => panic!("Expected Rpc error, got: {:?}", other),
        }
    }

    #[test]
    fn test_fatal_classification() {
        assert!(NvimError::ConnectionClosed {
            reason: "eof".into()
        }
        .is_fatal());
        assert!(NvimError::Codec {
            message: "bad tag".into()
        }
        .is_fatal());
        assert!(!NvimError::Timeout {
            id: 1,
            method: "nvim_eval".into(),
            timeout: Duration::from_millis(10),
        }
        .is_fatal());
    }

    #[test]
    fn test_error_payload_codes() {
        let payload = NvimError::Argument {
            message: "start > end".into(),
        }
        .to_error_payload();
        let items = payload.as_array().unwrap();
        assert_eq!(items[0].as_i64(), Some(VALIDATION_ERROR_TYPE));
        assert_eq!(items[1].as_str(), Some("Invalid argument: start > end"));

        let payload = NvimError::ConnectionClosed {
            reason: "eof".into(),
        }
        .to_error_payload();
        assert_eq!(
            payload.as_array().unwrap()[0].as_i64(),
            Some(EXCEPTION_ERROR_TYPE)
        );
    }
}
