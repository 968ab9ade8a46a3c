//! Wire envelope for requests and responses.
//!
//! Every message on the stream is base64 text. A request is a JSON object
//! serialized before encoding; a response is a plain string.
//!
//! ## Wire Format
//!
//! ```text
//! Request:  base64({"command": "check_local_file", "args": {"filepath": "a.txt", ...}})
//! Response: base64([0, 17])
//! ```
//!
//! There is no length prefix. A message must fit in a single bounded read
//! on the receiving side, and is sent with a single write.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Command arguments. A `null` value is accepted on the wire and treated
/// the same as an absent key by the dispatcher.
pub type Args = HashMap<String, Option<String>>;

/// A decoded client request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Command name, resolved against the dispatcher's table
    pub command: String,
    /// Command-specific arguments
    pub args: Args,
}

impl Request {
    /// Create a request with no arguments.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Args::new(),
        }
    }

    /// Add an argument, builder style.
    pub fn arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.insert(key.into(), Some(value.into()));
        self
    }
}

/// Envelope decoding errors
#[derive(Debug)]
pub enum EnvelopeError {
    /// Nothing was read
    Empty,
    /// Bytes are not valid base64
    Base64(base64::DecodeError),
    /// Decoded bytes are not UTF-8
    Utf8(std::string::FromUtf8Error),
    /// Payload is not a well-formed request object
    Json(serde_json::Error),
}

impl std::fmt::Display for EnvelopeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnvelopeError::Empty => write!(f, "Empty envelope"),
            EnvelopeError::Base64(e) => write!(f, "Invalid base64 envelope: {}", e),
            EnvelopeError::Utf8(e) => write!(f, "Envelope payload is not UTF-8: {}", e),
            EnvelopeError::Json(e) => write!(f, "Invalid request payload: {}", e),
        }
    }
}

impl std::error::Error for EnvelopeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EnvelopeError::Empty => None,
            EnvelopeError::Base64(e) => Some(e),
            EnvelopeError::Utf8(e) => Some(e),
            EnvelopeError::Json(e) => Some(e),
        }
    }
}

impl From<base64::DecodeError> for EnvelopeError {
    fn from(error: base64::DecodeError) -> Self {
        EnvelopeError::Base64(error)
    }
}

impl From<std::string::FromUtf8Error> for EnvelopeError {
    fn from(error: std::string::FromUtf8Error) -> Self {
        EnvelopeError::Utf8(error)
    }
}

impl From<serde_json::Error> for EnvelopeError {
    fn from(error: serde_json::Error) -> Self {
        EnvelopeError::Json(error)
    }
}

/// Wrap a payload for the wire.
pub fn encode(payload: &str) -> Vec<u8> {
    STANDARD.encode(payload.as_bytes()).into_bytes()
}

/// Unwrap a payload read from the wire.
///
/// Leading and trailing ASCII whitespace is ignored. Anything else outside
/// the base64 alphabet, including line breaks inside the payload, is
/// rejected rather than skipped.
pub fn decode(input: &[u8]) -> Result<String, EnvelopeError> {
    let trimmed = input.trim_ascii();
    if trimmed.is_empty() {
        return Err(EnvelopeError::Empty);
    }
    let raw = STANDARD.decode(trimmed)?;
    Ok(String::from_utf8(raw)?)
}

/// Serialize and wrap a request.
pub fn encode_request(request: &Request) -> Result<Vec<u8>, EnvelopeError> {
    let json = serde_json::to_string(request)?;
    Ok(encode(&json))
}

/// Unwrap and parse a request.
pub fn decode_request(input: &[u8]) -> Result<Request, EnvelopeError> {
    let json = decode(input)?;
    Ok(serde_json::from_str(&json)?)
}
