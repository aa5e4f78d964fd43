//! Error type for the wire client.

use thiserror::Error;

use crate::codec::CodecError;

/// Failures surfaced across the wire-crate boundary.
///
/// `Clone` is required because a single transport failure fans out to every
/// pending request and active stream on the session.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WireError {
    /// The server refused the credential, either at the HTTP upgrade or with
    /// a post-upgrade close.
    #[error("authentication rejected: {0}")]
    AuthRejected(String),

    /// The socket broke or closed mid-session. Sessions are never reused
    /// after this.
    #[error("transport broken: {0}")]
    Transport(String),

    /// A frame failed to decode. Fatal for the session.
    #[error("wire decoding failed: {0}")]
    Codec(String),

    /// The server answered a correlated request with an error frame.
    #[error("server error [{code}]: {message}")]
    Server { code: String, message: String },

    /// No usable quote batch arrived before the first-batch deadline.
    #[error("no quotes arrived before the deadline")]
    NoQuotes,
}

impl From<CodecError> for WireError {
    fn from(err: CodecError) -> Self {
        WireError::Codec(err.to_string())
    }
}
