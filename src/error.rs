//! Error types for the SCEP server core.
//!
//! This module defines all error types that can occur while servicing SCEP
//! operations, from HTTP-surface input problems to CMS decoding and reply
//! construction failures.

use thiserror::Error;

/// Result type alias using [`ScepError`].
pub type Result<T> = std::result::Result<T, ScepError>;

/// Errors that can occur while servicing a SCEP request.
///
/// The variants map onto the protocol's error taxonomy: protocol-input
/// errors are client-visible HTTP errors (400/405), everything else
/// surfaces as a 500 without a `CertRep` (the client is not authenticated
/// at the point these occur).
#[derive(Debug, Error)]
pub enum ScepError {
    /// The `operation` query parameter was missing.
    #[error("Missing \"operation\" parameter.")]
    MissingOperation,

    /// The `operation` query parameter named an unknown operation.
    #[error("Invalid \"operation\" parameter.")]
    InvalidOperation,

    /// The `message` query parameter was not valid Base64.
    #[error("Invalid \"message\" parameter.")]
    InvalidMessage(#[source] base64::DecodeError),

    /// The HTTP method is not allowed for the requested operation.
    #[error("method not allowed")]
    MethodNotAllowed {
        /// Value for the `Allow` response header.
        allow: &'static str,
    },

    /// Failed to decode a pkiMessage: CMS parsing, signature verification,
    /// missing signed attributes, or inner-content decryption.
    #[error("pkiMessage decoding error: {0}")]
    MessageDecoding(String),

    /// Failed to encode a pkiMessage reply.
    #[error("pkiMessage encoding error: {0}")]
    MessageEncoding(String),

    /// DER encoding/decoding error.
    #[error("DER error: {0}")]
    Der(#[from] der::Error),

    /// Cryptographic operation failed while building a reply.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// CA backend infrastructure fault (not a domain refusal).
    #[error("CA backend error: {0}")]
    Backend(String),
}

impl ScepError {
    /// Create a message decoding error with the given reason.
    pub fn decoding(msg: impl Into<String>) -> Self {
        Self::MessageDecoding(msg.into())
    }

    /// Create a message encoding error with the given reason.
    pub fn encoding(msg: impl Into<String>) -> Self {
        Self::MessageEncoding(msg.into())
    }

    /// Create a crypto error with the given reason.
    pub fn crypto(msg: impl Into<String>) -> Self {
        Self::Crypto(msg.into())
    }

    /// Create a backend infrastructure error with the given reason.
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Returns true if this error belongs to the protocol-input class,
    /// i.e. it is reported to the client as a 400/405 rather than a 500.
    pub fn is_protocol_input(&self) -> bool {
        matches!(
            self,
            Self::MissingOperation
                | Self::InvalidOperation
                | Self::InvalidMessage(_)
                | Self::MethodNotAllowed { .. }
        )
    }
}
