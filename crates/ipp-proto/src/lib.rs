//! IPP/1.1 binary message codec.
//!
//! Implements the wire encoding of RFC 8010: version, operation/status
//! code, request-id, and delimited attribute groups. The codec is
//! lossless on the attribute multimap for any message it accepts; it does
//! not interpret attribute semantics beyond the value-tag taxonomy.

pub mod message;
pub mod tags;

// Re-exports for convenience
pub use message::{Attribute, IppMessage};
pub use tags::Operation;

/// IPP version encoded on every response (major, minor).
pub const IPP_VERSION: (u8, u8) = (1, 1);

/// Errors produced while decoding an IPP message.
#[derive(Debug, thiserror::Error)]
pub enum IppError {
    #[error("message truncated at byte {0}")]
    UnexpectedEof(usize),

    #[error("attribute encountered before any group delimiter")]
    AttributeOutsideGroup,

    #[error("zero-length attribute name with no preceding attribute in group")]
    MissingContinuationName,

    #[error("message ended without end-of-attributes tag")]
    MissingEndOfAttributes,
}

/// Result type alias for codec operations.
pub type Result<T> = std::result::Result<T, IppError>;
