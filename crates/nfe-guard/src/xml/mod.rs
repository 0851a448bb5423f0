//! Defensive XML intake: size ceiling, encoding check, XXE refusal,
//! well-formedness, and bounded tree construction.
//!
//! ```text
//! bytes ─→ size check ─→ decode (UTF-8 / ISO-8859-1)
//!       ─→ quick-xml event loop (DOCTYPE screened, limits enforced)
//!       ─→ ParsedRecord
//! ```

pub mod document;
pub mod encoding;
pub mod parser;

pub use document::{Document, ParsedRecord, XmlNode};
pub use parser::{ParserLimits, SafeXmlParser};

use thiserror::Error;

/// Structural rejection of a document. Fatal to that document only.
///
/// Messages never quote document content.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum XmlError {
    #[error("document exceeds the {limit}-byte size limit")]
    SizeExceeded { size: usize, limit: usize },
    #[error("external entity or DTD reference refused ({construct})")]
    XxeAttempt { construct: &'static str },
    #[error("malformed XML at byte {position}: {reason}")]
    MalformedXml { position: u64, reason: &'static str },
    #[error("encoding error: {reason}")]
    EncodingError { reason: String },
    #[error("document exceeds the {what} limit of {max}")]
    LimitExceeded { what: &'static str, max: usize },
    #[error("root element is not an NF-e document")]
    UnexpectedRoot,
    #[error("content type is not XML")]
    UnsupportedContentType,
    #[error("document stream could not be read")]
    Unreadable,
}

impl XmlError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            XmlError::SizeExceeded { .. } => "size_exceeded",
            XmlError::XxeAttempt { .. } => "xxe_attempt",
            XmlError::MalformedXml { .. } => "malformed_xml",
            XmlError::EncodingError { .. } => "encoding_error",
            XmlError::LimitExceeded { .. } => "limit_exceeded",
            XmlError::UnexpectedRoot => "unexpected_root",
            XmlError::UnsupportedContentType => "unsupported_content_type",
            XmlError::Unreadable => "unreadable",
        }
    }
}
