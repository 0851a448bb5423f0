//! Encoding detection and decoding of inbound XML bytes.
//!
//! Accepted: UTF-8 (declared, undeclared, or with BOM) and ISO-8859-1.
//! Anything else, including UTF-16, is refused rather than guessed.

use crate::xml::XmlError;
use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];
const PROLOG_SCAN: usize = 512;

static ENCODING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"encoding\s*=\s*["']([A-Za-z0-9._\-]{1,40})["']"#).unwrap()
});

/// Supported source encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceEncoding {
    Utf8,
    Latin1,
}

impl SourceEncoding {
    fn from_label(label: &str) -> Option<Self> {
        match label.to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Some(Self::Utf8),
            "iso-8859-1" | "iso8859-1" | "iso_8859-1" | "latin1" | "latin-1" | "l1" => {
                Some(Self::Latin1)
            }
            _ => None,
        }
    }
}

/// Encoding label from the XML declaration, if one is present.
pub fn declared_encoding(bytes: &[u8]) -> Option<String> {
    let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    if !body.starts_with(b"<?xml") {
        return None;
    }
    let scan = &body[..body.len().min(PROLOG_SCAN)];
    let end = scan.windows(2).position(|w| w == b"?>")?;
    let prolog = String::from_utf8_lossy(&scan[..end]);
    ENCODING_RE
        .captures(&prolog)
        .map(|caps| caps[1].to_string())
}

/// Decode document bytes to text according to the declared encoding.
pub fn decode(bytes: &[u8]) -> Result<Cow<'_, str>, XmlError> {
    if bytes.starts_with(&[0xFE, 0xFF]) || bytes.starts_with(&[0xFF, 0xFE]) {
        return Err(XmlError::EncodingError {
            reason: "UTF-16 documents are not accepted".to_string(),
        });
    }

    let has_bom = bytes.starts_with(UTF8_BOM);
    let encoding = match declared_encoding(bytes) {
        None => SourceEncoding::Utf8,
        Some(label) => SourceEncoding::from_label(&label).ok_or_else(|| XmlError::EncodingError {
            reason: format!("unsupported declared encoding {label}"),
        })?,
    };

    match encoding {
        SourceEncoding::Utf8 => {
            let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
            std::str::from_utf8(body)
                .map(Cow::Borrowed)
                .map_err(|e| XmlError::EncodingError {
                    reason: format!("invalid UTF-8 at byte {}", e.valid_up_to()),
                })
        }
        SourceEncoding::Latin1 if has_bom => Err(XmlError::EncodingError {
            reason: "UTF-8 byte-order mark on a document declared ISO-8859-1".to_string(),
        }),
        SourceEncoding::Latin1 => Ok(Cow::Owned(bytes.iter().map(|&b| b as char).collect())),
    }
}
