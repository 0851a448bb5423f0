//! Safe XML parser: refuses XXE and entity tricks, bounds every resource.

use crate::audit::{AuditCategory, AuditEvent, SecurityAuditor, Severity};
use crate::config::GuardConfig;
use crate::xml::document::{Document, ParsedRecord, XmlNode};
use crate::xml::{encoding, XmlError};
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::Reader;
use std::io::Read;
use std::sync::Arc;

const XINCLUDE_NS: &str = "http://www.w3.org/2001/XInclude";

/// Resource bounds applied to every document.
#[derive(Debug, Clone)]
pub struct ParserLimits {
    /// Maximum document size in bytes.
    pub max_size: usize,
    /// Maximum element nesting depth.
    pub max_depth: usize,
    /// Maximum number of elements in the document.
    pub max_elements: usize,
    /// Accepted root element names. Empty accepts any root.
    pub expected_roots: Vec<String>,
}

impl Default for ParserLimits {
    fn default() -> Self {
        Self {
            max_size: 50 * 1024 * 1024,
            max_depth: 64,
            max_elements: 100_000,
            expected_roots: vec!["NFe".to_string(), "nfeProc".to_string()],
        }
    }
}

impl ParserLimits {
    pub fn from_config(config: &GuardConfig) -> Self {
        Self {
            max_size: config.max_document_bytes(),
            ..Self::default()
        }
    }

    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    /// Accept any root element.
    pub fn any_root(mut self) -> Self {
        self.expected_roots.clear();
        self
    }
}

/// Stateless-per-call XML parser. Every rejection is audited under
/// `xml_security`.
pub struct SafeXmlParser {
    limits: ParserLimits,
    auditor: Arc<SecurityAuditor>,
}

impl SafeXmlParser {
    pub fn new(limits: ParserLimits, auditor: Arc<SecurityAuditor>) -> Self {
        Self { limits, auditor }
    }

    pub fn limits(&self) -> &ParserLimits {
        &self.limits
    }

    /// Parse a received document.
    pub fn parse(&self, doc: &Document) -> Result<ParsedRecord, XmlError> {
        let result = if doc.has_xml_content_type() {
            self.parse_inner(doc.bytes())
        } else {
            Err(XmlError::UnsupportedContentType)
        };
        if let Err(error) = &result {
            self.report(doc.name(), doc.size(), error);
        }
        result
    }

    /// Parse raw bytes with no content type or name attached.
    pub fn parse_bytes(&self, bytes: &[u8]) -> Result<ParsedRecord, XmlError> {
        let result = self.parse_inner(bytes);
        if let Err(error) = &result {
            self.report("<bytes>", bytes.len(), error);
        }
        result
    }

    /// Read and parse a stream. An oversized stream is rejected after reading
    /// at most `max_size + 1` bytes.
    pub fn parse_reader(&self, reader: impl Read, name: &str) -> Result<ParsedRecord, XmlError> {
        match Document::from_reader(reader, self.limits.max_size) {
            Ok(doc) => self.parse(&doc.with_name(name)),
            Err(error) => {
                let size = match &error {
                    XmlError::SizeExceeded { size, .. } => *size,
                    _ => 0,
                };
                self.report(name, size, &error);
                Err(error)
            }
        }
    }

    fn parse_inner(&self, bytes: &[u8]) -> Result<ParsedRecord, XmlError> {
        if bytes.len() > self.limits.max_size {
            return Err(XmlError::SizeExceeded {
                size: bytes.len(),
                limit: self.limits.max_size,
            });
        }

        let text = encoding::decode(bytes)?;

        let mut reader = Reader::from_str(&text);
        reader.config_mut().trim_text(true);
        let mut buf = Vec::new();

        let mut stack: Vec<XmlNode> = Vec::new();
        let mut root: Option<XmlNode> = None;
        let mut elements = 0usize;

        loop {
            let event = reader
                .read_event_into(&mut buf)
                .map_err(|e| XmlError::MalformedXml {
                    position: reader.error_position(),
                    reason: describe(&e),
                })?;
            let position = reader.buffer_position();

            match event {
                Event::DocType(ref e) => screen_doctype(e)?,
                Event::Start(ref e) => {
                    self.admit_element(&stack, root.is_some(), &mut elements, position)?;
                    stack.push(open_element(e, position)?);
                }
                Event::Empty(ref e) => {
                    self.admit_element(&stack, root.is_some(), &mut elements, position)?;
                    let node = open_element(e, position)?;
                    attach(node, &mut stack, &mut root);
                }
                Event::End(_) => {
                    let node = stack
                        .pop()
                        .ok_or_else(|| malformed(position, "unmatched end tag"))?;
                    attach(node, &mut stack, &mut root);
                }
                Event::Text(ref e) => {
                    let text = e
                        .unescape()
                        .map_err(|_| malformed(position, "invalid entity reference"))?;
                    push_text(&mut stack, &text, position)?;
                }
                Event::CData(e) => {
                    let raw = e.into_inner();
                    push_text(&mut stack, &String::from_utf8_lossy(&raw), position)?;
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        if !stack.is_empty() {
            return Err(malformed(reader.buffer_position(), "unclosed element"));
        }
        let root = root.ok_or_else(|| malformed(reader.buffer_position(), "no root element"))?;

        if !self.limits.expected_roots.is_empty()
            && !self.limits.expected_roots.iter().any(|r| *r == root.name)
        {
            return Err(XmlError::UnexpectedRoot);
        }

        Ok(ParsedRecord::new(root, elements))
    }

    fn admit_element(
        &self,
        stack: &[XmlNode],
        root_closed: bool,
        elements: &mut usize,
        position: u64,
    ) -> Result<(), XmlError> {
        if stack.is_empty() && root_closed {
            return Err(malformed(position, "multiple root elements"));
        }
        if stack.len() >= self.limits.max_depth {
            return Err(XmlError::LimitExceeded {
                what: "nesting depth",
                max: self.limits.max_depth,
            });
        }
        *elements += 1;
        if *elements > self.limits.max_elements {
            return Err(XmlError::LimitExceeded {
                what: "element count",
                max: self.limits.max_elements,
            });
        }
        Ok(())
    }

    fn report(&self, subject: &str, size: usize, error: &XmlError) {
        let severity = match error {
            XmlError::XxeAttempt { .. } => Severity::Critical,
            XmlError::LimitExceeded { .. } => Severity::Error,
            _ => Severity::Warning,
        };
        self.auditor.log_event(
            AuditEvent::new(AuditCategory::XmlSecurity, severity, subject)
                .with_detail(error.to_string())
                .with_context("code", error.code())
                .with_context("size", size.to_string()),
        );
    }
}

/// Refuse any DOCTYPE that declares entities or points outside the document.
fn screen_doctype(doctype: &BytesText<'_>) -> Result<(), XmlError> {
    let decl = String::from_utf8_lossy(doctype).to_ascii_uppercase();
    let declares_entity = decl.contains("<!ENTITY");
    let external = decl.contains("SYSTEM") || decl.contains("PUBLIC");

    let construct = match (declares_entity, external) {
        (true, true) => "external entity",
        (true, false) => "entity declaration",
        (false, true) => "external DTD",
        (false, false) if decl.contains('%') => "parameter entity",
        (false, false) => return Ok(()),
    };
    Err(XmlError::XxeAttempt { construct })
}

fn open_element(e: &BytesStart<'_>, position: u64) -> Result<XmlNode, XmlError> {
    let mut node = XmlNode::new(String::from_utf8_lossy(e.local_name().as_ref()));

    for attr in e.attributes() {
        let attr = attr.map_err(|_| malformed(position, "invalid attribute"))?;
        let value = attr
            .unescape_value()
            .map_err(|_| malformed(position, "invalid entity reference"))?;

        let key = attr.key.as_ref();
        if key == b"xmlns" || key.starts_with(b"xmlns:") {
            if value.trim() == XINCLUDE_NS {
                return Err(XmlError::XxeAttempt {
                    construct: "xinclude",
                });
            }
            continue;
        }

        let local = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        node.attributes.push((local, value.into_owned()));
    }

    Ok(node)
}

fn attach(node: XmlNode, stack: &mut [XmlNode], root: &mut Option<XmlNode>) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => *root = Some(node),
    }
}

fn push_text(stack: &mut [XmlNode], text: &str, position: u64) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(node) => {
            node.text.push_str(text);
            Ok(())
        }
        None if text.trim().is_empty() => Ok(()),
        None => Err(malformed(position, "text outside the root element")),
    }
}

fn malformed(position: u64, reason: &'static str) -> XmlError {
    XmlError::MalformedXml { position, reason }
}

fn describe(error: &quick_xml::Error) -> &'static str {
    match error {
        quick_xml::Error::Syntax(_) => "syntax error",
        quick_xml::Error::IllFormed(_) => "mismatched or unexpected tag",
        quick_xml::Error::InvalidAttr(_) => "invalid attribute",
        _ => "unreadable markup",
    }
}
