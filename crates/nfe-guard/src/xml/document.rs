//! Inbound documents and the parsed node tree.

use crate::xml::encoding;
use crate::xml::XmlError;
use std::io::Read;

/// Raw inbound document. Immutable once received.
#[derive(Debug, Clone)]
pub struct Document {
    bytes: Vec<u8>,
    declared_encoding: Option<String>,
    content_type: Option<String>,
    name: Option<String>,
}

impl Document {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        let bytes = bytes.into();
        let declared_encoding = encoding::declared_encoding(&bytes);
        Self {
            bytes,
            declared_encoding,
            content_type: None,
            name: None,
        }
    }

    /// Read a document from a stream, stopping one byte past `max_size`.
    ///
    /// An oversized stream yields `SizeExceeded` without being read to the end.
    pub fn from_reader(reader: impl Read, max_size: usize) -> Result<Self, XmlError> {
        let cap = u64::try_from(max_size).unwrap_or(u64::MAX).saturating_add(1);
        let mut bytes = Vec::new();
        reader
            .take(cap)
            .read_to_end(&mut bytes)
            .map_err(|_| XmlError::Unreadable)?;
        if bytes.len() > max_size {
            return Err(XmlError::SizeExceeded {
                size: bytes.len(),
                limit: max_size,
            });
        }
        Ok(Self::new(bytes))
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// File name or other label used in audit events.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Encoding named in the XML declaration, if any.
    pub fn declared_encoding(&self) -> Option<&str> {
        self.declared_encoding.as_deref()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("<unnamed>")
    }

    /// Whether the declared content type is an XML media type.
    /// Documents without a content type are accepted.
    pub fn has_xml_content_type(&self) -> bool {
        let Some(content_type) = &self.content_type else {
            return true;
        };
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        mime == "application/xml" || mime == "text/xml" || mime.ends_with("+xml")
    }
}

/// One element of a parsed document.
///
/// Names are namespace-local: `<nfe:infNFe>` and `<infNFe xmlns="...">` both
/// become `infNFe`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlNode {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Direct child with the given name.
    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// First descendant (depth-first, document order) with the given name.
    pub fn find(&self, name: &str) -> Option<&XmlNode> {
        let mut stack: Vec<&XmlNode> = self.children.iter().rev().collect();
        while let Some(node) = stack.pop() {
            if node.name == name {
                return Some(node);
            }
            stack.extend(node.children.iter().rev());
        }
        None
    }

    /// Every descendant with the given name, in document order.
    pub fn find_all(&self, name: &str) -> Vec<&XmlNode> {
        let mut found = Vec::new();
        let mut stack: Vec<&XmlNode> = self.children.iter().rev().collect();
        while let Some(node) = stack.pop() {
            if node.name == name {
                found.push(node);
            }
            stack.extend(node.children.iter().rev());
        }
        found
    }

    /// Follow a chain of direct children.
    pub fn path(&self, segments: &[&str]) -> Option<&XmlNode> {
        segments
            .iter()
            .try_fold(self, |node, segment| node.child(segment))
    }

    /// Text content of the first descendant named `name`, trimmed.
    pub fn text_of(&self, name: &str) -> Option<&str> {
        self.find(name)
            .map(|n| n.text.trim())
            .filter(|t| !t.is_empty())
    }
}

/// Tree produced from a document that passed structural validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRecord {
    root: XmlNode,
    element_count: usize,
}

impl ParsedRecord {
    pub(crate) fn new(root: XmlNode, element_count: usize) -> Self {
        Self {
            root,
            element_count,
        }
    }

    pub fn root(&self) -> &XmlNode {
        &self.root
    }

    pub fn element_count(&self) -> usize {
        self.element_count
    }

    pub fn into_root(self) -> XmlNode {
        self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> XmlNode {
        let mut root = XmlNode::new("NFe");
        let mut inf = XmlNode::new("infNFe");
        inf.attributes.push(("Id".into(), "NFe123".into()));
        let mut ide = XmlNode::new("ide");
        let mut nnf = XmlNode::new("nNF");
        nnf.text = " 42 ".into();
        ide.children.push(nnf);
        inf.children.push(ide);
        for code in ["A", "B"] {
            let mut det = XmlNode::new("det");
            let mut prod = XmlNode::new("prod");
            prod.text = code.into();
            det.children.push(prod);
            inf.children.push(det);
        }
        root.children.push(inf);
        root
    }

    #[test]
    fn test_find_and_path() {
        let root = sample();
        assert_eq!(root.text_of("nNF"), Some("42"));
        assert!(root.path(&["infNFe", "ide", "nNF"]).is_some());
        assert!(root.path(&["infNFe", "nNF"]).is_none());
        assert_eq!(root.find("infNFe").unwrap().attr("Id"), Some("NFe123"));
    }

    #[test]
    fn test_find_all_document_order() {
        let root = sample();
        let prods: Vec<&str> = root.find_all("prod").iter().map(|p| p.text.as_str()).collect();
        assert_eq!(prods, vec!["A", "B"]);
        assert_eq!(root.find("infNFe").unwrap().children_named("det").count(), 2);
    }

    #[test]
    fn test_from_reader_stops_early() {
        struct Endless;
        impl Read for Endless {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                buf.fill(b'a');
                Ok(buf.len())
            }
        }
        let err = Document::from_reader(Endless, 1024).unwrap_err();
        assert!(matches!(err, XmlError::SizeExceeded { size: 1025, limit: 1024 }));
    }

    #[test]
    fn test_content_type() {
        let doc = Document::new(b"<a/>".to_vec());
        assert!(doc.clone().with_content_type("application/xml; charset=utf-8").has_xml_content_type());
        assert!(doc.clone().with_content_type("TEXT/XML").has_xml_content_type());
        assert!(!doc.clone().with_content_type("application/pdf").has_xml_content_type());
        assert!(doc.has_xml_content_type());
    }
}
