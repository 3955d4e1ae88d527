//! Minimal XML element tree used by the XML serializers.
//!
//! Parsing goes through `quick-xml`; writing produces compact XML with escaped
//! attribute values and text.

use quick_xml::Reader;
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};

use crate::error::XmlError;

/// One XML element with attributes, text and child elements.
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

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Set an attribute, replacing an existing one of the same name.
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(key, _)| *key == name) {
            Some(entry) => entry.1 = value,
            None => self.attributes.push((name, value)),
        }
    }

    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    pub fn push_child(&mut self, child: XmlNode) {
        self.children.push(child);
    }

    /// Whether the element carries no data at all.
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty() && self.text.is_empty() && self.children.is_empty()
    }

    /// Parse a document and return its root element.
    pub fn parse(source: &str) -> Result<XmlNode, XmlError> {
        let mut reader = Reader::from_str(source);
        let mut stack: Vec<XmlNode> = Vec::new();
        let mut root: Option<XmlNode> = None;

        loop {
            match reader.read_event()? {
                Event::Start(ref start) => {
                    stack.push(Self::from_start(start)?);
                }
                Event::Empty(ref start) => {
                    let node = Self::from_start(start)?;
                    Self::attach(&mut stack, &mut root, node);
                }
                Event::End(ref end) => {
                    let name = String::from_utf8_lossy(end.name().as_ref()).into_owned();
                    let mut node = stack.pop().ok_or_else(|| XmlError::Unbalanced(name.clone()))?;
                    if node.name != name {
                        return Err(XmlError::Unbalanced(name));
                    }
                    // blank text between child elements is indentation
                    if !node.children.is_empty() && node.text.trim().is_empty() {
                        node.text.clear();
                    }
                    Self::attach(&mut stack, &mut root, node);
                }
                Event::Text(ref text) => {
                    let text = text.unescape()?;
                    if let Some(node) = stack.last_mut() {
                        node.text.push_str(&text);
                    }
                }
                Event::CData(ref data) => {
                    if let Some(node) = stack.last_mut() {
                        node.text.push_str(&String::from_utf8_lossy(data.as_ref()));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some(open) = stack.pop() {
            return Err(XmlError::Unbalanced(open.name));
        }
        root.ok_or(XmlError::MissingRoot)
    }

    fn from_start(start: &BytesStart<'_>) -> Result<XmlNode, XmlError> {
        let mut node = XmlNode::new(String::from_utf8_lossy(start.name().as_ref()).into_owned());
        for attr in start.attributes() {
            let attr = attr.map_err(|e| XmlError::Parse(e.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            node.attributes.push((key, value));
        }
        Ok(node)
    }

    fn attach(stack: &mut [XmlNode], root: &mut Option<XmlNode>, node: XmlNode) {
        match stack.last_mut() {
            Some(parent) => parent.children.push(node),
            None => {
                if root.is_none() {
                    *root = Some(node);
                }
            }
        }
    }

    /// Serialize the element and its subtree.
    pub fn to_xml_string(&self) -> String {
        let mut out = String::new();
        self.write_to(&mut out);
        out
    }

    fn write_to(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (key, value) in &self.attributes {
            out.push(' ');
            out.push_str(key);
            out.push_str("=\"");
            out.push_str(&escape(value.as_str()));
            out.push('"');
        }
        if self.text.is_empty() && self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        out.push_str(&escape(self.text.as_str()));
        for child in &self.children {
            child.write_to(out);
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_nested_document() {
        let root = XmlNode::parse(
            r#"<?xml version="1.0"?>
            <object class="Mesh">
                <name>cube &amp; sphere</name>
                <points><element>1</element><element>2</element></points>
                <empty/>
            </object>"#,
        )
        .unwrap();

        assert_eq!(root.name, "object");
        assert_eq!(root.attribute("class"), Some("Mesh"));
        assert_eq!(root.child("name").unwrap().text, "cube & sphere");
        assert_eq!(root.child("points").unwrap().children_named("element").count(), 2);
        assert!(root.child("empty").unwrap().is_empty());
    }

    #[test]
    fn write_then_parse() {
        let mut root = XmlNode::new("object");
        root.set_attribute("class", "A<B>");
        root.push_child(XmlNode::new("text").with_text("x < y && \"z\""));
        root.push_child(XmlNode::new("none"));

        let text = root.to_xml_string();
        let parsed = XmlNode::parse(&text).unwrap();
        assert_eq!(parsed, root);
    }

    #[test]
    fn blank_text_survives_unless_it_is_indentation() {
        let mut root = XmlNode::new("object");
        root.push_child(XmlNode::new("text").with_text("  "));
        root.push_child(XmlNode::new("tab").with_text("\t"));
        let parsed = XmlNode::parse(&root.to_xml_string()).unwrap();
        assert_eq!(parsed.child("text").unwrap().text, "  ");
        assert_eq!(parsed.child("tab").unwrap().text, "\t");
        assert!(parsed.text.is_empty());

        let indented = XmlNode::parse("<a>\n  <b> </b>\n</a>").unwrap();
        assert!(indented.text.is_empty());
        assert_eq!(indented.child("b").unwrap().text, " ");
    }

    #[test]
    fn unbalanced_document_fails() {
        assert!(matches!(
            XmlNode::parse("<a><b></a>"),
            Err(XmlError::Unbalanced(_)) | Err(XmlError::Parse(_))
        ));
        assert_eq!(XmlNode::parse(""), Err(XmlError::MissingRoot));
    }

    #[test]
    fn set_attribute_replaces() {
        let mut node = XmlNode::new("a");
        node.set_attribute("k", "1");
        node.set_attribute("k", "2");
        assert_eq!(node.attributes.len(), 1);
        assert_eq!(node.attribute("k"), Some("2"));
    }
}
