//! Generic attribute tree: nested named groups of string attributes.
//!
//! This is the weakly-typed shape settings and model metadata travel in. It
//! serializes to JSON as `{ "name": ..., "attrs": {...}, "childs": [...] }`
//! and can also be read from and written to the legacy XML form, where each
//! node is an element and each attribute an XML attribute.

use std::io::{BufRead, Write};

use indexmap::IndexMap;
use quick_xml::{
    Reader, Writer,
    events::{BytesEnd, BytesStart, Event},
};
use serde::{Deserialize, Serialize};

use crate::{error::Error, traits::Parser};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Node {
    pub name: String,

    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    #[serde(default)]
    pub attrs: IndexMap<String, String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    #[serde(default)]
    pub childs: Vec<Node>,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: IndexMap::new(),
            childs: Vec::new(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    pub fn with_child(mut self, child: Node) -> Self {
        self.childs.push(child);
        self
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }

    /// First direct child called `name`.
    pub fn child(&self, name: &str) -> Option<&Node> {
        self.childs.iter().find(|c| c.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut Node> {
        self.childs.iter_mut().find(|c| c.name == name)
    }

    /// Replaces the first child with the same name, or appends `child`.
    /// Other children keep their position.
    pub fn set_child(&mut self, child: Node) {
        match self.childs.iter_mut().find(|c| c.name == child.name) {
            Some(existing) => *existing = child,
            None => self.childs.push(child),
        }
    }

    /// Removes every direct child called `name`.
    pub fn remove_child(&mut self, name: &str) -> bool {
        let before = self.childs.len();
        self.childs.retain(|c| c.name != name);
        before != self.childs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty() && self.childs.is_empty()
    }

    /// Parses the legacy XML form.
    pub fn from_xml_str(xml: &str) -> Result<Self, Error> {
        Self::from_reader(xml.as_bytes())
    }

    /// Writes the legacy XML form.
    pub fn to_xml_string(&self) -> Result<String, Error> {
        String::from_utf8(self.to_bytes()?).map_err(|e| Error::DataMismatch(e.to_string()))
    }
}

impl Parser for Node {
    /// Parse the legacy XML form from any reader.
    fn from_reader<R: BufRead>(reader: R) -> Result<Self, Error> {
        let mut xml_reader = Reader::from_reader(reader);
        xml_reader.config_mut().trim_text(true);

        let mut buf = Vec::new();
        // Open elements; the finished root is returned once its end tag is read.
        let mut stack: Vec<Node> = Vec::new();

        loop {
            match xml_reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) => {
                    stack.push(parse_node_start(e)?);
                }
                Ok(Event::Empty(ref e)) => {
                    let node = parse_node_start(e)?;
                    match stack.last_mut() {
                        Some(parent) => parent.childs.push(node),
                        None => return Ok(node),
                    }
                }
                Ok(Event::End(_)) => {
                    let node = stack
                        .pop()
                        .ok_or_else(|| Error::DataMismatch("unbalanced end tag".to_string()))?;
                    match stack.last_mut() {
                        Some(parent) => parent.childs.push(node),
                        None => return Ok(node),
                    }
                }
                Ok(Event::Eof) => {
                    return Err(Error::DataMismatch(
                        "attribute tree has no root element".to_string(),
                    ));
                }
                Ok(_) => {}
                Err(e) => return Err(Error::XmlParse(e)),
            }
            buf.clear();
        }
    }

    /// Write the legacy XML form to any writer.
    fn to_writer<W: Write>(&self, mut writer: W) -> Result<(), Error> {
        let mut xml_writer = Writer::new_with_indent(&mut writer, b' ', 2);
        write_node(&mut xml_writer, self)?;
        Ok(())
    }
}

fn parse_node_start(e: &BytesStart) -> Result<Node, Error> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut node = Node::new(name);
    for attr in e.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        node.attrs.insert(key, value);
    }
    Ok(node)
}

fn write_node<W: Write>(xml_writer: &mut Writer<W>, node: &Node) -> Result<(), Error> {
    let mut start = BytesStart::new(node.name.as_str());
    for (key, value) in &node.attrs {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if node.childs.is_empty() {
        xml_writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    xml_writer.write_event(Event::Start(start))?;
    for child in &node.childs {
        write_node(xml_writer, child)?;
    }
    xml_writer.write_event(Event::End(BytesEnd::new(node.name.as_str())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Node {
        Node::new("codeGenerator")
            .with_attr("templateId", "resx")
            .with_child(
                Node::new("settings").with_child(
                    Node::new("csharp")
                        .with_attr("namespace", "App.Strings")
                        .with_attr("internal", "true"),
                ),
            )
    }

    #[test]
    fn test_json_shape_skips_empty_collections() {
        let json = serde_json::to_string(&Node::new("empty")).unwrap();
        assert_eq!(json, "{\"name\":\"empty\"}");

        let parsed: Node = serde_json::from_str("{\"name\":\"empty\"}").unwrap();
        assert!(parsed.is_empty());
    }

    #[test]
    fn test_attribute_order_is_preserved() {
        let node = Node::new("g").with_attr("z", "1").with_attr("a", "2");
        let json = serde_json::to_string(&node).unwrap();
        assert_eq!(json, "{\"name\":\"g\",\"attrs\":{\"z\":\"1\",\"a\":\"2\"}}");
    }

    #[test]
    fn test_set_child_replaces_by_name() {
        let mut metadata = Node::new("metadata")
            .with_child(Node::new("author").with_attr("name", "Jane"))
            .with_child(Node::new("codeGenerator").with_attr("templateId", "old"));

        metadata.set_child(Node::new("codeGenerator").with_attr("templateId", "new"));
        metadata.set_child(Node::new("extra"));

        assert_eq!(metadata.childs.len(), 3);
        assert_eq!(metadata.childs[0].name, "author");
        assert_eq!(
            metadata.child("codeGenerator").unwrap().attr("templateId"),
            Some("new")
        );
        assert!(metadata.remove_child("extra"));
        assert!(!metadata.remove_child("extra"));
    }

    #[test]
    fn test_xml_round_trip() {
        let node = sample();
        let xml = node.to_xml_string().unwrap();
        assert!(xml.contains("<csharp namespace=\"App.Strings\" internal=\"true\"/>"));

        let parsed = Node::from_xml_str(&xml).unwrap();
        assert_eq!(parsed, node);
    }

    #[test]
    fn test_xml_unescapes_attributes() {
        let parsed = Node::from_xml_str("<a title=\"x &amp; y\"><b/></a>").unwrap();
        assert_eq!(parsed.attr("title"), Some("x & y"));
        assert_eq!(parsed.childs.len(), 1);
        assert_eq!(parsed.childs[0].name, "b");
    }

    #[test]
    fn test_xml_without_root_fails() {
        assert!(Node::from_xml_str("").is_err());
    }
}
