// src/model/xml.rs

//! Minimal XML element tree over quick-xml
//!
//! Blueprints are small documents, so they are read into an owned tree and
//! converted afterwards instead of being decoded straight off the event
//! stream.

use crate::error::{Error, Result};
use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use std::fs;
use std::path::Path;

/// Qualified name of an XInclude directive
const XINCLUDE: &str = "xi:include";

/// An element with its attributes, text and children
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<Element>,
}

fn xml_error(e: impl std::fmt::Display) -> Error {
    Error::ParseError(format!("XML error: {}", e))
}

fn decode_name(raw: &[u8]) -> Result<String> {
    std::str::from_utf8(raw)
        .map(str::to_string)
        .map_err(|e| xml_error(format!("element name is not UTF-8: {}", e)))
}

fn open_element(start: &BytesStart<'_>) -> Result<Element> {
    let mut element = Element {
        name: decode_name(start.name().as_ref())?,
        ..Default::default()
    };
    for attr in start.attributes() {
        let attr = attr.map_err(xml_error)?;
        let key = decode_name(attr.key.as_ref())?;
        let value = attr.unescape_value().map_err(xml_error)?.into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

impl Element {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Parse a document and return its root element
    pub fn parse(xml: &str) -> Result<Element> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            match reader.read_event().map_err(xml_error)? {
                Event::Start(start) => stack.push(open_element(&start)?),
                Event::Empty(start) => {
                    let element = open_element(&start)?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(element),
                        None => root = Some(element),
                    }
                }
                Event::Text(text) => {
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&text.unescape().map_err(xml_error)?);
                    }
                }
                Event::CData(data) => {
                    if let Some(current) = stack.last_mut() {
                        let raw = data.into_inner();
                        current.text.push_str(&String::from_utf8_lossy(&raw));
                    }
                }
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| xml_error("unbalanced closing tag"))?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(element),
                        None => root = Some(element),
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(xml_error("unexpected end of document"));
        }
        root.ok_or_else(|| xml_error("document has no root element"))
    }

    /// Parse a file, splicing in `xi:include` targets relative to it
    pub fn load(path: &Path) -> Result<Element> {
        let text = fs::read_to_string(path).map_err(|e| {
            Error::IoError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let mut root = Element::parse(&text)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        root.expand_includes(base, 0)?;
        Ok(root)
    }

    fn expand_includes(&mut self, base: &Path, depth: usize) -> Result<()> {
        if depth > 16 {
            return Err(xml_error("xi:include nesting too deep"));
        }

        for child in &mut self.children {
            if child.name == XINCLUDE {
                let href = child
                    .attr("href")
                    .ok_or_else(|| xml_error("xi:include without href"))?;
                let target = base.join(href);
                tracing::debug!("Including {}", target.display());
                let text = fs::read_to_string(&target).map_err(|e| {
                    Error::IoError(format!("Failed to read {}: {}", target.display(), e))
                })?;
                let mut included = Element::parse(&text)?;
                let included_base = target.parent().unwrap_or(base).to_path_buf();
                included.expand_includes(&included_base, depth + 1)?;
                *child = included;
            } else {
                child.expand_includes(base, depth)?;
            }
        }
        Ok(())
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, name: &str, value: &str) {
        self.attributes.push((name.to_string(), value.to_string()));
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Trimmed text of a child element, if present
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(|c| c.text.trim())
    }

    /// Trimmed text of a child element that must be present
    pub fn required_text(&self, name: &str) -> Result<&str> {
        self.child_text(name).ok_or_else(|| {
            Error::ConfigurationError(format!("<{}> is missing <{}>", self.name, name))
        })
    }

    /// Append a child holding only text
    pub fn push_text_child(&mut self, name: &str, text: &str) {
        let mut child = Element::new(name);
        child.text = text.to_string();
        self.children.push(child);
    }

    /// Serialize as an indented document with an XML declaration
    pub fn to_document(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(xml_error)?;
        self.write(&mut writer)?;

        let mut out = String::from_utf8(writer.into_inner())
            .map_err(|e| xml_error(format!("output is not UTF-8: {}", e)))?;
        out.push('\n');
        Ok(out)
    }

    fn write(&self, writer: &mut Writer<Vec<u8>>) -> Result<()> {
        let mut start = BytesStart::new(self.name.as_str());
        for (key, value) in &self.attributes {
            start.push_attribute((key.as_str(), value.as_str()));
        }

        if self.children.is_empty() && self.text.is_empty() {
            return writer.write_event(Event::Empty(start)).map_err(xml_error);
        }

        writer.write_event(Event::Start(start)).map_err(xml_error)?;
        if !self.text.is_empty() {
            writer
                .write_event(Event::Text(BytesText::new(&self.text)))
                .map_err(xml_error)?;
        }
        for child in &self.children {
            child.write(writer)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new(self.name.as_str())))
            .map_err(xml_error)
    }
}
