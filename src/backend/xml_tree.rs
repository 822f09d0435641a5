//! Minimal owned XML element tree built on top of quick-xml's event reader.
//!
//! Libvirt domain definitions are small, so the whole document is kept in
//! memory and rewritten in one go on every write. Whitespace-only text is kept
//! as-is so that a definition that is read and written back unchanged stays
//! byte-compatible apart from the XML declaration, which is dropped.

use crate::error::AppError;
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
    Comment(String),
    CData(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Element {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn parse(xml: &str) -> Result<Self, AppError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(false);

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(ref e)) => {
                    stack.push(element_from_start(e)?);
                }
                Ok(Event::Empty(ref e)) => {
                    let element = element_from_start(e)?;
                    attach(&mut stack, &mut root, element)?;
                }
                Ok(Event::End(_)) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| AppError::Xml("unbalanced closing tag".to_string()))?;
                    attach(&mut stack, &mut root, element)?;
                }
                Ok(Event::Text(ref e)) => {
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(Node::Text(e.unescape()?.into_owned()));
                    }
                }
                Ok(Event::CData(ref e)) => {
                    if let Some(parent) = stack.last_mut() {
                        parent
                            .children
                            .push(Node::CData(String::from_utf8_lossy(e).to_string()));
                    }
                }
                Ok(Event::Comment(ref e)) => {
                    if let Some(parent) = stack.last_mut() {
                        parent
                            .children
                            .push(Node::Comment(String::from_utf8_lossy(e).to_string()));
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(AppError::Xml(format!("XML parse error: {e}"))),
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(AppError::Xml("unexpected end of document".to_string()));
        }
        root.ok_or_else(|| AppError::Xml("document has no root element".to_string()))
    }

    pub fn to_xml_string(&self) -> String {
        let mut result = String::new();
        write_element(&mut result, self);
        result
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    pub fn set_attribute(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((key.to_string(), value)),
        }
    }

    /// Concatenated text and CDATA content of this element (not descendants).
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|n| match n {
                Node::Text(t) | Node::CData(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.children
            .retain(|n| !matches!(n, Node::Text(_) | Node::CData(_)));
        self.children.insert(0, Node::Text(text.into()));
    }

    pub fn has_child_elements(&self) -> bool {
        self.elements().next().is_some()
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.elements().find(|e| e.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut Element> {
        self.children.iter_mut().find_map(|n| match n {
            Node::Element(e) if e.name == name => Some(e),
            _ => None,
        })
    }

    /// First child element called `name`, appended empty if there is none.
    pub fn child_or_insert(&mut self, name: &str) -> &mut Element {
        let pos = self
            .children
            .iter()
            .position(|n| matches!(n, Node::Element(e) if e.name == name));
        let pos = match pos {
            Some(pos) => pos,
            None => {
                self.children.push(Node::Element(Element::new(name)));
                self.children.len() - 1
            }
        };
        match &mut self.children[pos] {
            Node::Element(e) => e,
            _ => unreachable!("position was taken from an element node"),
        }
    }

    pub fn push_element(&mut self, element: Element) {
        self.children.push(Node::Element(element));
    }

    /// Drop child elements for which `keep` returns false. Text and comments stay.
    pub fn retain_elements<F>(&mut self, mut keep: F)
    where
        F: FnMut(&Element) -> bool,
    {
        self.children.retain(|n| match n {
            Node::Element(e) => keep(e),
            _ => true,
        });
    }
}

fn element_from_start(e: &BytesStart) -> Result<Element, AppError> {
    let mut element = Element::new(String::from_utf8_lossy(e.name().as_ref()).to_string());
    for attr in e.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let val = attr.unescape_value()?.into_owned();
        element.attributes.push((key, val));
    }
    Ok(element)
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), AppError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(Node::Element(element)),
        None if root.is_none() => *root = Some(element),
        None => return Err(AppError::Xml("more than one root element".to_string())),
    }
    Ok(())
}

fn write_element(result: &mut String, element: &Element) {
    result.push('<');
    result.push_str(&element.name);
    for (key, val) in &element.attributes {
        result.push_str(&format!(r#" {key}="{}""#, escape(val.as_str())));
    }
    if element.children.is_empty() {
        result.push_str("/>");
        return;
    }
    result.push('>');
    for child in &element.children {
        match child {
            Node::Element(e) => write_element(result, e),
            Node::Text(t) => result.push_str(&escape(t.as_str())),
            Node::CData(t) => {
                result.push_str("<![CDATA[");
                result.push_str(t);
                result.push_str("]]>");
            }
            Node::Comment(t) => {
                result.push_str("<!--");
                result.push_str(t);
                result.push_str("-->");
            }
        }
    }
    result.push_str(&format!("</{}>", element.name));
}
