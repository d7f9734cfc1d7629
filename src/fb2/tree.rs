//! A small owned XML tree built from `quick-xml` events.
//!
//! FB2 conversion needs mixed content (text, child, trailing text, child...)
//! and random access to `<binary>` elements, so the event stream is folded
//! into elements whose children keep text and elements in document order.
//! Text following a child element is that child's tail.

use quick_xml::Reader;
use quick_xml::escape::{resolve_predefined_entity, unescape};
use quick_xml::events::{BytesStart, Event};
use std::borrow::Cow;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    /// Local name, prefix stripped.
    pub name: String,
    /// Qualified attribute names with unescaped values.
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    /// Attribute by local name; `href` matches `xlink:href` and `l:href`.
    /// Namespace declarations are never matched.
    pub fn attr(&self, local: &str) -> Option<&str> {
        self.attributes.iter().find_map(|(key, value)| {
            if key.starts_with("xmlns") {
                return None;
            }
            let key_local = key.rsplit_once(':').map_or(key.as_str(), |(_, l)| l);
            (key_local == local).then_some(value.as_str())
        })
    }

    /// Text before the first child element.
    pub fn text(&self) -> Option<&str> {
        match self.children.first() {
            Some(XmlNode::Text(text)) => Some(text),
            _ => None,
        }
    }

    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|child| match child {
            XmlNode::Element(element) => Some(element),
            XmlNode::Text(_) => None,
        })
    }

    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.elements().find(|element| element.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.elements().filter(move |element| element.name == name)
    }

    /// Depth-first search over this element and everything below it.
    pub fn find<P>(&self, predicate: P) -> Option<&XmlElement>
    where
        P: Fn(&XmlElement) -> bool + Copy,
    {
        if predicate(self) {
            return Some(self);
        }
        self.elements().find_map(|element| element.find(predicate))
    }

    fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        match self.children.last_mut() {
            Some(XmlNode::Text(existing)) => existing.push_str(text),
            _ => self.children.push(XmlNode::Text(text.to_string())),
        }
    }
}

/// Parse a complete document into its root element.
///
/// Any well-formedness problem (mismatched or unclosed tags, bad attributes,
/// a missing root) is reported as a message; no partial tree is returned.
pub fn parse_document(xml: &str) -> Result<XmlElement, String> {
    let mut reader = Reader::from_reader(xml.as_bytes());
    let mut buf = Vec::new();
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|err| format!("{err} at byte {}", reader.error_position()))?;
        match event {
            Event::Start(e) => {
                if root.is_some() {
                    return Err("content after the root element".to_string());
                }
                stack.push(start_element(&reader, &e)?);
            }
            Event::Empty(e) => {
                let element = start_element(&reader, &e)?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| "unexpected closing tag".to_string())?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(e) => {
                if let Some(current) = stack.last_mut() {
                    let raw = decode(&reader, &e)?;
                    let text = unescape(&raw).unwrap_or(Cow::Borrowed(raw.as_str()));
                    current.push_text(&text);
                }
            }
            Event::CData(e) => {
                if let Some(current) = stack.last_mut() {
                    current.push_text(&decode(&reader, &e)?);
                }
            }
            Event::GeneralRef(e) => {
                if let Some(current) = stack.last_mut() {
                    let resolved = match e.resolve_char_ref() {
                        Ok(Some(ch)) => ch.to_string(),
                        Ok(None) => {
                            let name = e.decode().map_err(|err| err.to_string())?;
                            match resolve_predefined_entity(&name) {
                                Some(value) => value.to_string(),
                                None => format!("&{name};"),
                            }
                        }
                        Err(err) => return Err(err.to_string()),
                    };
                    current.push_text(&resolved);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if let Some(open) = stack.last() {
        return Err(format!("unclosed element <{}> at end of document", open.name));
    }
    root.ok_or_else(|| "document has no root element".to_string())
}

fn decode<R>(reader: &Reader<R>, bytes: &[u8]) -> Result<String, String> {
    reader
        .decoder()
        .decode(bytes)
        .map(|text| text.into_owned())
        .map_err(|err| err.to_string())
}

fn start_element<R>(reader: &Reader<R>, e: &BytesStart<'_>) -> Result<XmlElement, String> {
    let name = decode(reader, e.local_name().as_ref())?;
    let mut attributes = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| err.to_string())?;
        let key = decode(reader, attr.key.as_ref())?;
        let raw = decode(reader, attr.value.as_ref())?;
        let value = unescape(&raw)
            .map(Cow::into_owned)
            .unwrap_or(raw);
        attributes.push((key, value));
    }
    Ok(XmlElement {
        name,
        attributes,
        children: Vec::new(),
    })
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> Result<(), String> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(XmlNode::Element(element)),
        None if root.is_none() => *root = Some(element),
        None => return Err("content after the root element".to_string()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_mixed_content_in_order() {
        let root = parse_document("<p>one <em>two</em> three<br/>four</p>").unwrap();
        assert_eq!(root.name, "p");
        assert_eq!(root.text(), Some("one "));
        assert_eq!(root.children.len(), 5);
        assert_eq!(root.children[2], XmlNode::Text(" three".to_string()));
        assert_eq!(root.children[4], XmlNode::Text("four".to_string()));
    }

    #[test]
    fn resolves_entities_and_cdata() {
        let root = parse_document("<p>a &amp; b &#x41;&lt;<![CDATA[<raw>]]></p>").unwrap();
        assert_eq!(root.text(), Some("a & b A<<raw>"));
    }

    #[test]
    fn attributes_match_by_local_name() {
        let root = parse_document(
            r##"<image xmlns:l="http://www.w3.org/1999/xlink" l:href="#cover" id="i&amp;1"/>"##,
        )
        .unwrap();
        assert_eq!(root.attr("href"), Some("#cover"));
        assert_eq!(root.attr("id"), Some("i&1"));
        assert_eq!(root.attr("l"), None);
    }

    #[test]
    fn strips_element_prefixes() {
        let root = parse_document(r#"<fb:book xmlns:fb="urn:x"><fb:title>t</fb:title></fb:book>"#)
            .unwrap();
        assert_eq!(root.name, "book");
        assert_eq!(root.child("title").and_then(XmlElement::text), Some("t"));
    }

    #[test]
    fn finds_nested_elements() {
        let root = parse_document(r#"<a><b><c id="x"/></b><c id="y"/></a>"#).unwrap();
        let found = root.find(|e| e.name == "c" && e.attr("id") == Some("y"));
        assert!(found.is_some());
        assert!(root.find(|e| e.name == "missing").is_none());
    }

    #[test]
    fn mismatched_and_unclosed_tags_are_errors() {
        assert!(parse_document("<a><b></a>").is_err());
        assert!(parse_document("<a><b>text").is_err());
        assert!(parse_document("   ").is_err());
        assert!(parse_document("<a/><b/>").is_err());
    }
}
