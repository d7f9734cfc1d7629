//! FB2 body markup to HTML.

use super::tree::{XmlElement, XmlNode};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use quick_xml::escape::{escape, partial_escape};
use std::collections::HashMap;
use tracing::{debug, warn};

const DEFAULT_IMAGE_TYPE: &str = "image/jpeg";

/// Decoded `<binary>` images for one document, keyed by binary id.
///
/// Each parse owns its own cache; nothing is shared between documents.
#[derive(Debug, Default)]
pub struct ImageCache {
    data_uris: HashMap<String, String>,
    decodes: usize,
}

impl ImageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.data_uris.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.data_uris.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data_uris.is_empty()
    }

    /// Number of base64 payloads decoded so far.
    pub fn decode_count(&self) -> usize {
        self.decodes
    }
}

/// The tags the converter understands. Everything else is `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeKind {
    Paragraph,
    Emphasis,
    Strong,
    EmptyLine,
    Section,
    Image,
    Other,
}

impl NodeKind {
    fn of(element: &XmlElement) -> Self {
        match element.name.as_str() {
            "p" => Self::Paragraph,
            "em" => Self::Emphasis,
            "strong" => Self::Strong,
            "empty-line" => Self::EmptyLine,
            "section" => Self::Section,
            "image" => Self::Image,
            _ => Self::Other,
        }
    }
}

/// Converts body elements, resolving images against `document`.
pub struct HtmlRenderer<'doc, 'cache> {
    document: &'doc XmlElement,
    images: &'cache mut ImageCache,
}

impl<'doc, 'cache> HtmlRenderer<'doc, 'cache> {
    pub fn new(document: &'doc XmlElement, images: &'cache mut ImageCache) -> Self {
        Self { document, images }
    }

    pub fn render(&mut self, node: &XmlElement, out: &mut String) {
        match NodeKind::of(node) {
            NodeKind::Paragraph => self.wrap("p", node, out),
            NodeKind::Emphasis => self.wrap("em", node, out),
            NodeKind::Strong => self.wrap("strong", node, out),
            NodeKind::EmptyLine => out.push_str("<br>"),
            NodeKind::Section => self.section(node, out),
            NodeKind::Image => self.image(node, out),
            NodeKind::Other => {
                if let Some(text) = node.text() {
                    out.push_str(&partial_escape(text));
                }
            }
        }
    }

    fn wrap(&mut self, tag: &str, node: &XmlElement, out: &mut String) {
        out.push('<');
        out.push_str(tag);
        out.push('>');
        self.mixed_content(node, out);
        out.push_str("</");
        out.push_str(tag);
        out.push('>');
    }

    fn mixed_content(&mut self, node: &XmlElement, out: &mut String) {
        for child in &node.children {
            match child {
                XmlNode::Text(text) => out.push_str(&partial_escape(text)),
                XmlNode::Element(element) => self.render(element, out),
            }
        }
    }

    fn section(&mut self, node: &XmlElement, out: &mut String) {
        out.push_str("<div>");
        if let Some(title) = node.child("title") {
            out.push_str("<h3>");
            let mut paragraphs = title.children_named("p").peekable();
            if paragraphs.peek().is_some() {
                for paragraph in paragraphs {
                    self.render(paragraph, out);
                }
            } else if let Some(text) = title.text() {
                out.push_str(&partial_escape(text));
            }
            out.push_str("</h3>");
        }

        // The section's own leading text is not content; tails are.
        let mut seen_element = false;
        for child in &node.children {
            match child {
                XmlNode::Element(element) => {
                    seen_element = true;
                    if element.name != "title" {
                        self.render(element, out);
                    }
                }
                XmlNode::Text(text) if seen_element => out.push_str(&partial_escape(text)),
                XmlNode::Text(_) => {}
            }
        }
        out.push_str("</div>");
    }

    fn image(&mut self, node: &XmlElement, out: &mut String) {
        let Some(id) = node.attr("href").and_then(|href| href.strip_prefix('#')) else {
            debug!("Skipping image without a local reference");
            return;
        };
        match self.data_uri(id) {
            Ok(uri) => {
                out.push_str("<img src=\"");
                out.push_str(&uri);
                out.push_str("\" alt=\"Image ");
                out.push_str(&escape(id));
                out.push_str("\" style=\"max-width:100%; height:auto;\"/>");
            }
            Err(placeholder) => out.push_str(&placeholder),
        }
    }

    /// Data URI for a binary id, decoding it on first use. The error is the
    /// placeholder to show instead of the image.
    fn data_uri(&mut self, id: &str) -> Result<String, String> {
        if let Some(uri) = self.images.get(id) {
            return Ok(uri.to_string());
        }

        let binary = self
            .document
            .find(|e| e.name == "binary" && e.attr("id") == Some(id));
        let Some(binary) = binary else {
            warn!(image = id, "Referenced FB2 image not found");
            return Err(format!("[Image {} not found]", escape(id)));
        };
        let payload: String = binary
            .text()
            .unwrap_or_default()
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        if payload.is_empty() {
            warn!(image = id, "Referenced FB2 image has no payload");
            return Err(format!("[Image {} not found]", escape(id)));
        }

        let content_type = binary.attr("content-type").unwrap_or(DEFAULT_IMAGE_TYPE);
        self.images.decodes += 1;
        match STANDARD.decode(payload.as_bytes()) {
            Ok(bytes) => {
                let uri = format!(
                    "data:{};base64,{}",
                    escape(content_type),
                    STANDARD.encode(&bytes)
                );
                debug!(image = id, bytes = bytes.len(), "Decoded FB2 image");
                self.images.data_uris.insert(id.to_string(), uri.clone());
                Ok(uri)
            }
            Err(err) => {
                warn!(image = id, "Error decoding base64 image: {err}");
                Err(format!("[Image {} load error]", escape(id)))
            }
        }
    }
}
