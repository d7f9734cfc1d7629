//! FictionBook 2 loading.
//!
//! The whole file is parsed into a tree first, so a malformed document fails
//! before any HTML is produced. Metadata comes from
//! `description/title-info` and `description/document-info`; the first
//! `<body>` is converted to HTML with embedded images inlined as data URIs.

mod render;
mod tree;

pub use render::{HtmlRenderer, ImageCache};
pub use tree::{XmlElement, XmlNode, parse_document};

use crate::error::{ReaderError, Result};
use once_cell::sync::Lazy;
use quick_xml::escape::partial_escape;
use regex::bytes::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tracing::{debug, error, info, warn};

pub const FB2_NAMESPACE: &str = "http://www.gribuser.ru/xml/fictionbook/2.0";
pub const UNKNOWN_TITLE: &str = "Unknown Title";
pub const UNKNOWN_LANGUAGE: &str = "Unknown Language";

static RE_DECLARED_ENCODING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^\s*<\?xml[^>]*?encoding\s*=\s*["']([A-Za-z0-9._:-]+)["']"#).unwrap());

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Fb2Author {
    pub first_name: String,
    pub middle_name: String,
    pub last_name: String,
    pub nickname: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fb2Metadata {
    pub genres: BTreeSet<String>,
    pub book_title: String,
    pub lang: String,
    pub version: String,
    pub date: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fb2Document {
    pub metadata: Fb2Metadata,
    pub authors: Vec<Fb2Author>,
    pub content: String,
}

pub fn parse_fb2(path: &Path) -> Result<Fb2Document> {
    info!(path = %path.display(), "Loading FB2 content");
    let bytes = fs::read(path).map_err(|err| ReaderError::io(path, err))?;
    let document = parse_fb2_bytes(&bytes).inspect_err(|err| {
        error!(path = %path.display(), "FB2 parse failed: {err}");
    })?;
    info!(
        authors = document.authors.len(),
        total_chars = document.content.len(),
        "Finished loading FB2 content"
    );
    Ok(document)
}

/// Parse an in-memory FB2 document.
pub fn parse_fb2_bytes(bytes: &[u8]) -> Result<Fb2Document> {
    let xml = decode_document(bytes);
    let root = parse_document(&xml).map_err(ReaderError::Fb2Parse)?;

    if root.name != "FictionBook" {
        warn!(root = %root.name, "Unexpected FB2 root element");
    }
    if !has_default_namespace(&root) {
        warn!("FB2 document does not declare the FictionBook namespace");
    }

    let description = root.child("description");
    let title_info = description.and_then(|d| d.child("title-info"));
    let document_info = description.and_then(|d| d.child("document-info"));

    let metadata = Fb2Metadata {
        genres: title_info
            .map(|info| {
                info.children_named("genre")
                    .filter_map(|genre| genre.text())
                    .map(str::trim)
                    .filter(|genre| !genre.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
        book_title: child_text(title_info, "book-title", UNKNOWN_TITLE),
        lang: child_text(title_info, "lang", UNKNOWN_LANGUAGE),
        version: child_text(document_info, "version", ""),
        date: child_text(document_info, "date", ""),
    };

    let authors = title_info
        .map(|info| {
            info.children_named("author")
                .map(|author| Fb2Author {
                    first_name: child_text(Some(author), "first-name", ""),
                    middle_name: child_text(Some(author), "middle-name", ""),
                    last_name: child_text(Some(author), "last-name", ""),
                    nickname: child_text(Some(author), "nickname", ""),
                })
                .collect()
        })
        .unwrap_or_default();

    let mut images = ImageCache::new();
    let content = root
        .child("body")
        .map(|body| render_body(&root, body, &mut images))
        .unwrap_or_default();
    if !images.is_empty() {
        debug!(
            images = images.len(),
            decodes = images.decode_count(),
            "Inlined FB2 images"
        );
    }

    Ok(Fb2Document {
        metadata,
        authors,
        content,
    })
}

fn has_default_namespace(root: &XmlElement) -> bool {
    root.attributes
        .iter()
        .any(|(key, value)| key == "xmlns" && value == FB2_NAMESPACE)
}

/// Trimmed text of the first `name` child, or `default` when absent or blank.
fn child_text(parent: Option<&XmlElement>, name: &str, default: &str) -> String {
    parent
        .and_then(|p| p.child(name))
        .and_then(XmlElement::text)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .unwrap_or(default)
        .to_string()
}

/// Convert a `<body>`. Loose text before the first child and text trailing a
/// top-level child each become their own paragraph.
fn render_body(root: &XmlElement, body: &XmlElement, images: &mut ImageCache) -> String {
    let mut out = String::new();
    let mut renderer = HtmlRenderer::new(root, images);
    for child in &body.children {
        match child {
            XmlNode::Element(element) => renderer.render(element, &mut out),
            XmlNode::Text(text) => {
                let text = text.trim();
                if !text.is_empty() {
                    out.push_str("<p>");
                    out.push_str(&partial_escape(text));
                    out.push_str("</p>");
                }
            }
        }
    }
    out
}

/// Transcode to UTF-8 using the BOM or the encoding named in the XML
/// declaration. FB2 files in the wild are often windows-1251.
fn decode_document(bytes: &[u8]) -> String {
    let declared = RE_DECLARED_ENCODING
        .captures(bytes)
        .and_then(|caps| caps.get(1))
        .and_then(|label| encoding_rs::Encoding::for_label(label.as_bytes()))
        .unwrap_or(encoding_rs::UTF_8);
    let (text, used, had_errors) = declared.decode(bytes);
    if had_errors {
        warn!(encoding = used.name(), "FB2 text contained undecodable bytes");
    }
    text.into_owned()
}
