//! EPUB loading utilities.
//!
//! Opens an EPUB, reads its Dublin Core metadata and table of contents, then
//! walks the spine and turns each content document into a sanitized HTML
//! fragment. Fragments are joined in reading order into a single string the
//! rendering layer can drop into a page.

use crate::error::{ReaderError, Result};
use crate::fb2::parse_document;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info, warn};

pub const UNKNOWN_TITLE: &str = "Unknown Title";
pub const UNKNOWN_AUTHOR: &str = "Unknown Author";
pub const UNKNOWN: &str = "Unknown";

const FRAGMENT_SEPARATOR: &str = "\n\n";

static RE_XML_DECLARATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"<\?xml[^>]*\?>").unwrap());
static RE_DOCTYPE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<!DOCTYPE[^>]*>").unwrap());
static RE_SELF_CLOSING_ACTIVE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<(?:script|style)\b[^>]*/\s*>").unwrap());
static RE_SCRIPT_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>").unwrap());
static RE_STYLE_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<style\b[^>]*>.*?</style\s*>").unwrap());
static RE_UNTERMINATED_ACTIVE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<(?:script|style)\b.*\z").unwrap());
static RE_DOCUMENT_WRAPPER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)</?(?:html|body)\b[^>]*>").unwrap());
static RE_HEAD_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<head\b[^>]*>.*?</head\s*>").unwrap());
static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TocEntry {
    pub title: String,
    pub href: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EpubMetadata {
    pub title: String,
    pub author: String,
    pub publisher: String,
    pub publication_date: String,
    pub language: String,
    pub identifier: String,
}

impl EpubMetadata {
    /// Build metadata from a Dublin Core lookup (`"title"`, `"creator"`, ...).
    /// Every field falls back to a sentinel when the lookup has nothing.
    pub fn from_lookup<F>(mut lookup: F) -> Self
    where
        F: FnMut(&str) -> Vec<String>,
    {
        Self {
            title: first_value(lookup("title"), UNKNOWN_TITLE),
            author: first_value(lookup("creator"), UNKNOWN_AUTHOR),
            publisher: first_value(lookup("publisher"), UNKNOWN),
            publication_date: first_value(lookup("date"), UNKNOWN),
            language: first_value(lookup("language"), UNKNOWN),
            identifier: first_value(lookup("identifier"), UNKNOWN),
        }
    }
}

/// First non-blank value, trimmed, or `default`.
pub fn first_value<I, S>(values: I, default: &str) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    values
        .into_iter()
        .map(|value| value.as_ref().trim().to_string())
        .find(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EpubDocument {
    #[serde(flatten)]
    pub metadata: EpubMetadata,
    pub toc: Vec<TocEntry>,
    pub content: String,
}

fn is_document_mime(mime: &str) -> bool {
    matches!(mime, "application/xhtml+xml" | "text/html")
}

/// Ids of the content documents in the package manifest, in document order.
#[cfg_attr(not(feature = "epub"), allow(dead_code))]
fn manifest_document_ids(opf: &str) -> Vec<String> {
    let package = match parse_document(opf) {
        Ok(package) => package,
        Err(err) => {
            warn!("Package document is not well-formed: {err}");
            return Vec::new();
        }
    };
    package
        .child("manifest")
        .map(|manifest| {
            manifest
                .children_named("item")
                .filter(|item| item.attr("media-type").is_some_and(is_document_mime))
                .filter_map(|item| item.attr("id"))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Strip everything from a content document that should not reach the page:
/// XML and DOCTYPE declarations, `<script>`/`<style>` blocks with their
/// content, the `<head>` block and the `<html>`/`<body>` wrappers. Runs of
/// blank lines collapse to one.
pub fn sanitize_fragment(html: &str) -> String {
    let mut out = RE_XML_DECLARATION.replace_all(html, "").into_owned();
    for re in [
        &*RE_DOCTYPE,
        &*RE_SELF_CLOSING_ACTIVE,
        &*RE_SCRIPT_BLOCK,
        &*RE_STYLE_BLOCK,
        &*RE_UNTERMINATED_ACTIVE,
        &*RE_DOCUMENT_WRAPPER,
        &*RE_HEAD_BLOCK,
    ] {
        out = re.replace_all(&out, "").into_owned();
    }
    out = RE_BLANK_LINES.replace_all(&out, "\n\n").into_owned();
    out.trim().to_string()
}

/// Sanitize each fragment and join the non-empty ones in order.
pub fn join_fragments<I>(fragments: I) -> String
where
    I: IntoIterator<Item = String>,
{
    fragments
        .into_iter()
        .map(|raw| sanitize_fragment(&raw))
        .filter(|clean| !clean.trim().is_empty())
        .collect::<Vec<_>>()
        .join(FRAGMENT_SEPARATOR)
}

#[cfg(feature = "epub")]
pub fn parse_epub(path: &Path) -> Result<EpubDocument> {
    use epub::doc::{EpubDoc, NavPoint};

    fn flatten_toc(points: &[NavPoint], out: &mut Vec<TocEntry>) {
        for point in points {
            out.push(TocEntry {
                title: point.label.trim().to_string(),
                href: point.content.to_string_lossy().into_owned(),
            });
            flatten_toc(&point.children, out);
        }
    }

    info!(path = %path.display(), "Loading EPUB content");
    let mut doc = EpubDoc::new(path).map_err(|err| ReaderError::EpubParse {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;

    let metadata = EpubMetadata::from_lookup(|field| {
        doc.mdata(field)
            .map(|item| vec![item.value.clone()])
            .unwrap_or_default()
    });

    let mut toc = Vec::new();
    flatten_toc(&doc.toc, &mut toc);

    let mut spine_fragments = Vec::new();
    let chapters = doc.get_num_chapters();
    for chapter in 0..chapters {
        if !doc.set_current_chapter(chapter) {
            warn!(chapter, "Spine item could not be selected");
            continue;
        }
        match doc.get_current_str() {
            Some((body, mime)) if is_document_mime(&mime) => spine_fragments.push(body),
            Some((_, mime)) => debug!(chapter, %mime, "Skipping non-document spine item"),
            None => warn!(chapter, "Failed to decode spine document, skipping"),
        }
    }
    let mut content = join_fragments(spine_fragments);

    if content.is_empty() {
        warn!(
            path = %path.display(),
            "Spine yielded no content, falling back to manifest documents"
        );
        let package_path = doc.root_file.clone();
        let ids = match doc.get_resource_str_by_path(&package_path) {
            Some(opf) => manifest_document_ids(&opf),
            None => {
                warn!(path = %path.display(), "Package document unreadable, no manifest order");
                Vec::new()
            }
        };
        let mut manifest_fragments = Vec::new();
        for id in ids {
            match doc.get_resource_str(&id) {
                Some((body, _)) => manifest_fragments.push(body),
                None => warn!(%id, "Failed to decode manifest document, skipping"),
            }
        }
        content = join_fragments(manifest_fragments);
    }

    info!(
        chapters,
        toc_entries = toc.len(),
        total_chars = content.len(),
        "Finished loading EPUB content"
    );
    Ok(EpubDocument {
        metadata,
        toc,
        content,
    })
}

#[cfg(not(feature = "epub"))]
pub fn parse_epub(path: &Path) -> Result<EpubDocument> {
    warn!(path = %path.display(), "EPUB support not compiled in");
    Err(ReaderError::UnsupportedFormat(
        "EPUB support is not available in this build".to_string(),
    ))
}
