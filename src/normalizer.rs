//! Plain text, Markdown and source code preparation.
//!
//! Text files are decoded (UTF-8, then GBK) and tagged with how they should
//! be rendered. Markdown and `.txt` prose gets the CJK paragraph indent:
//! every paragraph that is not a heading, list item, quote or code fence is
//! prefixed with two full-width spaces. Turning Markdown into HTML is left to
//! the rendering layer.

use crate::classify::{extension_of, is_code_extension, language_for_extension};
use crate::error::{ReaderError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::path::Path;
use tracing::debug;

/// Shown instead of content when no fallback encoding fits.
pub const UNREADABLE_PLACEHOLDER: &str = "Unable to read file content";

const CJK_INDENT: &str = "\u{3000}\u{3000}";
const CODE_FENCE: &str = "```";

static RE_STRUCTURAL_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[#\-\*\+\d\.>]").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderKind {
    Markdown,
    Code,
    Txt,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreparedText {
    pub kind: RenderKind,
    pub language: Option<&'static str>,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedText {
    pub text: String,
    pub encoding: &'static str,
}

/// Decode file bytes as UTF-8, falling back to GBK.
pub fn decode_text(bytes: &[u8]) -> Result<DecodedText> {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return Ok(DecodedText {
            text: text.to_string(),
            encoding: "utf-8",
        });
    }
    encoding_rs::GBK
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(|text| DecodedText {
            text: text.into_owned(),
            encoding: "gbk",
        })
        .ok_or_else(|| ReaderError::Decode("neither UTF-8 nor GBK".to_string()))
}

#[derive(Debug, Clone)]
pub struct TextNormalizer {
    cjk_indent: bool,
}

impl TextNormalizer {
    pub fn new(cjk_indent: bool) -> Self {
        Self { cjk_indent }
    }

    /// Pick a render kind for `path` and transform `content` accordingly.
    pub fn prepare(&self, path: &Path, content: String) -> PreparedText {
        let ext = extension_of(path);
        let (kind, language, content) = if ext == "md" {
            (RenderKind::Markdown, None, self.indent(content))
        } else if is_code_extension(&ext) {
            (RenderKind::Code, Some(language_for_extension(&ext)), content)
        } else if ext == "txt" {
            (RenderKind::Txt, None, self.indent(content))
        } else {
            (RenderKind::Text, None, content)
        };
        debug!(path = %path.display(), ?kind, ?language, "Prepared text content");
        PreparedText {
            kind,
            language,
            content,
        }
    }

    fn indent(&self, content: String) -> String {
        if self.cjk_indent {
            indent_paragraphs(&content)
        } else {
            content
        }
    }
}

impl Default for TextNormalizer {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Split on blank lines, trim, drop empty paragraphs, indent prose
/// paragraphs and rejoin with blank lines.
pub fn indent_paragraphs(text: &str) -> String {
    text.split("\n\n")
        .map(str::trim)
        .filter(|para| !para.is_empty())
        .map(|para| {
            if RE_STRUCTURAL_PREFIX.is_match(para) || para.starts_with(CODE_FENCE) {
                para.to_string()
            } else {
                format!("{CJK_INDENT}{para}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
