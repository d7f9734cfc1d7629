//! CBZ comic archives.
//!
//! A comic is a ZIP of images. Listing reads only the central directory;
//! pages are pulled out one at a time on request.

use crate::error::{ReaderError, Result};
use percent_encoding::percent_decode_str;
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};
use zip::ZipArchive;
use zip::result::ZipError;

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "gif", "webp"];
const MACOS_METADATA_PREFIX: &str = "__MACOSX/";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComicArchive {
    pub path: PathBuf,
    /// Image entry names in plain lexicographic order.
    pub pages: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComicPage {
    pub name: String,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

impl ComicArchive {
    pub fn open(path: &Path) -> Result<Self> {
        let pages = list_pages(path)?;
        debug!(path = %path.display(), pages = pages.len(), "Opened comic archive");
        Ok(Self {
            path: path.to_path_buf(),
            pages,
        })
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn read_page(&self, entry: &str) -> Result<ComicPage> {
        read_page(&self.path, entry)
    }
}

/// List the image pages of a CBZ.
pub fn list_pages(path: &Path) -> Result<Vec<String>> {
    let archive = open_archive(path)?;
    Ok(filter_pages(archive.file_names()))
}

/// Keep image entries, drop macOS metadata and directories, sort by name.
///
/// The sort is byte-wise, so `page10.jpg` comes before `page2.jpg`.
pub fn filter_pages<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut pages: Vec<String> = names
        .into_iter()
        .filter(|name| !name.starts_with(MACOS_METADATA_PREFIX) && !name.ends_with('/'))
        .filter(|name| has_image_extension(name))
        .map(str::to_string)
        .collect();
    pages.sort();
    pages
}

fn has_image_extension(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    IMAGE_EXTENSIONS
        .iter()
        .any(|ext| lower.rsplit_once('.').is_some_and(|(_, e)| e == *ext))
}

/// MIME type for a page, by extension. Unknown extensions are served as JPEG.
pub fn mime_for_entry(name: &str) -> &'static str {
    let lower = name.to_ascii_lowercase();
    if lower.ends_with(".png") {
        "image/png"
    } else if lower.ends_with(".gif") {
        "image/gif"
    } else if lower.ends_with(".webp") {
        "image/webp"
    } else {
        "image/jpeg"
    }
}

/// Read one page. `entry` may still be percent-encoded; the decoded name is
/// tried first, then the name exactly as given.
pub fn read_page(path: &Path, entry: &str) -> Result<ComicPage> {
    let decoded = percent_decode_str(entry).decode_utf8_lossy().into_owned();
    for candidate in [decoded.as_str(), entry] {
        if candidate.contains("..") || candidate.starts_with('/') || candidate.starts_with('\\') {
            warn!(entry = candidate, "Invalid comic page name requested");
            return Err(ReaderError::PathEscape(candidate.to_string()));
        }
    }

    let mut archive = open_archive(path)?;
    let index = archive
        .index_for_name(&decoded)
        .or_else(|| archive.index_for_name(entry))
        .ok_or_else(|| {
            error!(
                archive = %path.display(),
                entry = %decoded,
                raw = entry,
                "Image not found in comic archive"
            );
            ReaderError::NotFound(format!("{decoded} in {}", path.display()))
        })?;

    let mut file = archive
        .by_index(index)
        .map_err(|err| corrupt(path, err))?;
    let name = file.name().to_string();
    let mut bytes = Vec::with_capacity(usize::try_from(file.size()).unwrap_or(0));
    file.read_to_end(&mut bytes).map_err(|err| ReaderError::CorruptArchive {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;

    Ok(ComicPage {
        mime: mime_for_entry(&name),
        name,
        bytes,
    })
}

fn open_archive(path: &Path) -> Result<ZipArchive<BufReader<File>>> {
    let file = File::open(path).map_err(|err| ReaderError::io(path, err))?;
    ZipArchive::new(BufReader::new(file)).map_err(|err| {
        error!(path = %path.display(), "Bad CBZ file: {err}");
        corrupt(path, err)
    })
}

fn corrupt(path: &Path, err: ZipError) -> ReaderError {
    ReaderError::CorruptArchive {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}
