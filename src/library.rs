//! The read surface over a sandboxed document tree.
//!
//! [`Library`] ties the pieces together: listing goes through the lenient
//! sandbox policy, everything that touches file content goes through the
//! strict one, and reads are dispatched to the normalizer for the file's
//! format family.

use crate::cache::{FileDescriptor, FileInfoCache};
use crate::classify::{FormatFamily, classify};
use crate::comic::{self, ComicArchive, ComicPage};
use crate::config::ReaderConfig;
use crate::epub_loader::{EpubDocument, parse_epub};
use crate::error::{ReaderError, Result};
use crate::fb2::{Fb2Document, parse_fb2};
use crate::normalizer::{PreparedText, TextNormalizer, UNREADABLE_PLACEHOLDER, decode_text};
use crate::sandbox::{PathSandbox, validate_filename};
use crate::uploads::{TEMP_PREFIX, TempUploads};
use percent_encoding::percent_decode_str;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

const HTML_DECODE_PLACEHOLDER: &str = "Unable to decode HTML file";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryEntry {
    pub name: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    #[serde(flatten)]
    pub descriptor: FileDescriptor,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Listing {
    /// Relative path of the listed directory, empty at the root.
    pub current_path: String,
    pub parent: Option<String>,
    pub directories: Vec<DirectoryEntry>,
    pub files: Vec<FileEntry>,
}

/// What a read produced, ready for the rendering layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum ReadOutcome {
    /// Rendered client-side; only the location is returned.
    Pdf { path: PathBuf },
    Epub(EpubDocument),
    Html { content: String },
    Comic(ComicArchive),
    Fb2(Fb2Document),
    Text(PreparedText),
    /// Not viewable in the reader; stream the file as-is.
    Download { path: PathBuf },
}

#[derive(Debug)]
pub struct Library {
    sandbox: PathSandbox,
    uploads: Option<TempUploads>,
    cache: FileInfoCache,
    normalizer: TextNormalizer,
}

impl Library {
    pub fn new(sandbox: PathSandbox, uploads: Option<TempUploads>, config: &ReaderConfig) -> Self {
        Self {
            sandbox,
            uploads,
            cache: FileInfoCache::new(config.file_info_cache_capacity),
            normalizer: TextNormalizer::new(config.cjk_indent),
        }
    }

    /// Build a library from configuration, creating the library and upload
    /// directories when they do not exist yet.
    pub fn open(config: &ReaderConfig) -> Result<Self> {
        let root = &config.root_dir;
        fs::create_dir_all(root).map_err(|err| ReaderError::io(root, err))?;
        let sandbox = PathSandbox::new(root)?;
        let uploads = TempUploads::open(&config.temp_dir, config.max_upload_bytes)?;
        info!(
            root = %sandbox.root().display(),
            uploads = %uploads.sandbox().root().display(),
            "Library opened"
        );
        Ok(Self::new(sandbox, Some(uploads), config))
    }

    pub fn sandbox(&self) -> &PathSandbox {
        &self.sandbox
    }

    pub fn uploads(&self) -> Option<&TempUploads> {
        self.uploads.as_ref()
    }

    pub fn cache(&self) -> &FileInfoCache {
        &self.cache
    }

    /// List a directory. Unresolvable paths list the root instead.
    pub fn list(&self, relative_path: &str, query: Option<&str>) -> Result<Listing> {
        let dir = self.sandbox.resolve_or_root(relative_path);
        if !dir.is_dir() {
            return Err(ReaderError::NotADirectory(dir));
        }
        let current_path = self.sandbox.relative(&dir).unwrap_or_default();
        let parent = parent_of(&current_path);
        let query = query
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_lowercase);

        let mut listing = Listing {
            current_path,
            parent,
            directories: Vec::new(),
            files: Vec::new(),
        };

        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::PermissionDenied => {
                error!(path = %dir.display(), "Permission denied listing directory");
                return Ok(listing);
            }
            Err(err) => return Err(ReaderError::io(&dir, err)),
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(path = %dir.display(), "Skipping unreadable directory entry: {err}");
                    continue;
                }
            };
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            if !validate_filename(&name) {
                warn!(name = %name, "Skipping entry with invalid filename");
                continue;
            }
            if let Some(query) = &query {
                if !name.to_lowercase().contains(query.as_str()) {
                    continue;
                }
            }

            let path = if listing.current_path.is_empty() {
                name.clone()
            } else {
                format!("{}/{name}", listing.current_path)
            };
            let full = entry.path();
            if full.is_dir() {
                listing.directories.push(DirectoryEntry { name, path });
            } else {
                let descriptor = self.cache.describe(&full);
                if descriptor.is_readable_in_app {
                    listing.files.push(FileEntry { descriptor, path });
                }
            }
        }

        listing
            .directories
            .sort_by_key(|entry| entry.name.to_lowercase());
        listing
            .files
            .sort_by_key(|entry| entry.descriptor.name.to_lowercase());
        debug!(
            path = %listing.current_path,
            directories = listing.directories.len(),
            files = listing.files.len(),
            "Listed directory"
        );
        Ok(listing)
    }

    /// Resolve a file for reading. Never falls back to the root.
    pub fn resolve_file(&self, relative_path: &str) -> Result<PathBuf> {
        let path = match relative_path.strip_prefix(TEMP_PREFIX) {
            Some(rest) => {
                let uploads = self
                    .uploads
                    .as_ref()
                    .ok_or_else(|| ReaderError::NotFound(relative_path.to_string()))?;
                uploads.sandbox().resolve(rest)?
            }
            None => self.sandbox.resolve(relative_path)?,
        };
        if !path.is_file() {
            return Err(ReaderError::NotAFile(path));
        }
        Ok(path)
    }

    pub fn describe(&self, relative_path: &str) -> Result<FileDescriptor> {
        let path = self.resolve_file(relative_path)?;
        Ok(self.cache.describe(&path))
    }

    /// Read and normalize a file according to its format.
    pub fn read(&self, relative_path: &str) -> Result<ReadOutcome> {
        let path = self.resolve_file(relative_path)?;
        let classification = classify(&path);
        info!(
            path = %path.display(),
            family = ?classification.family,
            "Reading file"
        );

        let outcome = match classification.family {
            FormatFamily::Pdf => ReadOutcome::Pdf { path },
            FormatFamily::Epub => ReadOutcome::Epub(parse_epub(&path)?),
            FormatFamily::Cbz => ReadOutcome::Comic(ComicArchive::open(&path)?),
            FormatFamily::Fb2 => ReadOutcome::Fb2(parse_fb2(&path)?),
            FormatFamily::Html => ReadOutcome::Html {
                content: self.read_html(&path)?,
            },
            _ if classification.is_text_like => ReadOutcome::Text(self.read_text(&path)?),
            _ => ReadOutcome::Download { path },
        };
        Ok(outcome)
    }

    /// Location of a file to stream unmodified.
    pub fn download(&self, relative_path: &str) -> Result<PathBuf> {
        self.resolve_file(relative_path)
    }

    pub fn comic_pages(&self, relative_path: &str) -> Result<ComicArchive> {
        ComicArchive::open(&self.resolve_file(relative_path)?)
    }

    /// Fetch one comic page. Both arguments arrive percent-encoded.
    pub fn comic_page(&self, encoded_archive_path: &str, encoded_entry: &str) -> Result<ComicPage> {
        let archive_path = percent_decode_str(encoded_archive_path).decode_utf8_lossy();
        let path = self.resolve_file(&archive_path)?;
        comic::read_page(&path, encoded_entry)
    }

    fn read_html(&self, path: &Path) -> Result<String> {
        let bytes = fs::read(path).map_err(|err| ReaderError::io(path, err))?;
        Ok(match decode_text(&bytes) {
            Ok(decoded) => decoded.text,
            Err(err) => {
                warn!(path = %path.display(), "{err}");
                HTML_DECODE_PLACEHOLDER.to_string()
            }
        })
    }

    fn read_text(&self, path: &Path) -> Result<PreparedText> {
        let bytes = fs::read(path).map_err(|err| ReaderError::io(path, err))?;
        match decode_text(&bytes) {
            Ok(decoded) => {
                debug!(path = %path.display(), encoding = decoded.encoding, "Decoded text");
                Ok(self.normalizer.prepare(path, decoded.text))
            }
            Err(err) => {
                warn!(path = %path.display(), "{err}");
                let mut prepared = self.normalizer.prepare(path, String::new());
                prepared.content = UNREADABLE_PLACEHOLDER.to_string();
                Ok(prepared)
            }
        }
    }
}

fn parent_of(current_path: &str) -> Option<String> {
    if current_path.is_empty() {
        return None;
    }
    Some(
        current_path
            .rsplit_once('/')
            .map(|(parent, _)| parent.to_string())
            .unwrap_or_default(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn library() -> (TempDir, Library) {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("lib");
        fs::create_dir_all(root.join("Sub/Deeper")).unwrap();
        fs::write(root.join("notes.txt"), "one\n\ntwo").unwrap();
        fs::write(root.join("Alpha.md"), "# Head").unwrap();
        fs::write(root.join("blob.bin"), [0u8, 1, 2, 0, 0, 0, 0, 0, 0, 9]).unwrap();
        fs::write(root.join(".secret.txt"), "hidden").unwrap();
        fs::write(root.join("Sub/inner.py"), "print(1)").unwrap();
        let config = ReaderConfig {
            root_dir: root,
            temp_dir: dir.path().join("temp"),
            ..ReaderConfig::default()
        };
        let library = Library::open(&config).unwrap();
        (dir, library)
    }

    #[test]
    fn parent_paths() {
        assert_eq!(parent_of(""), None);
        assert_eq!(parent_of("Sub"), Some(String::new()));
        assert_eq!(parent_of("Sub/Deeper"), Some("Sub".to_string()));
    }

    #[test]
    fn lists_root_sorted_and_filtered() {
        let (_dir, library) = library();
        let listing = library.list("", None).unwrap();
        assert_eq!(listing.current_path, "");
        assert_eq!(listing.parent, None);
        assert_eq!(listing.directories, vec![DirectoryEntry {
            name: "Sub".into(),
            path: "Sub".into()
        }]);
        let names: Vec<_> = listing.files.iter().map(|f| f.descriptor.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha.md", "notes.txt"]);
    }

    #[test]
    fn lists_subdirectory_with_parent() {
        let (_dir, library) = library();
        let listing = library.list("Sub", None).unwrap();
        assert_eq!(listing.current_path, "Sub");
        assert_eq!(listing.parent.as_deref(), Some(""));
        assert_eq!(listing.directories[0].path, "Sub/Deeper");
        assert_eq!(listing.files[0].path, "Sub/inner.py");
    }

    #[test]
    fn query_is_case_insensitive() {
        let (_dir, library) = library();
        let listing = library.list("", Some("ALP")).unwrap();
        assert!(listing.directories.is_empty());
        assert_eq!(listing.files.len(), 1);
        assert_eq!(listing.files[0].path, "Alpha.md");
    }

    #[test]
    fn escaping_listing_falls_back_to_root() {
        let (_dir, library) = library();
        let listing = library.list("../../..", None).unwrap();
        assert_eq!(listing.current_path, "");
        let missing = library.list("nope", None).unwrap();
        assert_eq!(missing.current_path, "");
    }

    #[test]
    fn listing_a_file_is_not_a_directory() {
        let (_dir, library) = library();
        assert!(matches!(
            library.list("notes.txt", None),
            Err(ReaderError::NotADirectory(_))
        ));
    }

    #[test]
    fn read_dispatches_text_kinds() {
        let (_dir, library) = library();
        match library.read("notes.txt").unwrap() {
            ReadOutcome::Text(prepared) => {
                assert_eq!(prepared.content, "\u{3000}\u{3000}one\n\n\u{3000}\u{3000}two");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(matches!(library.read("blob.bin").unwrap(), ReadOutcome::Download { .. }));
    }

    #[test]
    fn read_is_strict() {
        let (_dir, library) = library();
        assert!(matches!(library.read("missing.txt"), Err(ReaderError::NotFound(_))));
        assert!(matches!(library.read("Sub"), Err(ReaderError::NotAFile(_))));
        assert!(matches!(library.read(""), Err(ReaderError::NotAFile(_))));
        assert!(library.download("nope").unwrap_err().is_client_error());
    }

    #[test]
    fn staged_uploads_read_back_through_the_prefix() {
        let (_dir, library) = library();
        let staged = library.uploads().unwrap().stage("up.txt", b"hi").unwrap();
        match library.read(&staged.read_path).unwrap() {
            ReadOutcome::Text(prepared) => assert_eq!(prepared.content, "\u{3000}\u{3000}hi"),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(matches!(
            library.read("__temp__/../lib/notes.txt"),
            Err(ReaderError::NotFound(_))
        ));
    }

    #[test]
    fn undecodable_text_becomes_placeholder() {
        let (dir, library) = library();
        fs::write(dir.path().join("lib/bad.txt"), [0xFFu8, 0xFF, 0xFF]).unwrap();
        match library.read("bad.txt").unwrap() {
            ReadOutcome::Text(prepared) => assert_eq!(prepared.content, UNREADABLE_PLACEHOLDER),
            other => panic!("unexpected outcome {other:?}"),
        }
    }
}
