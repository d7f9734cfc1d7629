//! Sandboxed document reading: path resolution, format detection and the
//! EPUB, FB2, CBZ and plain-text normalizers behind a single [`Library`].

pub mod cache;
pub mod classify;
pub mod comic;
pub mod config;
pub mod epub_loader;
pub mod error;
pub mod fb2;
pub mod library;
pub mod normalizer;
pub mod sandbox;
pub mod uploads;

#[cfg(test)]
mod test_support;

pub use cache::{FileDescriptor, FileInfoCache};
pub use classify::{Classification, FormatFamily, FormatLabel, classify};
pub use comic::{ComicArchive, ComicPage};
pub use config::{ReaderConfig, load_config};
pub use epub_loader::{EpubDocument, parse_epub};
pub use error::{ReaderError, Result};
pub use fb2::{Fb2Document, parse_fb2};
pub use library::{Library, Listing, ReadOutcome};
pub use normalizer::{PreparedText, RenderKind, TextNormalizer};
pub use sandbox::{PathSandbox, validate_filename};
pub use uploads::{StagedUpload, TempUploads};
