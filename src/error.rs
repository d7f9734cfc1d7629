//! Error taxonomy shared by the sandbox, the classifiers and every normalizer.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReaderError>;

#[derive(Debug, Error)]
pub enum ReaderError {
    /// The requested path leaves the sandbox root.
    #[error("path escapes the sandbox: {0}")]
    PathEscape(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("not a file: {}", .0.display())]
    NotAFile(PathBuf),

    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("corrupt archive {}: {message}", path.display())]
    CorruptArchive { path: PathBuf, message: String },

    #[error("failed to parse EPUB {}: {message}", path.display())]
    EpubParse { path: PathBuf, message: String },

    /// Malformed FB2 markup. No partial document accompanies this error.
    #[error("FB2 parse error: {0}")]
    Fb2Parse(String),

    #[error("could not decode text: {0}")]
    Decode(String),

    /// An upload was refused before anything was written.
    #[error("upload rejected: {0}")]
    UploadRejected(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ReaderError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        if source.kind() == io::ErrorKind::NotFound {
            ReaderError::NotFound(path.display().to_string())
        } else {
            ReaderError::Io { path, source }
        }
    }

    /// True for failures caused by the request itself (bad path, missing
    /// file) rather than by the content or the host.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ReaderError::PathEscape(_)
                | ReaderError::NotFound(_)
                | ReaderError::NotAFile(_)
                | ReaderError::NotADirectory(_)
                | ReaderError::UploadRejected(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_io_error_becomes_not_found() {
        let err = ReaderError::io("/x/y", io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(err, ReaderError::NotFound(_)));
        assert!(err.is_client_error());
    }

    #[test]
    fn parse_failures_are_not_client_errors() {
        let err = ReaderError::Fb2Parse("unexpected end".into());
        assert!(!err.is_client_error());
        assert_eq!(err.to_string(), "FB2 parse error: unexpected end");
    }
}
