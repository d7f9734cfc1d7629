//! Format detection.
//!
//! Classification is extension-first. Only when the extension says nothing
//! useful do we open the file and sniff its first kilobyte, trying UTF-8,
//! then GBK, then Latin-1, and accepting the buffer as text when it is mostly
//! printable and not full of early NUL bytes.

use serde::{Serialize, Serializer};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;

const SNIFF_BYTES: u64 = 1024;
const NUL_WINDOW_CHARS: usize = 100;
const MAX_EARLY_NULS: usize = 5;
const MIN_PRINTABLE_RATIO: f64 = 0.80;

const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "py", "js", "css", "json", "xml", "csv", "log", "java", "cpp", "c", "h", "php",
    "rb", "go", "rs", "swift", "kt", "scala", "sh", "bat", "ps1", "sql", "yaml", "yml", "ini",
    "cfg", "conf", "toml",
];

const CODE_EXTENSIONS: &[&str] = &[
    "py", "js", "css", "java", "cpp", "c", "h", "php", "rb", "go", "rs", "swift", "kt", "scala",
    "sh", "bat", "ps1", "sql",
];

/// Short type label shown next to a file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FormatLabel {
    Pdf,
    Epub,
    Cbz,
    Fb2,
    Md,
    Html,
    Txt,
    Json,
    Xml,
    Csv,
    Log,
    Py,
    Js,
    Css,
    Java,
    Cpp,
    C,
    H,
    Php,
    Ruby,
    Go,
    Rust,
    Swift,
    Kotlin,
    Scala,
    Bash,
    Bat,
    Ps1,
    Sql,
    Yaml,
    /// Unlisted extension, upper-cased.
    Other(String),
    /// No extension at all.
    File,
    /// The file could not be inspected.
    Error,
}

impl FormatLabel {
    pub fn from_extension(ext: &str) -> Self {
        match ext {
            "pdf" => Self::Pdf,
            "epub" => Self::Epub,
            "cbz" => Self::Cbz,
            "fb2" => Self::Fb2,
            "md" => Self::Md,
            "html" | "htm" => Self::Html,
            "txt" => Self::Txt,
            "json" => Self::Json,
            "xml" => Self::Xml,
            "csv" => Self::Csv,
            "log" => Self::Log,
            "py" => Self::Py,
            "js" => Self::Js,
            "css" => Self::Css,
            "java" => Self::Java,
            "cpp" | "cc" | "cxx" => Self::Cpp,
            "c" => Self::C,
            "h" | "hpp" => Self::H,
            "php" => Self::Php,
            "rb" => Self::Ruby,
            "go" => Self::Go,
            "rs" => Self::Rust,
            "swift" => Self::Swift,
            "kt" => Self::Kotlin,
            "scala" => Self::Scala,
            "sh" => Self::Bash,
            "bat" => Self::Bat,
            "ps1" => Self::Ps1,
            "sql" => Self::Sql,
            "yaml" | "yml" => Self::Yaml,
            "" => Self::File,
            other => Self::Other(other.to_ascii_uppercase()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Pdf => "PDF",
            Self::Epub => "EPUB",
            Self::Cbz => "CBZ",
            Self::Fb2 => "FB2",
            Self::Md => "MD",
            Self::Html => "HTML",
            Self::Txt => "TXT",
            Self::Json => "JSON",
            Self::Xml => "XML",
            Self::Csv => "CSV",
            Self::Log => "LOG",
            Self::Py => "PY",
            Self::Js => "JS",
            Self::Css => "CSS",
            Self::Java => "JAVA",
            Self::Cpp => "C++",
            Self::C => "C",
            Self::H => "H",
            Self::Php => "PHP",
            Self::Ruby => "RUBY",
            Self::Go => "GO",
            Self::Rust => "RUST",
            Self::Swift => "SWIFT",
            Self::Kotlin => "KOTLIN",
            Self::Scala => "SCALA",
            Self::Bash => "BASH",
            Self::Bat => "BAT",
            Self::Ps1 => "PS1",
            Self::Sql => "SQL",
            Self::Yaml => "YAML",
            Self::Other(label) => label,
            Self::File => "FILE",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for FormatLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for FormatLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Which pipeline a file is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatFamily {
    Pdf,
    Epub,
    Cbz,
    Fb2,
    Html,
    Markdown,
    Code,
    Text,
    Binary,
}

impl FormatFamily {
    fn is_container(self) -> bool {
        matches!(
            self,
            Self::Pdf | Self::Epub | Self::Cbz | Self::Fb2 | Self::Html
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub label: FormatLabel,
    pub family: FormatFamily,
    pub is_text_like: bool,
    pub is_readable_in_app: bool,
}

/// Lower-cased extension without the dot, or an empty string.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default()
}

pub fn classify(path: &Path) -> Classification {
    let ext = extension_of(path);
    let label = FormatLabel::from_extension(&ext);
    let by_extension = family_for_extension(&ext);

    let is_text_like = if TEXT_EXTENSIONS.contains(&ext.as_str()) {
        true
    } else if by_extension.is_some_and(FormatFamily::is_container) {
        false
    } else {
        sniff_file(path)
    };

    let family = match by_extension {
        Some(family) => family,
        None if is_text_like => FormatFamily::Text,
        None => FormatFamily::Binary,
    };
    let is_readable_in_app = is_text_like || family.is_container();

    debug!(
        path = %path.display(),
        label = %label,
        ?family,
        is_text_like,
        "Classified file"
    );
    Classification {
        label,
        family,
        is_text_like,
        is_readable_in_app,
    }
}

fn family_for_extension(ext: &str) -> Option<FormatFamily> {
    match ext {
        "pdf" => Some(FormatFamily::Pdf),
        "epub" => Some(FormatFamily::Epub),
        "cbz" => Some(FormatFamily::Cbz),
        "fb2" => Some(FormatFamily::Fb2),
        "html" | "htm" => Some(FormatFamily::Html),
        "md" => Some(FormatFamily::Markdown),
        _ if is_code_extension(ext) => Some(FormatFamily::Code),
        _ if TEXT_EXTENSIONS.contains(&ext) => Some(FormatFamily::Text),
        _ => None,
    }
}

pub fn is_code_extension(ext: &str) -> bool {
    CODE_EXTENSIONS.contains(&ext)
}

/// Syntax-highlighting language for a code extension.
pub fn language_for_extension(ext: &str) -> &'static str {
    match ext {
        "py" => "python",
        "js" => "javascript",
        "css" => "css",
        "java" => "java",
        "cpp" => "cpp",
        "c" | "h" => "c",
        "php" => "php",
        "rb" => "ruby",
        "go" => "go",
        "rs" => "rust",
        "swift" => "swift",
        "kt" => "kotlin",
        "scala" => "scala",
        "sh" => "bash",
        "bat" => "batch",
        "ps1" => "powershell",
        "sql" => "sql",
        "yaml" | "yml" => "yaml",
        "json" => "json",
        "xml" => "xml",
        _ => "text",
    }
}

fn sniff_file(path: &Path) -> bool {
    let mut chunk = Vec::with_capacity(SNIFF_BYTES as usize);
    let read = File::open(path).and_then(|file| file.take(SNIFF_BYTES).read_to_end(&mut chunk));
    match read {
        Ok(_) => sniff_text(&chunk),
        Err(err) => {
            debug!(path = %path.display(), "Could not sniff file: {err}");
            false
        }
    }
}

/// Decide whether a leading chunk of bytes looks like text.
pub fn sniff_text(chunk: &[u8]) -> bool {
    if chunk.is_empty() {
        return false;
    }
    let candidates = [
        decode_utf8_prefix(chunk),
        encoding_rs::GBK
            .decode_without_bom_handling_and_without_replacement(chunk)
            .map(|text| text.into_owned()),
        Some(decode_latin1(chunk)),
    ];
    candidates
        .into_iter()
        .flatten()
        .any(|decoded| looks_like_text(&decoded))
}

/// UTF-8 decode that tolerates a multi-byte sequence cut off by the chunk end.
fn decode_utf8_prefix(chunk: &[u8]) -> Option<String> {
    match std::str::from_utf8(chunk) {
        Ok(text) => Some(text.to_string()),
        Err(err) if err.error_len().is_none() => {
            std::str::from_utf8(&chunk[..err.valid_up_to()])
                .ok()
                .map(str::to_string)
        }
        Err(_) => None,
    }
}

// Latin-1 maps each byte to the code point of the same value.
fn decode_latin1(chunk: &[u8]) -> String {
    chunk.iter().map(|&b| char::from(b)).collect()
}

fn looks_like_text(decoded: &str) -> bool {
    let early_nuls = decoded
        .chars()
        .take(NUL_WINDOW_CHARS)
        .filter(|&c| c == '\0')
        .count();
    if early_nuls > MAX_EARLY_NULS {
        return false;
    }

    let total = decoded.chars().count();
    if total == 0 {
        return false;
    }
    let printable = decoded
        .chars()
        .filter(|c| !c.is_control() || c.is_whitespace())
        .count();
    printable as f64 / total as f64 > MIN_PRINTABLE_RATIO
}
