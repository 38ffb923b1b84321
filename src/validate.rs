//! File acceptance checks
//!
//! The validator is a pure function of the file: size, then declared type,
//! then filename extension, stopping at the first failure. The extension
//! check runs even when the declared type is trusted, so a file named
//! `invoice.exe` is refused no matter what MIME type it claims.

use crate::config::DEFAULT_MAX_FILE_SIZE;
use crate::error::{Error, Result, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Extensions offered by the browse dialog
pub const ACCEPTED_EXTENSIONS: &[&str] = &["pdf", "jpg", "jpeg", "png"];

/// Executable and script extensions that are always refused
pub const DENIED_EXTENSIONS: &[&str] = &[
    "exe", "sh", "bat", "cmd", "app", "com", "msi", "scr", "ps1", "vbs", "jar", "dll",
];

/// Document types the system accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Pdf,
    Jpeg,
    Png,
}

impl FileType {
    /// Parse a declared MIME type, ignoring case and parameters
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        match essence.as_str() {
            "application/pdf" => Some(FileType::Pdf),
            "image/jpeg" => Some(FileType::Jpeg),
            "image/png" => Some(FileType::Png),
            _ => None,
        }
    }

    /// Guess the type from a filename extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(FileType::Pdf),
            "jpg" | "jpeg" => Some(FileType::Jpeg),
            "png" => Some(FileType::Png),
            _ => None,
        }
    }

    /// Canonical MIME type
    pub fn mime(&self) -> &'static str {
        match self {
            FileType::Pdf => "application/pdf",
            FileType::Jpeg => "image/jpeg",
            FileType::Png => "image/png",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime())
    }
}

/// A file picked by the user
///
/// Immutable once constructed; the size always matches the byte length.
#[derive(Clone, PartialEq, Eq)]
pub struct SelectedFile {
    name: String,
    declared_type: String,
    bytes: Vec<u8>,
}

impl SelectedFile {
    /// Create a file from in-memory contents
    pub fn new(name: impl Into<String>, declared_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        SelectedFile {
            name: name.into(),
            declared_type: declared_type.into(),
            bytes,
        }
    }

    /// Read a file from disk.
    ///
    /// When no type is declared it is inferred from the extension; unknown
    /// extensions get `application/octet-stream`, which the validator refuses.
    pub fn from_path<P: AsRef<Path>>(path: P, declared_type: Option<&str>) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::Internal(format!("Invalid file name: {:?}", path)))?
            .to_string();

        let declared_type = match declared_type {
            Some(t) => t.to_string(),
            None => extension_of(&name)
                .and_then(|ext| FileType::from_extension(&ext))
                .map(|t| t.mime().to_string())
                .unwrap_or_else(|| "application/octet-stream".to_string()),
        };

        let bytes = std::fs::read(path)?;
        Ok(SelectedFile::new(name, declared_type, bytes))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn declared_type(&self) -> &str {
        &self.declared_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

impl fmt::Debug for SelectedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectedFile")
            .field("name", &self.name)
            .field("declared_type", &self.declared_type)
            .field("size", &self.bytes.len())
            .finish()
    }
}

/// Stateless file validator
#[derive(Debug, Clone, Copy)]
pub struct Validator {
    max_size: u64,
}

impl Default for Validator {
    fn default() -> Self {
        Validator::new(DEFAULT_MAX_FILE_SIZE)
    }
}

impl Validator {
    pub fn new(max_size: u64) -> Self {
        Validator { max_size }
    }

    /// Accept or refuse a file. Order: size, declared type, extension.
    pub fn validate(&self, file: &SelectedFile) -> std::result::Result<FileType, ValidationError> {
        if file.size() > self.max_size {
            return Err(ValidationError::TooLarge {
                size: file.size(),
                limit: self.max_size,
            });
        }

        let file_type = FileType::from_mime(file.declared_type()).ok_or_else(|| {
            ValidationError::UnsupportedType {
                declared: file.declared_type().to_string(),
            }
        })?;

        if let Some(ext) = extension_of(file.name()) {
            if DENIED_EXTENSIONS.contains(&ext.as_str()) {
                return Err(ValidationError::DangerousExtension { extension: ext });
            }
        }

        Ok(file_type)
    }
}

/// Lowercased final extension of a filename, if any.
///
/// Trailing dots and whitespace are ignored since Windows strips them on
/// save. A dotfile such as `.exe` counts as having that extension.
fn extension_of(name: &str) -> Option<String> {
    let name = name.trim_end_matches(|c: char| c == '.' || c.is_whitespace());
    let (_, ext) = name.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Keep only the first file of a multi-file drop
pub fn first_of_drop(files: Vec<SelectedFile>) -> Option<SelectedFile> {
    files.into_iter().next()
}

/// `accept` attribute for a browse dialog, e.g. `.pdf,.jpg,.jpeg,.png`
pub fn accept_attribute() -> String {
    ACCEPTED_EXTENSIONS
        .iter()
        .map(|ext| format!(".{}", ext))
        .collect::<Vec<_>>()
        .join(",")
}

/// Browse-layer filter; the validator still runs on whatever gets through
pub fn is_browse_acceptable(name: &str) -> bool {
    extension_of(name)
        .map(|ext| ACCEPTED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}
