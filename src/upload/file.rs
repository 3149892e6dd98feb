//! File handles submitted for upload

use bytes::Bytes;
use std::path::Path;

/// MIME type used when neither a declared nor an inferred type is known
pub const FALLBACK_MIME_TYPE: &str = "application/octet-stream";

/// A client-held file: name, optional declared MIME type and raw content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            content_type: None,
            data: data.into(),
        }
    }

    /// Attach a declared MIME type
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Read a file from disk. The declared type is left unset.
    pub async fn from_path<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::new(name, data))
    }

    /// Size in bytes
    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Declared MIME type, else a guess from the file extension.
    ///
    /// An empty declared type counts as unset.
    pub fn mime_type(&self) -> String {
        match self.content_type.as_deref() {
            Some(declared) if !declared.is_empty() => declared.to_string(),
            _ => mime_guess::from_path(&self.name)
                .first_raw()
                .unwrap_or(FALLBACK_MIME_TYPE)
                .to_string(),
        }
    }

    /// File name with everything outside `[A-Za-z0-9_.-]` removed
    pub fn sanitized_name(&self) -> String {
        sanitize_file_name(&self.name)
    }
}

/// Remove every character outside `[A-Za-z0-9_.-]`.
///
/// Characters are dropped, not replaced, so the function is idempotent.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        .collect()
}
