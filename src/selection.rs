//! File selection filter
//!
//! Implements the `accept` list grammar of HTML file inputs: comma-separated
//! entries, each a file extension (`.pdf`), a MIME wildcard (`image/*`) or an
//! exact MIME type (`application/json`). Matching is case-insensitive.

use crate::upload::UploadFile;

/// Whether `file` is allowed by the `accept` list.
///
/// An absent or blank list accepts everything.
pub fn accepts(accept: Option<&str>, file: &UploadFile) -> bool {
    let Some(accept) = accept.filter(|a| !a.trim().is_empty()) else {
        return true;
    };

    let name = file.name.to_ascii_lowercase();
    let mime_type = file.mime_type().to_ascii_lowercase();

    accept
        .split(',')
        .map(|entry| entry.trim().to_ascii_lowercase())
        .filter(|entry| !entry.is_empty())
        .any(|entry| {
            if entry.starts_with('.') {
                name.ends_with(&entry)
            } else if let Some(major) = entry.strip_suffix("/*") {
                mime_type
                    .split_once('/')
                    .is_some_and(|(file_major, _)| file_major == major)
            } else {
                mime_type == entry
            }
        })
}
