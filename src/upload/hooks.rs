//! Lifecycle hooks
//!
//! Per-file notifications, in order:
//!
//! | Hook | When |
//! |------|------|
//! | `on_upload_start` | before any network activity; may replace the file |
//! | `on_progress` | `0%`/`Waiting` at enqueue, then during the transfer |
//! | `on_signed_url` | authorization succeeded, transfer not yet started |
//! | `on_finish` | upload accepted by storage (terminal) |
//! | `on_error` | any failure (terminal, at most once) |
//!
//! Exactly one of `on_finish` / `on_error` fires per file unless
//! `on_upload_start` ends the flow or a custom signer never resolves.

use super::{ErrorContext, SignResult, UploadFile};
use async_trait::async_trait;
use std::fmt;

/// Transfer status reported alongside a progress percentage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStatus {
    Waiting,
    Uploading,
    Finalizing,
    Completed,
}

impl ProgressStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "Waiting",
            Self::Uploading => "Uploading",
            Self::Finalizing => "Finalizing",
            Self::Completed => "Upload completed",
        }
    }

    /// Status for a mid-transfer percentage
    pub fn for_percent(percent: u8) -> Self {
        if percent == 100 {
            Self::Finalizing
        } else {
            Self::Uploading
        }
    }
}

impl fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-facing lifecycle notifications.
///
/// Every method has a default, so implementors override only what they need.
#[async_trait]
pub trait UploadHooks: Send + Sync {
    /// Called before any network activity.
    ///
    /// Return the file to continue (possibly transformed, e.g. resized), or
    /// `None` to end this file's flow without further notifications.
    async fn on_upload_start(&self, file: UploadFile) -> Option<UploadFile> {
        tracing::debug!(file = %file.name, bytes = file.len(), "Upload starting");
        Some(file)
    }

    fn on_progress(&self, percent: u8, status: ProgressStatus, file: &UploadFile) {
        tracing::trace!(file = %file.name, percent, status = %status, "Upload progress");
    }

    fn on_signed_url(&self, _result: &SignResult) {}

    fn on_finish(&self, sign_result: &SignResult, file: &UploadFile) {
        tracing::debug!(
            file = %file.name,
            public_url = ?sign_result.public_url(),
            "Upload finished"
        );
    }

    fn on_error(&self, message: &str, file: &UploadFile, context: Option<&ErrorContext>) {
        tracing::debug!(
            file = %file.name,
            error = %message,
            status = context.map(|c| c.status),
            "Upload failed"
        );
    }
}

/// Hooks that only log, at levels suited to an interactive client
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingHooks;

#[async_trait]
impl UploadHooks for LoggingHooks {
    fn on_progress(&self, percent: u8, status: ProgressStatus, file: &UploadFile) {
        tracing::info!(file = %file.name, percent, status = %status, "Upload progress");
    }

    fn on_signed_url(&self, result: &SignResult) {
        tracing::debug!(public_url = ?result.public_url(), "Received signed URL");
    }

    fn on_finish(&self, sign_result: &SignResult, file: &UploadFile) {
        tracing::info!(
            file = %file.name,
            public_url = ?sign_result.public_url(),
            "Upload finished"
        );
    }

    fn on_error(&self, message: &str, file: &UploadFile, context: Option<&ErrorContext>) {
        tracing::warn!(
            file = %file.name,
            error = %message,
            status = context.map(|c| c.status),
            status_text = context.map(|c| c.status_text.as_str()),
            "Upload failed"
        );
    }
}
