//! Upload module
//!
//! Two-phase direct uploads: obtain a signed URL for a file, then PUT the
//! file bytes straight to object storage using that URL.

use serde::{Serialize, Serializer};
use thiserror::Error;

pub mod engine;
pub mod file;
pub mod hooks;
pub mod sign;
pub mod transfer;

pub use engine::{FlowOutcome, S3Uploader, UploadBatch};
pub use file::{sanitize_file_name, UploadFile};
pub use hooks::{LoggingHooks, ProgressStatus, UploadHooks};
pub use sign::{SignResult, SignedUrlProvider, SigningEndpoint};
pub use transfer::{TransferHandle, Transport};

/// Request lifecycle state at the moment of failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Unsent,
    Opened,
    HeadersReceived,
    Loading,
    Done,
}

impl ReadyState {
    /// Numeric code (0-4)
    pub fn code(self) -> u8 {
        match self {
            Self::Unsent => 0,
            Self::Opened => 1,
            Self::HeadersReceived => 2,
            Self::Loading => 3,
            Self::Done => 4,
        }
    }
}

impl Serialize for ReadyState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

/// Diagnostic snapshot of a failed HTTP exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorContext {
    pub response: String,
    pub status: u16,
    pub status_text: String,
    pub ready_state: ReadyState,
}

impl ErrorContext {
    /// Context for a completed exchange
    pub fn completed(status: reqwest::StatusCode, response: String) -> Self {
        Self {
            response,
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            ready_state: ReadyState::Done,
        }
    }

    /// Context for an exchange that failed before a status was obtained
    pub fn network_failure() -> Self {
        Self {
            response: String::new(),
            status: 0,
            status_text: String::new(),
            ready_state: ReadyState::Done,
        }
    }

    /// Context for a transfer cancelled through its handle
    pub fn aborted() -> Self {
        Self {
            ready_state: ReadyState::Unsent,
            ..Self::network_failure()
        }
    }
}

/// Upload errors
///
/// The `Display` text of each variant is the message handed to
/// [`UploadHooks::on_error`].
#[derive(Error, Debug, Clone)]
pub enum UploadError {
    #[error("CORS not supported")]
    UnsupportedTransport,

    #[error("Could not contact request signing server. Status = {}", .context.status)]
    SigningStatus { context: ErrorContext },

    #[error("Invalid response from server")]
    InvalidSignResponse { context: ErrorContext },

    #[error("Signing provider error: {0}")]
    Provider(String),

    #[error("Upload error: {}", .context.status)]
    UploadStatus { context: ErrorContext },

    #[error("XHR error")]
    Transport { context: ErrorContext },
}

impl UploadError {
    /// Transport snapshot, if the error came from an HTTP exchange
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Self::SigningStatus { context }
            | Self::InvalidSignResponse { context }
            | Self::UploadStatus { context }
            | Self::Transport { context } => Some(context),
            Self::UnsupportedTransport | Self::Provider(_) => None,
        }
    }

    /// Short label used for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnsupportedTransport => "unsupported_transport",
            Self::SigningStatus { .. } => "signing_status",
            Self::InvalidSignResponse { .. } => "invalid_sign_response",
            Self::Provider(_) => "provider",
            Self::UploadStatus { .. } => "upload_status",
            Self::Transport { .. } => "transport",
        }
    }
}
