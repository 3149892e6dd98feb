//! Direct Uploadr Library
//!
//! Uploads client-held files straight to S3-compatible object storage using
//! short-lived pre-signed URLs, so file bytes never pass through the
//! application server.
//!
//! # Features
//!
//! - **Two-Phase Flow**: sign request against an application endpoint, then PUT to storage
//! - **Pluggable Signing**: replace the signing endpoint with any async provider
//! - **Lifecycle Hooks**: start, progress, signed URL, finish and error notifications
//! - **Concurrent Files**: every file runs as an independent task
//! - **Abort**: cancel the most recent in-flight transfer
//!
//! # Example
//!
//! ```no_run
//! use direct_uploadr::{S3Uploader, UploadFile, UploaderOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let options = UploaderOptions::load("uploader.yaml")?;
//!     let uploader = S3Uploader::new(options)?;
//!     let file = UploadFile::from_path("report.pdf").await?;
//!     uploader.handle(vec![file]).join().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod metrics;
pub mod selection;
pub mod upload;

// Re-export commonly used types
pub use config::{UploadSession, UploaderOptions};
pub use upload::{S3Uploader, UploadError, UploadFile, UploadHooks};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
