//! Shared test infrastructure
//!
//! - Recording hooks that capture every lifecycle notification
//! - Helpers for building uploaders against wiremock servers

#![allow(dead_code)]

use async_trait::async_trait;
use direct_uploadr::config::UploaderOptions;
use direct_uploadr::upload::{
    ErrorContext, ProgressStatus, S3Uploader, SignResult, SignedUrlProvider, UploadFile,
    UploadHooks,
};
use parking_lot::Mutex;
use std::sync::Arc;

/// One captured hook call
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Start(String),
    Progress(u8, ProgressStatus, String),
    SignedUrl(SignResult),
    Finish(SignResult, String),
    Error(String, String, Option<ErrorContext>),
}

/// Hooks that record every call in order
#[derive(Default)]
pub struct RecordingHooks {
    events: Mutex<Vec<Event>>,
}

impl RecordingHooks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Events concerning one file, in order
    pub fn events_for(&self, name: &str) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|event| match event {
                Event::Start(file)
                | Event::Progress(_, _, file)
                | Event::Finish(_, file)
                | Event::Error(_, file, _) => file == name,
                Event::SignedUrl(_) => false,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<(String, String, Option<ErrorContext>)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Error(message, file, context) => Some((message, file, context)),
                _ => None,
            })
            .collect()
    }

    pub fn finishes(&self) -> Vec<(SignResult, String)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Finish(result, file) => Some((result, file)),
                _ => None,
            })
            .collect()
    }

    pub fn signed_urls(&self) -> Vec<SignResult> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::SignedUrl(result) => Some(result),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: Event) {
        self.events.lock().push(event);
    }
}

#[async_trait]
impl UploadHooks for RecordingHooks {
    async fn on_upload_start(&self, file: UploadFile) -> Option<UploadFile> {
        self.push(Event::Start(file.name.clone()));
        Some(file)
    }

    fn on_progress(&self, percent: u8, status: ProgressStatus, file: &UploadFile) {
        self.push(Event::Progress(percent, status, file.name.clone()));
    }

    fn on_signed_url(&self, result: &SignResult) {
        self.push(Event::SignedUrl(result.clone()));
    }

    fn on_finish(&self, sign_result: &SignResult, file: &UploadFile) {
        self.push(Event::Finish(sign_result.clone(), file.name.clone()));
    }

    fn on_error(&self, message: &str, file: &UploadFile, context: Option<&ErrorContext>) {
        self.push(Event::Error(
            message.to_string(),
            file.name.clone(),
            context.cloned(),
        ));
    }
}

/// Signer that hands out a fixed result without any network call
pub struct StaticSigner(pub SignResult);

#[async_trait]
impl SignedUrlProvider for StaticSigner {
    async fn get_signed_url(&self, _file: &UploadFile) -> Result<SignResult, direct_uploadr::UploadError> {
        Ok(self.0.clone())
    }
}

/// Uploader pointed at `server` with recording hooks
pub fn uploader(options: UploaderOptions, hooks: Arc<RecordingHooks>) -> S3Uploader {
    S3Uploader::builder(options)
        .hooks(hooks)
        .build()
        .expect("uploader should build")
}

/// JSON body for a signing response
pub fn sign_body(signed_url: &str) -> serde_json::Value {
    serde_json::json!({
        "signedUrl": signed_url,
        "publicUrl": format!("{}?public", signed_url),
    })
}
