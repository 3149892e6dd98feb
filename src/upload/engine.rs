//! Upload orchestration engine
//!
//! Each file handed to [`S3Uploader::handle`] runs as its own task through
//! start hook → authorization → transfer. Tasks from one call are
//! independent: they race freely and a failure in one never touches another.
//!
//! # Example
//!
//! ```no_run
//! use direct_uploadr::config::UploaderOptions;
//! use direct_uploadr::upload::{S3Uploader, UploadFile};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let uploader = S3Uploader::new(
//!     UploaderOptions::new()
//!         .server("https://app.example.com")
//!         .content_disposition("auto"),
//! )?;
//!
//! let batch = uploader.handle(vec![UploadFile::from_path("photo.jpg").await?]);
//! for outcome in batch.join().await {
//!     println!("{:?}", outcome.is_finished());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Abort
//!
//! The engine remembers only the most recently started transfer.
//! [`S3Uploader::abort_upload`] cancels that one, whichever file it belongs
//! to; earlier concurrent transfers are not reachable through it.

use super::{
    LoggingHooks, ProgressStatus, SignResult, SignedUrlProvider, SigningEndpoint, TransferHandle,
    Transport, UploadError, UploadFile, UploadHooks,
};
use crate::config::{UploadSession, UploaderOptions};
use crate::metrics;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

/// Lifecycle phase of a single file's flow, traced on every change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskPhase {
    Waiting,
    Authorizing,
    Transferring,
    Finished,
    Failed,
}

/// Terminal result of one file's flow
#[derive(Debug, Clone)]
pub enum FlowOutcome {
    /// Storage accepted the upload
    Finished(SignResult),
    /// The flow stopped at the reported error
    Failed(UploadError),
    /// The start hook declined the file
    Skipped,
}

impl FlowOutcome {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Finished(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// One file moving through the flow
struct FileTask {
    id: Uuid,
    file: UploadFile,
    phase: TaskPhase,
    transfer: Option<TransferHandle>,
}

impl FileTask {
    fn new(file: UploadFile) -> Self {
        Self {
            id: Uuid::new_v4(),
            file,
            phase: TaskPhase::Waiting,
            transfer: None,
        }
    }

    fn advance(&mut self, phase: TaskPhase) {
        tracing::trace!(from = ?self.phase, to = ?phase, "Task phase change");
        self.phase = phase;
    }

    fn release_transfer(&mut self) {
        if let Some(handle) = self.transfer.take() {
            tracing::trace!(transfer_id = %handle.id(), "Transfer handle released");
        }
    }
}

/// Handles for the tasks spawned by one [`S3Uploader::handle`] call
#[derive(Debug)]
pub struct UploadBatch {
    handles: Vec<JoinHandle<FlowOutcome>>,
}

impl UploadBatch {
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every flow to end, in submission order.
    ///
    /// Flows that stall (a start hook or signer that never resolves) keep
    /// this future pending. Tasks that panicked are logged and left out.
    pub async fn join(self) -> Vec<FlowOutcome> {
        futures::future::join_all(self.handles)
            .await
            .into_iter()
            .filter_map(|joined| match joined {
                Ok(outcome) => Some(outcome),
                Err(e) => {
                    tracing::error!(error = %e, "Upload task did not complete");
                    None
                }
            })
            .collect()
    }
}

struct UploaderInner {
    session: Arc<UploadSession>,
    hooks: Arc<dyn UploadHooks>,
    provider: Option<Arc<dyn SignedUrlProvider>>,
    endpoint: SigningEndpoint,
    transport: Transport,
    current_transfer: Mutex<Option<TransferHandle>>,
}

/// Builder for [`S3Uploader`]
pub struct UploaderBuilder {
    options: UploaderOptions,
    hooks: Arc<dyn UploadHooks>,
    provider: Option<Arc<dyn SignedUrlProvider>>,
}

impl UploaderBuilder {
    /// Replace the default logging hooks
    pub fn hooks(mut self, hooks: Arc<dyn UploadHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Delegate authorization to `provider` instead of the signing endpoint
    pub fn signed_url_provider(mut self, provider: Arc<dyn SignedUrlProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn build(self) -> Result<S3Uploader, UploadError> {
        let session = Arc::new(UploadSession::resolve(self.options));
        if session.test {
            tracing::info!(session = ?session, "Upload session constructed");
        }

        let inner = UploaderInner {
            endpoint: SigningEndpoint::new(session.clone())?,
            transport: Transport::new(session.clone())?,
            session,
            hooks: self.hooks,
            provider: self.provider,
            current_transfer: Mutex::new(None),
        };

        Ok(S3Uploader {
            inner: Arc::new(inner),
        })
    }
}

/// Direct-to-storage upload engine
#[derive(Clone)]
pub struct S3Uploader {
    inner: Arc<UploaderInner>,
}

impl S3Uploader {
    /// Create an uploader with default hooks and the signing endpoint
    pub fn new(options: UploaderOptions) -> Result<Self, UploadError> {
        Self::builder(options).build()
    }

    pub fn builder(options: UploaderOptions) -> UploaderBuilder {
        UploaderBuilder {
            options,
            hooks: Arc::new(LoggingHooks),
            provider: None,
        }
    }

    /// Resolved session configuration
    pub fn session(&self) -> &UploadSession {
        &self.inner.session
    }

    /// Start an upload flow for every file and return immediately.
    ///
    /// Must be called within a Tokio runtime.
    pub fn handle<I>(&self, files: I) -> UploadBatch
    where
        I: IntoIterator<Item = UploadFile>,
    {
        let handles = files
            .into_iter()
            .map(|file| {
                let uploader = self.clone();
                tokio::spawn(async move { uploader.upload(file).await })
            })
            .collect();

        UploadBatch { handles }
    }

    /// Run one file's flow to its end on the current task
    pub async fn upload(&self, file: UploadFile) -> FlowOutcome {
        let span = tracing::info_span!(
            "upload.flow",
            upload.file = %file.name,
            upload.task_id = tracing::field::Empty
        );
        self.run(file).instrument(span).await
    }

    /// Cancel the most recently started transfer.
    ///
    /// Returns `false` when no transfer has started yet. The cancelled
    /// transfer reports `XHR error` through `on_error`.
    pub fn abort_upload(&self) -> bool {
        match self.inner.current_transfer.lock().as_ref() {
            Some(handle) => {
                tracing::info!(transfer_id = %handle.id(), "Aborting upload");
                handle.abort();
                true
            }
            None => false,
        }
    }

    async fn run(&self, file: UploadFile) -> FlowOutcome {
        let hooks = &self.inner.hooks;

        let Some(file) = hooks.on_upload_start(file).await else {
            tracing::debug!("Start hook ended the flow");
            return FlowOutcome::Skipped;
        };

        let mut task = FileTask::new(file);
        tracing::Span::current().record("upload.task_id", tracing::field::display(task.id));
        hooks.on_progress(0, ProgressStatus::Waiting, &task.file);

        task.advance(TaskPhase::Authorizing);
        let sign_result = match self.authorize(&task.file).await {
            Ok(result) => result,
            Err(e) => return self.fail(&mut task, e),
        };

        task.advance(TaskPhase::Transferring);
        let handle = TransferHandle::new();
        *self.inner.current_transfer.lock() = Some(handle.clone());
        task.transfer = Some(handle.clone());

        let progress_hooks = hooks.clone();
        let progress_file = task.file.clone();
        let result = self
            .inner
            .transport
            .put(&task.file, &sign_result, &handle, move |percent, status| {
                progress_hooks.on_progress(percent, status, &progress_file)
            })
            .await;

        match result {
            Ok(()) => {
                task.release_transfer();
                hooks.on_progress(100, ProgressStatus::Completed, &task.file);
                hooks.on_finish(&sign_result, &task.file);
                task.advance(TaskPhase::Finished);
                FlowOutcome::Finished(sign_result)
            }
            Err(e) => self.fail(&mut task, e),
        }
    }

    async fn authorize(&self, file: &UploadFile) -> Result<SignResult, UploadError> {
        match &self.inner.provider {
            Some(provider) => provider.get_signed_url(file).await,
            None => {
                let result = self.inner.endpoint.request_signature(file).await?;
                self.inner.hooks.on_signed_url(&result);
                Ok(result)
            }
        }
    }

    fn fail(&self, task: &mut FileTask, error: UploadError) -> FlowOutcome {
        task.release_transfer();
        self.inner
            .hooks
            .on_error(&error.to_string(), &task.file, error.context());
        metrics::record_error(error.kind());
        task.advance(TaskPhase::Failed);
        FlowOutcome::Failed(error)
    }
}
