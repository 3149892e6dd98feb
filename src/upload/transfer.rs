//! Transfer phase
//!
//! PUTs the file bytes to the signed URL. The body is streamed in chunks so
//! progress can be reported while it is being sent.
//!
//! # Upload headers
//!
//! Header names are lower-cased and merged in this order, later entries
//! replacing earlier ones:
//!
//! 1. computed defaults: `content-type`, optional `content-disposition`, and
//!    `x-amz-acl: public-read` unless upload headers are configured
//! 2. `headers` from the [`SignResult`]
//! 3. configured `upload_request_headers`

use super::{ErrorContext, ProgressStatus, SignResult, UploadError, UploadFile};
use crate::config::{MapSource, StringMap, UploadSession};
use crate::metrics;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use reqwest::header::CONTENT_LENGTH;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Notify;
use uuid::Uuid;

/// Body chunk size used for progress reporting
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Access header sent when no upload headers are configured
pub const DEFAULT_ACL: (&str, &str) = ("x-amz-acl", "public-read");

/// Cancellation handle for one in-flight transfer
#[derive(Debug, Clone)]
pub struct TransferHandle {
    id: Uuid,
    cancel: Arc<Notify>,
}

impl TransferHandle {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            cancel: Arc::new(Notify::new()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Cancel the transfer. A transfer that has not started waiting yet is
    /// cancelled as soon as it does.
    pub fn abort(&self) {
        self.cancel.notify_one();
    }

    async fn cancelled(&self) {
        self.cancel.notified().await;
    }
}

impl Default for TransferHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Compute the merged, lower-cased header set for an upload
pub fn upload_headers(
    session: &UploadSession,
    file: &UploadFile,
    sign_result: &SignResult,
) -> StringMap {
    let mime_type = file.mime_type();
    let mut headers = StringMap::new();

    if session.upload_request_headers.is_none() {
        headers.insert(DEFAULT_ACL.0.to_string(), DEFAULT_ACL.1.to_string());
    }

    if let Some(policy) = &session.content_disposition {
        headers.insert(
            "content-disposition".to_string(),
            format!(
                "{}; filename=\"{}\"",
                policy.disposition_for(&mime_type),
                file.sanitized_name()
            ),
        );
    }

    headers.insert("content-type".to_string(), mime_type);

    let overrides = [
        Some(sign_result.header_values()),
        session
            .upload_request_headers
            .as_ref()
            .map(MapSource::resolve),
    ];
    for (name, value) in overrides.into_iter().flatten().flatten() {
        headers.insert(name.to_lowercase(), value);
    }

    headers
}

/// Shared between the request body and the exchange. Once closed, the body
/// reports no further progress and fails its next chunk so the connection
/// stops sending.
#[derive(Debug, Default)]
struct ProgressGate {
    closed: Mutex<bool>,
}

impl ProgressGate {
    /// Run `report` unless the gate is closed. Returns `false` when closed.
    fn report(&self, report: impl FnOnce()) -> bool {
        let closed = self.closed.lock();
        if *closed {
            return false;
        }
        report();
        true
    }

    /// Close the gate, waiting for a report in progress to finish
    fn close(&self) {
        *self.closed.lock() = true;
    }
}

/// Percentage of `loaded` over `total`, rounded
fn percent(loaded: u64, total: u64) -> u8 {
    ((loaded as f64 / total as f64) * 100.0).round().min(100.0) as u8
}

/// Upload transport: performs the authorized PUT
pub struct Transport {
    session: Arc<UploadSession>,
    client: reqwest::Client,
}

impl Transport {
    pub fn new(session: Arc<UploadSession>) -> Result<Self, UploadError> {
        let client = reqwest::Client::builder().build().map_err(|e| {
            tracing::error!(error = %e, "Failed to build upload HTTP client");
            UploadError::UnsupportedTransport
        })?;

        Ok(Self { session, client })
    }

    /// Upload `file` to `sign_result.signed_url`.
    ///
    /// `on_progress` is called as body chunks are handed to the connection,
    /// and never after this returns. Aborting `handle` fails the transfer
    /// with [`UploadError::Transport`].
    #[tracing::instrument(
        name = "upload.transfer",
        skip(self, file, sign_result, handle, on_progress),
        fields(
            upload.file = %file.name,
            upload.bytes = file.len(),
            upload.transfer_id = %handle.id(),
            http.method = "PUT",
            http.status_code = tracing::field::Empty
        ),
        err(Display)
    )]
    pub async fn put<F>(
        &self,
        file: &UploadFile,
        sign_result: &SignResult,
        handle: &TransferHandle,
        on_progress: F,
    ) -> Result<(), UploadError>
    where
        F: Fn(u8, ProgressStatus) + Send + Sync + 'static,
    {
        let url = reqwest::Url::parse(&sign_result.signed_url)
            .ok()
            .filter(|u| matches!(u.scheme(), "http" | "https"))
            .ok_or(UploadError::UnsupportedTransport)?;

        let total = file.len();
        let chunks: Vec<Bytes> = (0..file.data.len())
            .step_by(CHUNK_SIZE)
            .map(|start| file.data.slice(start..(start + CHUNK_SIZE).min(file.data.len())))
            .collect();
        let gate = Arc::new(ProgressGate::default());
        let body_gate = gate.clone();
        let mut loaded = 0u64;
        let body = futures::stream::iter(chunks).map(move |chunk| {
            loaded += chunk.len() as u64;
            let pct = percent(loaded, total);
            if body_gate.report(|| on_progress(pct, ProgressStatus::for_percent(pct))) {
                Ok(chunk)
            } else {
                Err(std::io::Error::new(
                    std::io::ErrorKind::ConnectionAborted,
                    "transfer already settled",
                ))
            }
        });

        let mut request = self
            .client
            .put(url)
            .header(CONTENT_LENGTH, total)
            .body(reqwest::Body::wrap_stream(body));
        for (name, value) in upload_headers(&self.session, file, sign_result) {
            request = request.header(name, value);
        }

        let start_time = Instant::now();
        let exchange = async {
            let response = request.send().await;
            gate.close();
            let response = response?;
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Ok::<_, reqwest::Error>((status, body))
        };

        let outcome = tokio::select! {
            _ = handle.cancelled() => {
                gate.close();
                tracing::info!("Transfer aborted");
                metrics::record_upload_failure("aborted");
                return Err(UploadError::Transport {
                    context: ErrorContext::aborted(),
                });
            }
            outcome = exchange => outcome,
        };
        metrics::record_upload_duration(start_time.elapsed().as_secs_f64());

        let (status, body) = match outcome {
            Ok(exchange) => exchange,
            Err(e) => {
                tracing::warn!(error = %e, "Transfer failed before a response");
                metrics::record_upload_failure("transport");
                return Err(UploadError::Transport {
                    context: ErrorContext::network_failure(),
                });
            }
        };

        tracing::Span::current().record("http.status_code", status.as_u16());

        if self.session.is_success(status.as_u16()) {
            metrics::record_upload_success(total);
            tracing::debug!(
                duration_ms = start_time.elapsed().as_millis() as u64,
                "Transfer accepted by storage"
            );
            Ok(())
        } else {
            metrics::record_upload_failure("status");
            Err(UploadError::UploadStatus {
                context: ErrorContext::completed(status, body),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UploaderOptions;

    fn session(options: UploaderOptions) -> UploadSession {
        UploadSession::resolve(options)
    }

    #[test]
    fn test_default_headers() {
        let headers = upload_headers(
            &session(UploaderOptions::new()),
            &UploadFile::new("a.png", "x"),
            &SignResult::new("https://s3/a"),
        );
        assert_eq!(headers["content-type"], "image/png");
        assert_eq!(headers["x-amz-acl"], "public-read");
        assert!(!headers.contains_key("content-disposition"));
    }

    #[test]
    fn test_auto_disposition_for_image() {
        let headers = upload_headers(
            &session(UploaderOptions::new().content_disposition("auto")),
            &UploadFile::new("my pic.png", "x"),
            &SignResult::new("https://s3/a"),
        );
        assert_eq!(headers["content-disposition"], "inline; filename=\"mypic.png\"");
    }

    #[test]
    fn test_auto_disposition_for_document() {
        let headers = upload_headers(
            &session(UploaderOptions::new().content_disposition("auto")),
            &UploadFile::new("report.pdf", "x"),
            &SignResult::new("https://s3/a"),
        );
        assert_eq!(
            headers["content-disposition"],
            "attachment; filename=\"report.pdf\""
        );
    }

    #[test]
    fn test_empty_disposition_sends_no_header() {
        let headers = upload_headers(
            &session(UploaderOptions::new().content_disposition("")),
            &UploadFile::new("a.pdf", "x"),
            &SignResult::new("https://s3/a"),
        );
        assert!(!headers.contains_key("content-disposition"));
    }

    #[test]
    fn test_configured_headers_disable_acl_default() {
        let headers = upload_headers(
            &session(UploaderOptions::new().upload_request_headers(StringMap::from([(
                "Cache-Control".to_string(),
                "max-age=60".to_string(),
            )]))),
            &UploadFile::new("a.txt", "x"),
            &SignResult::new("https://s3/a"),
        );
        assert!(!headers.contains_key("x-amz-acl"));
        assert_eq!(headers["cache-control"], "max-age=60");
    }

    #[test]
    fn test_header_precedence() {
        let sign_result = SignResult::new("https://s3/a")
            .with_header("Content-Type", "from/sign")
            .with_header("X-Amz-Acl", "private")
            .with_header("x-sign-only", 1);

        let headers = upload_headers(
            &session(UploaderOptions::new().upload_request_headers(MapSource::computed(|| {
                StringMap::from([("CONTENT-TYPE".to_string(), "from/config".to_string())])
            }))),
            &UploadFile::new("a.txt", "x"),
            &sign_result,
        );

        assert_eq!(headers["content-type"], "from/config");
        assert_eq!(headers["x-amz-acl"], "private");
        assert_eq!(headers["x-sign-only"], "1");
    }

    #[test]
    fn test_sign_headers_override_defaults() {
        let sign_result =
            SignResult::new("https://s3/a").with_header("Content-Type", "application/x-custom");
        let headers = upload_headers(
            &session(UploaderOptions::new()),
            &UploadFile::new("a.txt", "x"),
            &sign_result,
        );
        assert_eq!(headers["content-type"], "application/x-custom");
        assert_eq!(headers["x-amz-acl"], "public-read");
    }

    #[test]
    fn test_percent_rounding() {
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(2, 3), 67);
        assert_eq!(percent(3, 3), 100);
    }

    #[test]
    fn test_closed_gate_reports_nothing() {
        let gate = ProgressGate::default();
        let mut reports = 0;
        assert!(gate.report(|| reports += 1));
        gate.close();
        assert!(!gate.report(|| reports += 1));
        assert_eq!(reports, 1);
    }

    #[tokio::test]
    async fn test_abort_before_wait_is_remembered() {
        let handle = TransferHandle::new();
        handle.abort();
        tokio::time::timeout(std::time::Duration::from_secs(1), handle.cancelled())
            .await
            .expect("stored abort should resolve immediately");
    }

    #[tokio::test]
    async fn test_invalid_signed_url_is_unsupported() {
        let transport = Transport::new(Arc::new(session(UploaderOptions::new()))).unwrap();
        let err = transport
            .put(
                &UploadFile::new("a.txt", "x"),
                &SignResult::new("not a url"),
                &TransferHandle::new(),
                |_, _| {},
            )
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::UnsupportedTransport));
    }
}
