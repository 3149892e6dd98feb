//! Authorization phase
//!
//! Obtains a [`SignResult`] for a file, either from a caller-supplied
//! [`SignedUrlProvider`] or from the configured signing endpoint.
//!
//! # Signing request
//!
//! ```text
//! GET {server}{signing_url}?objectName=<sanitized name>&contentType=<mime>[&path=<s3path>][&k=v...]
//! ```
//!
//! The endpoint answers with JSON containing at least `signedUrl`. Any other
//! fields are passed through untouched.

use super::{ErrorContext, UploadError, UploadFile};
use crate::config::{StringMap, UploadSession};
use crate::metrics;
use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::sync::Arc;

/// Characters left unescaped by `encodeURIComponent`
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Percent-encode a query component
pub(crate) fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, URI_COMPONENT).to_string()
}

/// Authorization returned by the signing endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignResult {
    /// Time-limited URL authorizing a single PUT
    #[serde(rename = "signedUrl")]
    pub signed_url: String,

    /// Extra headers to send with the upload request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<serde_json::Map<String, serde_json::Value>>,

    /// Remaining fields, passed through opaquely
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl SignResult {
    pub fn new(signed_url: impl Into<String>) -> Self {
        Self {
            signed_url: signed_url.into(),
            headers: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Add an upload header
    pub fn with_header(
        mut self,
        name: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.headers
            .get_or_insert_with(serde_json::Map::new)
            .insert(name.into(), value.into());
        self
    }

    /// Upload headers as strings. Non-string values use their JSON text,
    /// `null` values are dropped.
    pub fn header_values(&self) -> StringMap {
        self.headers
            .iter()
            .flatten()
            .filter_map(|(name, value)| {
                let value = match value {
                    serde_json::Value::Null => return None,
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                Some((name.clone(), value))
            })
            .collect()
    }

    /// The `publicUrl` field, when the endpoint supplied one
    pub fn public_url(&self) -> Option<&str> {
        self.extra.get("publicUrl").and_then(|v| v.as_str())
    }
}

/// Source of upload authorizations.
///
/// Replaces the signing endpoint entirely when configured. The engine waits
/// for the returned future without a timeout.
#[async_trait]
pub trait SignedUrlProvider: Send + Sync {
    async fn get_signed_url(&self, file: &UploadFile) -> Result<SignResult, UploadError>;
}

/// Default provider: calls the configured signing endpoint over HTTP
pub struct SigningEndpoint {
    session: Arc<UploadSession>,
    client: reqwest::Client,
}

impl SigningEndpoint {
    /// Create a signing client for the session.
    ///
    /// With `signing_url_with_credentials` set, cookies issued by the signing
    /// server are kept and replayed on later signing requests.
    pub fn new(session: Arc<UploadSession>) -> Result<Self, UploadError> {
        let client = reqwest::Client::builder()
            .cookie_store(session.signing_url_with_credentials)
            .build()
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to build signing HTTP client");
                UploadError::UnsupportedTransport
            })?;

        Ok(Self { session, client })
    }

    /// Query string for a file, including the leading `?`
    pub fn query_string(&self, file: &UploadFile) -> String {
        let mut query = format!(
            "?objectName={}&contentType={}",
            file.sanitized_name(),
            encode_component(&file.mime_type())
        );

        if let Some(path) = self.session.s3path.as_deref().filter(|p| !p.is_empty()) {
            query.push_str("&path=");
            query.push_str(&encode_component(path));
        }

        if let Some(params) = &self.session.signing_url_query_params {
            for (key, value) in params.resolve() {
                let _ = write!(query, "&{}={}", key, value);
            }
        }

        query
    }

    /// Full signing URL for a file
    pub fn url_for(&self, file: &UploadFile) -> String {
        format!(
            "{}{}{}",
            self.session.server,
            self.session.signing_url,
            self.query_string(file)
        )
    }

    /// Ask the signing endpoint to authorize an upload of `file`
    #[tracing::instrument(
        name = "upload.sign",
        skip(self, file),
        fields(
            upload.file = %file.name,
            http.method = %self.session.signing_url_method,
            http.status_code = tracing::field::Empty
        ),
        err(Display)
    )]
    pub async fn request_signature(&self, file: &UploadFile) -> Result<SignResult, UploadError> {
        let url = reqwest::Url::parse(&self.url_for(file))
            .ok()
            .filter(|u| matches!(u.scheme(), "http" | "https"))
            .ok_or(UploadError::UnsupportedTransport)?;
        let method = Method::from_bytes(self.session.signing_url_method.to_uppercase().as_bytes())
            .map_err(|_| UploadError::UnsupportedTransport)?;

        let mut request = self.client.request(method, url);
        if let Some(headers) = &self.session.signing_url_headers {
            for (name, value) in headers.resolve() {
                request = request.header(name, value);
            }
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "Signing request failed before a response");
                metrics::record_sign_request("failure");
                return Err(UploadError::SigningStatus {
                    context: ErrorContext::network_failure(),
                });
            }
        };

        let status = response.status();
        tracing::Span::current().record("http.status_code", status.as_u16());
        let body = response.text().await.unwrap_or_default();
        let context = ErrorContext::completed(status, body);

        if !self.session.is_success(status.as_u16()) {
            metrics::record_sign_request("failure");
            return Err(UploadError::SigningStatus { context });
        }

        match serde_json::from_str::<SignResult>(&context.response) {
            Ok(result) => {
                metrics::record_sign_request("success");
                Ok(result)
            }
            Err(e) => {
                tracing::debug!(error = %e, "Signing response is not a valid sign result");
                metrics::record_sign_request("invalid");
                Err(UploadError::InvalidSignResponse { context })
            }
        }
    }
}

#[async_trait]
impl SignedUrlProvider for SigningEndpoint {
    async fn get_signed_url(&self, file: &UploadFile) -> Result<SignResult, UploadError> {
        self.request_signature(file).await
    }
}
