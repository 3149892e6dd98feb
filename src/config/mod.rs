//! Configuration module for Direct Uploadr
//!
//! Caller-supplied [`UploaderOptions`] are resolved into an immutable
//! [`UploadSession`]. Every unset option falls back to a documented default;
//! every supplied option replaces its default as-is.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

/// Default signing endpoint path
pub const DEFAULT_SIGNING_URL: &str = "/sign-s3";

/// Default signing request method
pub const DEFAULT_SIGNING_METHOD: &str = "GET";

/// Status codes accepted as success when none are configured
pub const DEFAULT_SUCCESS_RESPONSES: [u16; 2] = [200, 201];

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand environment variables in a string.
///
/// Supports two syntaxes:
/// - `${VAR_NAME}` - Simple expansion, keeps placeholder if var not found
/// - `${VAR_NAME:-default}` - Expansion with default value
///
/// # Examples
///
/// ```ignore
/// std::env::set_var("MY_VAR", "value");
/// let result = expand_env_vars("prefix-${MY_VAR}-suffix");
/// assert_eq!(result, "prefix-value-suffix");
///
/// let result = expand_env_vars("${MISSING:-default}");
/// assert_eq!(result, "default");
/// ```
pub(crate) fn expand_env_vars(s: &str) -> String {
    let re = match regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}") {
        Ok(re) => re,
        Err(_) => return s.to_string(),
    };
    let mut last_match = 0;
    let mut result = String::with_capacity(s.len());

    for cap in re.captures_iter(s) {
        let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
            continue;
        };

        result.push_str(&s[last_match..full_match.start()]);

        let value = match std::env::var(var_name.as_str()) {
            Ok(val) => val,
            Err(_) => match cap.get(2) {
                Some(default) => default.as_str().to_string(),
                // No env var and no default. Keep the original placeholder.
                None => full_match.as_str().to_string(),
            },
        };
        result.push_str(&value);

        last_match = full_match.end();
    }

    result.push_str(&s[last_match..]);

    result
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
}

// ============================================================================
// Option Values
// ============================================================================

/// String-to-string mapping used for headers and query parameters
pub type StringMap = BTreeMap<String, String>;

/// A mapping given either literally or as a zero-argument producer.
///
/// Producers are invoked once per use, so each request sees a fresh mapping.
#[derive(Clone)]
pub enum MapSource {
    Static(StringMap),
    Computed(Arc<dyn Fn() -> StringMap + Send + Sync>),
}

impl MapSource {
    /// Build a computed source from a closure
    pub fn computed<F>(producer: F) -> Self
    where
        F: Fn() -> StringMap + Send + Sync + 'static,
    {
        Self::Computed(Arc::new(producer))
    }

    /// Resolve to a concrete mapping
    pub fn resolve(&self) -> StringMap {
        match self {
            Self::Static(map) => map.clone(),
            Self::Computed(producer) => producer(),
        }
    }
}

impl fmt::Debug for MapSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(map) => f.debug_tuple("Static").field(map).finish(),
            Self::Computed(_) => f.write_str("Computed(<fn>)"),
        }
    }
}

impl From<StringMap> for MapSource {
    fn from(map: StringMap) -> Self {
        Self::Static(map)
    }
}

impl<'de> Deserialize<'de> for MapSource {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        StringMap::deserialize(deserializer).map(Self::Static)
    }
}

/// Content-Disposition policy for the upload request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ContentDisposition {
    /// `inline` for images, `attachment` for everything else
    Auto,
    /// Used verbatim as the disposition type
    Literal(String),
}

impl ContentDisposition {
    /// Disposition type for a file of the given MIME type
    pub fn disposition_for(&self, mime_type: &str) -> &str {
        match self {
            Self::Auto if mime_type.starts_with("image/") => "inline",
            Self::Auto => "attachment",
            Self::Literal(value) => value,
        }
    }
}

impl From<String> for ContentDisposition {
    fn from(value: String) -> Self {
        if value == "auto" {
            Self::Auto
        } else {
            Self::Literal(value)
        }
    }
}

impl From<&str> for ContentDisposition {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<ContentDisposition> for String {
    fn from(value: ContentDisposition) -> Self {
        match value {
            ContentDisposition::Auto => "auto".to_string(),
            ContentDisposition::Literal(value) => value,
        }
    }
}

// ============================================================================
// Caller Options
// ============================================================================

/// Partial uploader configuration as supplied by the caller.
///
/// Field names are snake_case; the camelCase spellings are accepted as
/// aliases so option files written for browser uploaders load unchanged.
///
/// # Example
///
/// ```yaml
/// server: "https://app.example.com"
/// signing_url: "/uploads/sign"
/// s3path: "avatars/"
/// content_disposition: "auto"
/// signing_url_headers:
///   authorization: "Bearer ${API_TOKEN}"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UploaderOptions {
    #[serde(default)]
    pub test: Option<bool>,

    #[serde(default)]
    pub server: Option<String>,

    #[serde(default, alias = "signingUrl")]
    pub signing_url: Option<String>,

    #[serde(default, alias = "signingUrlMethod")]
    pub signing_url_method: Option<String>,

    #[serde(default, alias = "successResponses")]
    pub success_responses: Option<Vec<u16>>,

    #[serde(default, alias = "s3_path")]
    pub s3path: Option<String>,

    #[serde(default, alias = "signingUrlQueryParams")]
    pub signing_url_query_params: Option<MapSource>,

    #[serde(default, alias = "signingUrlHeaders")]
    pub signing_url_headers: Option<MapSource>,

    #[serde(default, alias = "signingUrlWithCredentials")]
    pub signing_url_with_credentials: Option<bool>,

    #[serde(default, alias = "uploadRequestHeaders")]
    pub upload_request_headers: Option<MapSource>,

    #[serde(default, alias = "contentDisposition")]
    pub content_disposition: Option<ContentDisposition>,

    /// Passed through to the file-selection source
    #[serde(default)]
    pub accept: Option<String>,

    /// Unrecognized options, stored verbatim
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl UploaderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn server(mut self, server: impl Into<String>) -> Self {
        self.server = Some(server.into());
        self
    }

    pub fn signing_url(mut self, path: impl Into<String>) -> Self {
        self.signing_url = Some(path.into());
        self
    }

    pub fn signing_url_method(mut self, method: impl Into<String>) -> Self {
        self.signing_url_method = Some(method.into());
        self
    }

    pub fn success_responses(mut self, codes: impl Into<Vec<u16>>) -> Self {
        self.success_responses = Some(codes.into());
        self
    }

    pub fn s3path(mut self, prefix: impl Into<String>) -> Self {
        self.s3path = Some(prefix.into());
        self
    }

    pub fn signing_url_query_params(mut self, params: impl Into<MapSource>) -> Self {
        self.signing_url_query_params = Some(params.into());
        self
    }

    pub fn signing_url_headers(mut self, headers: impl Into<MapSource>) -> Self {
        self.signing_url_headers = Some(headers.into());
        self
    }

    pub fn signing_url_with_credentials(mut self, enabled: bool) -> Self {
        self.signing_url_with_credentials = Some(enabled);
        self
    }

    pub fn upload_request_headers(mut self, headers: impl Into<MapSource>) -> Self {
        self.upload_request_headers = Some(headers.into());
        self
    }

    pub fn content_disposition(mut self, policy: impl Into<ContentDisposition>) -> Self {
        self.content_disposition = Some(policy.into());
        self
    }

    pub fn accept(mut self, accept: impl Into<String>) -> Self {
        self.accept = Some(accept.into());
        self
    }

    pub fn test(mut self, enabled: bool) -> Self {
        self.test = Some(enabled);
        self
    }

    /// Load options from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Overlay every option set in `other` onto `self`
    pub fn merge(mut self, other: UploaderOptions) -> Self {
        macro_rules! overlay {
            ($($field:ident),*) => {
                $(if other.$field.is_some() {
                    self.$field = other.$field;
                })*
            };
        }
        overlay!(
            test,
            server,
            signing_url,
            signing_url_method,
            success_responses,
            s3path,
            signing_url_query_params,
            signing_url_headers,
            signing_url_with_credentials,
            upload_request_headers,
            content_disposition,
            accept
        );
        self.extra.extend(other.extra);
        self
    }
}

// ============================================================================
// Resolved Session
// ============================================================================

/// Complete, read-only configuration for one uploader instance
#[derive(Debug, Clone)]
pub struct UploadSession {
    pub test: bool,
    pub server: String,
    pub signing_url: String,
    pub signing_url_method: String,
    pub success_responses: Vec<u16>,
    pub s3path: Option<String>,
    pub signing_url_query_params: Option<MapSource>,
    pub signing_url_headers: Option<MapSource>,
    pub signing_url_with_credentials: bool,
    pub upload_request_headers: Option<MapSource>,
    pub content_disposition: Option<ContentDisposition>,
    pub accept: Option<String>,
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl UploadSession {
    /// Fill every unset option with its default
    pub fn resolve(options: UploaderOptions) -> Self {
        Self {
            test: options.test.unwrap_or(false),
            server: options.server.unwrap_or_default(),
            signing_url: options
                .signing_url
                .unwrap_or_else(|| DEFAULT_SIGNING_URL.to_string()),
            signing_url_method: options
                .signing_url_method
                .unwrap_or_else(|| DEFAULT_SIGNING_METHOD.to_string()),
            success_responses: options
                .success_responses
                .unwrap_or_else(|| DEFAULT_SUCCESS_RESPONSES.to_vec()),
            s3path: options.s3path,
            signing_url_query_params: options.signing_url_query_params,
            signing_url_headers: options.signing_url_headers,
            signing_url_with_credentials: options.signing_url_with_credentials.unwrap_or(false),
            upload_request_headers: options.upload_request_headers,
            content_disposition: options.content_disposition.filter(|policy| {
                !matches!(policy, ContentDisposition::Literal(value) if value.is_empty())
            }),
            accept: options.accept,
            extra: options.extra,
        }
    }

    /// Whether a status code counts as success
    pub fn is_success(&self, status: u16) -> bool {
        self.success_responses.contains(&status)
    }
}

impl Default for UploadSession {
    fn default() -> Self {
        Self::resolve(UploaderOptions::default())
    }
}
