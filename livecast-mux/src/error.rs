//! Mux client error types
//!
//! Pure client errors; livecast-core maps these onto its own taxonomy.

use thiserror::Error;

/// Maximum response body size for Mux HTTP calls (16 MB).
pub const MAX_RESPONSE_SIZE: usize = 16 * 1024 * 1024;

/// Upper bound on how much of an error payload is kept for diagnostics.
const MAX_ERROR_BODY: usize = 4 * 1024;

#[derive(Debug, Error)]
pub enum MuxError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP error {status} for {url}")]
    Http {
        status: reqwest::StatusCode,
        url: String,
        /// Raw platform error payload, truncated
        body: String,
    },

    #[error("Live stream not found: {0}")]
    NotFound(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Response too large ({size} bytes, max {max})", max = MAX_RESPONSE_SIZE)]
    ResponseTooLarge { size: u64 },
}

impl MuxError {
    /// HTTP status reported by the platform, if the failure got that far
    #[must_use]
    pub const fn status(&self) -> Option<reqwest::StatusCode> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::NotFound(_) => Some(reqwest::StatusCode::NOT_FOUND),
            _ => None,
        }
    }

    /// Raw error payload attached to an HTTP failure
    #[must_use]
    pub fn body(&self) -> Option<&str> {
        match self {
            Self::Http { body, .. } if !body.is_empty() => Some(body),
            _ => None,
        }
    }
}

/// Read a response body with size limit and deserialize as JSON.
pub async fn json_with_limit<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, MuxError> {
    if let Some(cl) = response.content_length() {
        if cl as usize > MAX_RESPONSE_SIZE {
            return Err(MuxError::ResponseTooLarge { size: cl });
        }
    }
    let bytes = response.bytes().await?;
    if bytes.len() > MAX_RESPONSE_SIZE {
        return Err(MuxError::ResponseTooLarge { size: bytes.len() as u64 });
    }
    serde_json::from_slice(&bytes).map_err(Into::into)
}

/// Check HTTP response status before processing body.
///
/// `resource` names the live stream being addressed so a 404 can be reported
/// as [`MuxError::NotFound`]; list calls pass `None`.
pub async fn check_response(
    resp: reqwest::Response,
    resource: Option<&str>,
) -> Result<reqwest::Response, MuxError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    if status == reqwest::StatusCode::NOT_FOUND {
        if let Some(id) = resource {
            return Err(MuxError::NotFound(id.to_string()));
        }
    }

    let url = resp.url().to_string();
    let body = match resp.bytes().await {
        Ok(bytes) => {
            let end = bytes.len().min(MAX_ERROR_BODY);
            String::from_utf8_lossy(&bytes[..end]).into_owned()
        }
        Err(_) => String::new(),
    };

    Err(MuxError::Http { status, url, body })
}

impl From<reqwest::Error> for MuxError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

impl From<serde_json::Error> for MuxError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

impl From<url::ParseError> for MuxError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidConfig(format!("invalid base URL: {err}"))
    }
}
