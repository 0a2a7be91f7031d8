use livecast_mux::MuxError;
use thiserror::Error;

/// Message reported by every entry point when platform credentials are absent
pub const MISSING_CREDENTIALS: &str = "MUX credentials not configured";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Platform credentials are missing or unusable. No retry can fix this;
    /// it clears once the process is configured.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Stream not found: {0}")]
    NotFound(String),

    /// Platform or transport failure. Retried by the next natural poll cycle.
    #[error("Upstream error: {message}")]
    Upstream {
        message: String,
        status: Option<u16>,
        /// Raw platform error payload, when the platform sent one
        details: Option<String>,
    },

    /// Malformed request parameters, rejected before any network call
    #[error("Invalid input: {0}")]
    Validation(String),
}

impl Error {
    #[must_use]
    pub fn missing_credentials() -> Self {
        Self::Configuration(MISSING_CREDENTIALS.to_string())
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream {
            message: message.into(),
            status: None,
            details: None,
        }
    }

    /// Whether the next poll cycle may succeed where this one failed
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Upstream { .. })
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<MuxError> for Error {
    fn from(err: MuxError) -> Self {
        match err {
            MuxError::NotFound(id) => Self::NotFound(id),
            MuxError::InvalidConfig(msg) => Self::Configuration(msg),
            MuxError::Http { status, ref body, .. } => Self::Upstream {
                message: err.to_string(),
                status: Some(status.as_u16()),
                details: (!body.is_empty()).then(|| body.clone()),
            },
            other => Self::upstream(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
