//! Error types for the iNaturalist client

use std::fmt;
use std::time::Duration;

/// What went wrong at the transport boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFailure {
    /// The request did not complete within the configured timeout
    Timeout,
    /// The connection could not be established or was dropped
    Connection,
    /// The response body was not the JSON document we expected
    MalformedBody,
    /// The server answered with a status we do not map to a specific error
    UnexpectedStatus(u16),
}

impl fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timed out"),
            Self::Connection => write!(f, "connection failed"),
            Self::MalformedBody => write!(f, "malformed response body"),
            Self::UnexpectedStatus(status) => write!(f, "unexpected status {}", status),
        }
    }
}

/// Errors that can occur when calling the iNaturalist API
#[derive(Debug)]
pub enum InatError {
    /// A request parameter was missing or malformed; raised before any request is sent
    Validation(String),
    /// No usable credential for an endpoint that requires one, or a 401/403 from the server
    Authentication {
        endpoint: String,
        status: Option<u16>,
    },
    /// The requested resource (observation, taxon, ...) does not exist.
    /// `status` is `None` when a successful response simply had no records.
    NotFound {
        endpoint: String,
        status: Option<u16>,
    },
    /// The server kept answering 429 after all retries were used up
    RateLimitExceeded { endpoint: String, attempts: u32 },
    /// Waiting for local rate limiter capacity would exceed the configured maximum delay
    AdmissionDelay { required: Duration, max: Duration },
    /// Timeout, connection failure, unexpected status or unparseable body
    Transport {
        endpoint: String,
        failure: TransportFailure,
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl InatError {
    pub(crate) fn transport(
        endpoint: impl Into<String>,
        failure: TransportFailure,
        message: impl Into<String>,
    ) -> Self {
        Self::Transport {
            endpoint: endpoint.into(),
            failure,
            message: message.into(),
            source: None,
        }
    }

    /// Attach the underlying error to a transport error; other variants are returned unchanged
    pub(crate) fn with_source(
        mut self,
        err: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        if let Self::Transport { source, .. } = &mut self {
            *source = Some(Box::new(err));
        }
        self
    }

    /// Map a reqwest error into a transport error for the given endpoint
    pub(crate) fn from_reqwest(endpoint: &str, err: reqwest::Error) -> Self {
        let failure = if err.is_timeout() {
            TransportFailure::Timeout
        } else if err.is_decode() {
            TransportFailure::MalformedBody
        } else {
            TransportFailure::Connection
        };
        Self::transport(endpoint, failure, err.to_string()).with_source(err)
    }

    /// A response body that could not be parsed as JSON
    pub(crate) fn malformed_body(endpoint: &str, err: serde_json::Error) -> Self {
        Self::transport(endpoint, TransportFailure::MalformedBody, err.to_string()).with_source(err)
    }

    /// Whether the error was detected locally, before anything was sent
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::AdmissionDelay { .. })
            || matches!(self, Self::Authentication { status: None, .. })
    }
}

impl fmt::Display for InatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(msg) => write!(f, "Invalid request: {}", msg),
            Self::Authentication {
                endpoint,
                status: Some(status),
            } => write!(f, "Authentication failed for {} (status {})", endpoint, status),
            Self::Authentication {
                endpoint,
                status: None,
            } => write!(f, "Access token required for {}", endpoint),
            Self::NotFound {
                endpoint,
                status: Some(status),
            } => write!(f, "Not found: {} (status {})", endpoint, status),
            Self::NotFound {
                endpoint,
                status: None,
            } => write!(f, "Not found: {} (no records returned)", endpoint),
            Self::RateLimitExceeded { endpoint, attempts } => write!(
                f,
                "Rate limit exceeded for {} (status 429) after {} attempts",
                endpoint, attempts
            ),
            Self::AdmissionDelay { required, max } => write!(
                f,
                "Rate limiter delay of {:?} exceeds maximum of {:?}",
                required, max
            ),
            Self::Transport {
                endpoint,
                failure,
                message,
                ..
            } => write!(f, "Transport error for {} ({}): {}", endpoint, failure, message),
        }
    }
}

impl std::error::Error for InatError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport {
                source: Some(source),
                ..
            } => Some(&**source),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for InatError {
    fn from(e: reqwest::Error) -> Self {
        let endpoint = e.url().map(|url| url.to_string()).unwrap_or_default();
        Self::from_reqwest(&endpoint, e)
    }
}

impl From<serde_json::Error> for InatError {
    fn from(e: serde_json::Error) -> Self {
        Self::malformed_body("", e)
    }
}

/// Result type for iNaturalist API operations
pub type Result<T> = std::result::Result<T, InatError>;
