//! Error types for the request engine.

use std::fmt;

use crate::wire::ConvertError;

/// Request engine errors.
///
/// Transport-level failures are classified at the point of occurrence;
/// redirect continuation is never surfaced as an error. The enum is
/// `Clone` because one error instance fans out to every subscriber of a
/// coalesced request.
#[derive(Debug, Clone)]
pub enum RequestError {
    /// The request was cancelled.
    Cancelled,
    /// Generic request failure (unclassified I/O or transport error).
    Failed(String),
    /// The request timed out.
    TimedOut,
    /// The retry budget was exhausted; wraps the final attempt's error.
    MaxRetriesReached(Box<RequestError>),
    /// Non-success HTTP status with throw-on-failure set.
    Unsuccessful {
        /// The HTTP status code.
        status: i32,
        /// The reason phrase, if any.
        reason: String,
    },
    /// The response body could not be parsed as a wire document, or
    /// required content was missing.
    Unparseable(String),
    /// I/O failure reading or writing body bytes.
    Io(String),
    /// The redirect chain exceeded the configured maximum.
    TooManyRedirects {
        /// The configured maximum.
        max: u32,
    },
    /// A response validator returned false.
    ValidatorRejected {
        /// The validator's identifier.
        id: String,
    },
    /// A response validator failed with an error.
    ValidatorErrored {
        /// The validator's identifier.
        id: String,
        /// The wrapped cause.
        message: String,
    },
    /// Schema/document mismatch during marshalling or unmarshalling.
    /// A configuration error, not a retryable one.
    Conversion(ConvertError),
    /// Invalid URL provided.
    InvalidUrl(String),
    /// Invalid header name or value.
    InvalidHeader(String),
}

impl RequestError {
    /// Whether this error is a cancellation, which is never retried and
    /// never redirect-chased further.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Whether this error is the timeout classification.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut)
    }
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => write!(f, "request was cancelled"),
            Self::Failed(msg) => write!(f, "request failed: {msg}"),
            Self::TimedOut => write!(f, "request timed out"),
            Self::MaxRetriesReached(cause) => {
                write!(f, "max retries reached: {cause}")
            }
            Self::Unsuccessful { status, reason } => {
                if reason.is_empty() {
                    write!(f, "unsuccessful response: HTTP {status}")
                } else {
                    write!(f, "unsuccessful response: HTTP {status} {reason}")
                }
            }
            Self::Unparseable(msg) => write!(f, "unparseable response: {msg}"),
            Self::Io(msg) => write!(f, "I/O error: {msg}"),
            Self::TooManyRedirects { max } => {
                write!(f, "redirect chain exceeded maximum of {max}")
            }
            Self::ValidatorRejected { id } => {
                write!(f, "validator {id:?} rejected the response")
            }
            Self::ValidatorErrored { id, message } => {
                write!(f, "validator {id:?} errored: {message}")
            }
            Self::Conversion(err) => write!(f, "{err}"),
            Self::InvalidUrl(msg) => write!(f, "invalid URL: {msg}"),
            Self::InvalidHeader(msg) => write!(f, "invalid header: {msg}"),
        }
    }
}

impl std::error::Error for RequestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::MaxRetriesReached(cause) => Some(cause),
            Self::Conversion(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for RequestError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::TimedOut
        } else if err.is_connect() {
            Self::Failed(format!("connection failed: {err}"))
        } else {
            Self::Failed(err.to_string())
        }
    }
}

impl From<url::ParseError> for RequestError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}

impl From<serde_json::Error> for RequestError {
    fn from(err: serde_json::Error) -> Self {
        Self::Unparseable(err.to_string())
    }
}

impl From<std::io::Error> for RequestError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<ConvertError> for RequestError {
    fn from(err: ConvertError) -> Self {
        Self::Conversion(err)
    }
}

/// A specialized Result type for request operations.
pub type Result<T> = std::result::Result<T, RequestError>;
