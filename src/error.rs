//! Error handling and custom error types
//!
//! Every failure path in the crate ends in one of these types. Remote
//! failures are classified as data (`CallFailure::retryable`) so the retry
//! loop in [`crate::generator`] branches on a flag rather than on a type.

use crate::models::RequestState;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Startup configuration failures. Fatal: the process cannot proceed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set in environment variables")]
    MissingVar(&'static str),

    #[error("invalid value {value:?} for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Caller-input failures. Recoverable: the caller may re-prompt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("prompt must not be empty")]
    Empty,

    #[error("prompt is too long ({len} characters, maximum {max})")]
    TooLong { len: usize, max: usize },
}

/// Coarse reason for a single failed call to the remote endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Timeout,
    RateLimited,
    Server,
    Network,
    Unauthorized,
    InvalidRequest,
    Prediction,
    Canceled,
    MalformedResponse,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Timeout => "timeout",
            Self::RateLimited => "rate limited",
            Self::Server => "server error",
            Self::Network => "network error",
            Self::Unauthorized => "invalid API token",
            Self::InvalidRequest => "invalid request",
            Self::Prediction => "model error",
            Self::Canceled => "prediction canceled",
            Self::MalformedResponse => "malformed response",
        };
        f.write_str(s)
    }
}

/// Outcome of one failed attempt against the remote endpoint.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct CallFailure {
    pub kind: FailureKind,
    pub message: String,
    /// Whether another attempt may succeed.
    pub retryable: bool,
    /// Server-provided hint, e.g. from a `Retry-After` header.
    pub retry_after: Option<Duration>,
}

impl CallFailure {
    pub fn transient(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable: true,
            retry_after: None,
        }
    }

    pub fn permanent(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable: false,
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }

    /// Classify a non-success HTTP status returned by the remote endpoint.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let message = format!("status {}: {}", status.as_u16(), body.trim());
        match status.as_u16() {
            408 => Self::transient(FailureKind::Timeout, message),
            429 => Self::transient(FailureKind::RateLimited, message),
            401 | 403 => Self::permanent(FailureKind::Unauthorized, message),
            500..=599 => Self::transient(FailureKind::Server, message),
            _ => Self::permanent(FailureKind::InvalidRequest, message),
        }
    }
}

impl From<reqwest::Error> for CallFailure {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::transient(FailureKind::Timeout, e.to_string())
        } else if let Some(status) = e.status() {
            Self::from_status(status, &e.to_string())
        } else if e.is_decode() {
            Self::permanent(FailureKind::MalformedResponse, e.to_string())
        } else {
            Self::transient(FailureKind::Network, e.to_string())
        }
    }
}

/// Terminal remote failure for one request, with every attempt's failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("image generation failed after {attempts} attempt(s): {}", last_message(.history))]
pub struct ApiError {
    pub attempts: u32,
    pub history: Vec<CallFailure>,
}

fn last_message(history: &[CallFailure]) -> String {
    history
        .last()
        .map(ToString::to_string)
        .unwrap_or_else(|| "no attempt recorded".to_string())
}

impl ApiError {
    /// The failure that ended the request.
    pub fn last(&self) -> Option<&CallFailure> {
        self.history.last()
    }

    /// True when the retry budget ran out, false for a permanent rejection.
    pub fn is_exhausted(&self) -> bool {
        self.last().is_some_and(|f| f.retryable)
    }

    pub fn terminal_state(&self) -> RequestState {
        if self.is_exhausted() {
            RequestState::RetriesExhausted
        } else {
            RequestState::PermanentFailure
        }
    }
}

/// Local persistence failures. Never retried: the remote work already happened.
#[derive(Error, Debug)]
pub enum ImageSaveError {
    #[error("data is not a valid image: {0}")]
    InvalidImage(#[from] image::ImageError),

    #[error("failed to create output directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(
        "insufficient disk space in {}: {available} bytes available, {required} required",
        .path.display()
    )]
    InsufficientSpace {
        path: PathBuf,
        available: u64,
        required: u64,
    },

    #[error("failed to save image to {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid prompt: {0}")]
    Validation(#[from] ValidationError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Image save error: {0}")]
    ImageSave(#[from] ImageSaveError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invariant violation: {0}")]
    Invariant(String),
}

impl Error {
    /// Terminal request state this error corresponds to, if it ended a request.
    pub fn terminal_state(&self) -> Option<RequestState> {
        match self {
            Self::Api(e) => Some(e.terminal_state()),
            Self::ImageSave(_) => Some(RequestState::SaveFailed),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
