use crate::config::ConfigError;
use std::fmt;
use thiserror::Error;

/// A single failure recorded while indexing one batch.
///
/// Every variant accounts for one or more documents, so the sum of
/// [`IndexError::documents`] over a batch plus the accepted count equals the
/// number of spans in it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IndexError {
    #[error("span {trace_id}/{span_id} could not be encoded: {reason}")]
    Encoding {
        trace_id: String,
        span_id: String,
        reason: String,
    },

    #[error("document {id} rejected with status {status}: {kind}: {reason}")]
    DocumentRejected {
        id: String,
        status: u16,
        kind: String,
        reason: String,
    },

    #[error("bulk request for {documents} documents failed: {reason}")]
    Transport { documents: usize, reason: String },

    #[error("close deadline exceeded with {documents} documents undelivered")]
    Timeout { documents: usize },
}

impl IndexError {
    /// Number of documents this failure accounts for.
    #[must_use]
    pub fn documents(&self) -> usize {
        match self {
            Self::Encoding { .. } | Self::DocumentRejected { .. } => 1,
            Self::Transport { documents, .. } | Self::Timeout { documents } => *documents,
        }
    }
}

/// Every failure observed during one push, joined into a single error value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinedError {
    errors: Vec<IndexError>,
}

impl JoinedError {
    /// Returns `None` when there is nothing to report.
    #[must_use]
    pub fn from_errors(errors: Vec<IndexError>) -> Option<Self> {
        if errors.is_empty() {
            None
        } else {
            Some(Self { errors })
        }
    }

    pub fn errors(&self) -> &[IndexError] {
        &self.errors
    }

    /// Total number of documents that were not indexed.
    pub fn failed_documents(&self) -> usize {
        self.errors.iter().map(IndexError::documents).sum()
    }
}

/// Errors spelled out by `JoinedError`'s `Display`; the rest are counted.
const MAX_DISPLAYED_ERRORS: usize = 10;

impl fmt::Display for JoinedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} documents failed to index ({} errors)",
            self.failed_documents(),
            self.errors.len()
        )?;
        for error in self.errors.iter().take(MAX_DISPLAYED_ERRORS) {
            write!(f, "; {error}")?;
        }
        let hidden = self.errors.len().saturating_sub(MAX_DISPLAYED_ERRORS);
        if hidden > 0 {
            write!(f, "; and {hidden} more")?;
        }
        Ok(())
    }
}

impl std::error::Error for JoinedError {}

/// Error returned by a batch push.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("backend connection failed: {0}")]
    Connection(String),

    #[error("batch driver cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    #[error(transparent)]
    Indexing(#[from] JoinedError),
}

/// Failures of a single request against the backend.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Request timeout: {0}")]
    RequestTimeout(String),
    #[error("HTTP error: {status} - {message}")]
    HttpError { status: u16, message: String },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

impl ClientError {
    /// Whether repeating the same request may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ConnectionFailed(_) | Self::RequestTimeout(_) | Self::NetworkError(_) => true,
            Self::HttpError { status, .. } => *status == 429 || *status >= 500,
            Self::InvalidConfiguration(_) | Self::InvalidResponse(_) => false,
        }
    }
}

/// Process-level errors raised while wiring up the service.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Failed to load configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to start exporter: {0}")]
    Exporter(#[from] ExportError),

    #[error("Failed to bind to address {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Server(#[from] std::io::Error),
}
