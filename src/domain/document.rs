use serde::{Deserialize, Serialize};

/// How timestamps are rendered in span documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimestampFormat {
    /// RFC 3339, UTC, nanosecond precision.
    #[default]
    Rfc3339,
    /// Milliseconds since the Unix epoch as a JSON integer.
    UnixMillis,
}

impl TimestampFormat {
    #[must_use]
    pub fn from_unix_flag(unix_timestamp: bool) -> Self {
        if unix_timestamp {
            TimestampFormat::UnixMillis
        } else {
            TimestampFormat::Rfc3339
        }
    }
}

/// One span serialized for the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanDocument {
    /// Target index.
    pub index: String,
    /// Deterministic document id derived from trace id and span id.
    pub id: String,
    /// Serialized JSON body, without a trailing newline.
    pub body: Vec<u8>,
}
