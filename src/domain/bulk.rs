//! Bulk write semantics and per-item results of the backend bulk API.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Write semantics for each document of a bulk request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkAction {
    /// Fails when a document with the same id already exists.
    #[default]
    Create,
    /// Inserts or replaces unconditionally.
    Index,
}

impl BulkAction {
    /// Operation name used in NDJSON action lines.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            BulkAction::Create => "create",
            BulkAction::Index => "index",
        }
    }
}

impl fmt::Display for BulkAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("bulk action must be one of [create, index], got '{0}'")]
pub struct ParseBulkActionError(pub String);

impl FromStr for BulkAction {
    type Err = ParseBulkActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "create" => Ok(BulkAction::Create),
            "index" => Ok(BulkAction::Index),
            _ => Err(ParseBulkActionError(s.to_string())),
        }
    }
}

/// Error object attached to a rejected bulk item.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BulkItemError {
    pub kind: String,
    pub reason: String,
}

/// Acknowledgement for one document of a bulk request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkItemResult {
    /// Document id echoed by the backend, when present.
    pub id: Option<String>,
    pub status: u16,
    pub error: Option<BulkItemError>,
}

impl BulkItemResult {
    pub fn accepted(id: impl Into<String>, status: u16) -> Self {
        Self {
            id: Some(id.into()),
            status,
            error: None,
        }
    }

    pub fn rejected(
        id: impl Into<String>,
        status: u16,
        kind: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: Some(id.into()),
            status,
            error: Some(BulkItemError {
                kind: kind.into(),
                reason: reason.into(),
            }),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none() && (200..300).contains(&self.status)
    }
}

/// Parsed response of one bulk request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BulkResponse {
    pub items: Vec<BulkItemResult>,
}
