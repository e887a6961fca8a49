//! Parsing of `_bulk` API responses.

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

use crate::domain::{BulkItemError, BulkItemResult, BulkResponse};
use crate::error::ClientError;

#[derive(Deserialize)]
struct RawBulkResponse {
    #[serde(default)]
    items: Vec<HashMap<String, RawBulkItem>>,
}

#[derive(Deserialize)]
struct RawBulkItem {
    #[serde(rename = "_id")]
    id: Option<String>,
    #[serde(default)]
    status: u16,
    error: Option<Value>,
}

/// Parse a bulk response body into per-item results, preserving item order.
pub fn parse_bulk_response(body: &[u8]) -> Result<BulkResponse, ClientError> {
    let raw: RawBulkResponse = serde_json::from_slice(body)
        .map_err(|e| ClientError::InvalidResponse(format!("malformed bulk response: {e}")))?;

    let items = raw
        .items
        .into_iter()
        .map(|entry| match entry.into_values().next() {
            Some(item) => BulkItemResult {
                id: item.id,
                status: item.status,
                error: item.error.map(item_error),
            },
            None => BulkItemResult {
                id: None,
                status: 0,
                error: Some(BulkItemError {
                    kind: "malformed_item".to_string(),
                    reason: "bulk response item has no operation".to_string(),
                }),
            },
        })
        .collect();

    Ok(BulkResponse { items })
}

fn item_error(value: Value) -> BulkItemError {
    match value {
        Value::Object(map) => BulkItemError {
            kind: map
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
            reason: map
                .get("reason")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        },
        Value::String(reason) => BulkItemError {
            kind: "unknown".to_string(),
            reason,
        },
        other => BulkItemError {
            kind: "unknown".to_string(),
            reason: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mixed_response() {
        let body = br#"{
            "took": 30,
            "errors": true,
            "items": [
                {"create": {"_index": "ss4o_traces-default-namespace", "_id": "a-1", "status": 201}},
                {"create": {"_index": "ss4o_traces-default-namespace", "_id": "a-2", "status": 409,
                    "error": {"type": "version_conflict_engine_exception", "reason": "document already exists"}}}
            ]
        }"#;

        let response = parse_bulk_response(body).unwrap();
        assert_eq!(response.items.len(), 2);
        assert_eq!(response.items[0], BulkItemResult::accepted("a-1", 201));
        assert_eq!(
            response.items[1],
            BulkItemResult::rejected(
                "a-2",
                409,
                "version_conflict_engine_exception",
                "document already exists"
            )
        );
    }

    #[test]
    fn test_parse_index_operation() {
        let body = br#"{"errors": false, "items": [{"index": {"_id": "x", "status": 200}}]}"#;
        let response = parse_bulk_response(body).unwrap();
        assert!(response.items[0].is_success());
    }

    #[test]
    fn test_string_error_is_kept_as_reason() {
        let body = br#"{"items": [{"create": {"_id": "x", "status": 400, "error": "boom"}}]}"#;
        let response = parse_bulk_response(body).unwrap();
        let error = response.items[0].error.as_ref().unwrap();
        assert_eq!(error.kind, "unknown");
        assert_eq!(error.reason, "boom");
    }

    #[test]
    fn test_empty_item_keeps_its_position() {
        let body = br#"{"items": [{}, {"create": {"_id": "b", "status": 201}}]}"#;
        let response = parse_bulk_response(body).unwrap();
        assert_eq!(response.items.len(), 2);
        assert!(!response.items[0].is_success());
        assert_eq!(response.items[1].id.as_deref(), Some("b"));
    }

    #[test]
    fn test_unparsable_body_is_invalid_response() {
        let result = parse_bulk_response(b"<html>bad gateway</html>");
        assert!(matches!(result, Err(ClientError::InvalidResponse(_))));
    }
}
