use super::EncodeError;

const TRACE_ID_LEN: usize = 16;
const SPAN_ID_LEN: usize = 8;

/// Encode a trace id as 32 lowercase hex chars, rejecting malformed ids.
pub fn trace_id_hex(bytes: &[u8]) -> Result<String, EncodeError> {
    if bytes.len() != TRACE_ID_LEN {
        return Err(EncodeError::InvalidTraceId(format!(
            "expected {TRACE_ID_LEN} bytes, got {}",
            bytes.len()
        )));
    }
    if bytes.iter().all(|&b| b == 0) {
        return Err(EncodeError::InvalidTraceId("all bytes are zero".to_string()));
    }
    Ok(hex::encode(bytes))
}

/// Encode a span id as 16 lowercase hex chars, rejecting malformed ids.
pub fn span_id_hex(bytes: &[u8]) -> Result<String, EncodeError> {
    if bytes.len() != SPAN_ID_LEN {
        return Err(EncodeError::InvalidSpanId(format!(
            "expected {SPAN_ID_LEN} bytes, got {}",
            bytes.len()
        )));
    }
    if bytes.iter().all(|&b| b == 0) {
        return Err(EncodeError::InvalidSpanId("all bytes are zero".to_string()));
    }
    Ok(hex::encode(bytes))
}

/// Parent span id: empty for root spans, otherwise a regular span id.
pub fn parent_span_id_hex(bytes: &[u8]) -> Result<String, EncodeError> {
    if bytes.is_empty() || bytes.iter().all(|&b| b == 0) {
        return Ok(String::new());
    }
    span_id_hex(bytes).map_err(|e| match e {
        EncodeError::InvalidSpanId(reason) => EncodeError::InvalidParentSpanId(reason),
        other => other,
    })
}

/// Document id for a span. Stable for the same (trace id, span id) pair.
#[must_use]
pub fn document_id(trace_id: &str, span_id: &str) -> String {
    format!("{trace_id}-{span_id}")
}
