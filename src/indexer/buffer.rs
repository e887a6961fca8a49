use bytes::Bytes;
use serde_json::json;

use crate::domain::{BulkAction, SpanDocument};

/// NDJSON body being assembled for the next bulk request.
#[derive(Debug, Default)]
pub(crate) struct BulkBuffer {
    body: Vec<u8>,
    ids: Vec<String>,
}

/// A bulk request body together with the ids it carries, in body order.
#[derive(Debug)]
pub(crate) struct Chunk {
    pub seq: u64,
    pub body: Bytes,
    pub ids: Vec<String>,
}

impl BulkBuffer {
    /// Append the action line and the document line.
    pub fn push(&mut self, action: BulkAction, index: &str, document: SpanDocument) {
        let action_line = json!({ action.as_str(): { "_index": index, "_id": document.id } });
        self.body.extend_from_slice(action_line.to_string().as_bytes());
        self.body.push(b'\n');
        self.body.extend_from_slice(&document.body);
        self.body.push(b'\n');
        self.ids.push(document.id);
    }

    pub fn documents(&self) -> usize {
        self.ids.len()
    }

    pub fn bytes(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Move the buffered content out, leaving the buffer empty.
    pub fn take(&mut self, seq: u64) -> Chunk {
        Chunk {
            seq,
            body: Bytes::from(std::mem::take(&mut self.body)),
            ids: std::mem::take(&mut self.ids),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn document(id: &str) -> SpanDocument {
        SpanDocument {
            index: "traces".to_string(),
            id: id.to_string(),
            body: br#"{"name":"span"}"#.to_vec(),
        }
    }

    #[test]
    fn test_push_writes_action_and_document_lines() {
        let mut buffer = BulkBuffer::default();
        buffer.push(BulkAction::Create, "traces", document("t-1"));
        buffer.push(BulkAction::Create, "traces", document("t-2"));

        assert_eq!(buffer.documents(), 2);
        let chunk = buffer.take(7);
        assert_eq!(chunk.seq, 7);
        assert_eq!(chunk.ids, vec!["t-1", "t-2"]);

        let text = std::str::from_utf8(&chunk.body).unwrap();
        assert!(text.ends_with('\n'));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);

        let action: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(action["create"]["_index"], "traces");
        assert_eq!(action["create"]["_id"], "t-1");
        assert_eq!(lines[1], r#"{"name":"span"}"#);
    }

    #[test]
    fn test_index_action_line() {
        let mut buffer = BulkBuffer::default();
        buffer.push(BulkAction::Index, "traces", document("t-1"));
        let chunk = buffer.take(0);

        let first = chunk.body.split(|b| *b == b'\n').next().unwrap();
        let action: Value = serde_json::from_slice(first).unwrap();
        assert_eq!(action["index"]["_id"], "t-1");
    }

    #[test]
    fn test_take_empties_buffer() {
        let mut buffer = BulkBuffer::default();
        buffer.push(BulkAction::Create, "traces", document("t-1"));
        assert!(buffer.bytes() > 0);

        let _ = buffer.take(0);
        assert!(buffer.is_empty());
        assert_eq!(buffer.bytes(), 0);
    }
}
