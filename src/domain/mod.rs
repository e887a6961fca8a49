mod bulk;
mod document;

pub use bulk::{BulkAction, BulkItemError, BulkItemResult, BulkResponse, ParseBulkActionError};
pub use document::{SpanDocument, TimestampFormat};
