//! Seams between the indexing core and its surroundings.
//!
//! Traits are dyn-compatible by using boxed futures, so production adapters
//! and test doubles can be swapped behind an `Arc<dyn ...>`.

use bytes::Bytes;
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use std::future::Future;
use std::pin::Pin;
use tracing::Level;

use crate::domain::BulkResponse;
use crate::error::{ClientError, ExportError};

/// Backend bulk API. Shared read-only by every bulk worker of a session.
pub trait BulkClient: Send + Sync {
    /// Send one NDJSON bulk body and return the per-item results.
    fn bulk(
        &self,
        body: Bytes,
    ) -> Pin<Box<dyn Future<Output = Result<BulkResponse, ClientError>> + Send + '_>>;

    /// Verify the backend is reachable.
    fn health_check(&self) -> Pin<Box<dyn Future<Output = Result<(), ClientError>> + Send + '_>>;
}

/// Logging capability handed to the backend client.
pub trait ClientLogger: Send + Sync {
    fn log(&self, level: Level, message: &str);
}

/// Anything that accepts a whole telemetry batch.
pub trait TraceBatchSink: Send + Sync {
    fn push_batch<'a>(
        &'a self,
        batch: &'a ExportTraceServiceRequest,
    ) -> Pin<Box<dyn Future<Output = Result<(), ExportError>> + Send + 'a>>;
}
