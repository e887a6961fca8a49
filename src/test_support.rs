//! Shared test support utilities
//!
//! `InMemoryBackend` stands in for OpenSearch behind the `BulkClient` port,
//! `RecordingSink` stands in for the exporter behind `TraceBatchSink`, and the
//! builders produce valid OTLP spans and batches.

use bytes::Bytes;
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use opentelemetry_proto::tonic::common::v1::{AnyValue, InstrumentationScope, KeyValue, any_value};
use opentelemetry_proto::tonic::resource::v1::Resource;
use opentelemetry_proto::tonic::trace::v1::{ResourceSpans, ScopeSpans, Span, Status, span, status};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use crate::config::Settings;
use crate::domain::{BulkItemResult, BulkResponse};
use crate::error::{ClientError, ExportError, IndexError, JoinedError};
use crate::exporter::span_count;
use crate::port::{BulkClient, TraceBatchSink};

/// In-memory bulk backend honouring create/index semantics.
pub struct InMemoryBackend {
    documents: Mutex<HashMap<(String, String), Value>>,
    rejected_ids: Mutex<HashSet<String>>,
    bulk_delay: Mutex<Option<Duration>>,
    bulk_calls: AtomicUsize,
    health_checks: AtomicUsize,
    failing_bulk_calls: AtomicUsize,
    healthy: AtomicBool,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            documents: Mutex::new(HashMap::new()),
            rejected_ids: Mutex::new(HashSet::new()),
            bulk_delay: Mutex::new(None),
            bulk_calls: AtomicUsize::new(0),
            health_checks: AtomicUsize::new(0),
            failing_bulk_calls: AtomicUsize::new(0),
            healthy: AtomicBool::new(true),
        }
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Fail the next `count` bulk requests with a connection error.
    pub fn fail_next_bulk_calls(&self, count: usize) {
        self.failing_bulk_calls.store(count, Ordering::SeqCst);
    }

    /// Delay every bulk request before it is processed.
    pub fn set_bulk_delay(&self, delay: Duration) {
        *self.bulk_delay.lock() = Some(delay);
    }

    /// Reject the document with this id as a mapping failure.
    pub fn reject_id(&self, id: impl Into<String>) {
        self.rejected_ids.lock().insert(id.into());
    }

    pub fn bulk_calls(&self) -> usize {
        self.bulk_calls.load(Ordering::SeqCst)
    }

    pub fn health_checks(&self) -> usize {
        self.health_checks.load(Ordering::SeqCst)
    }

    pub fn document_count(&self) -> usize {
        self.documents.lock().len()
    }

    pub fn document(&self, index: &str, id: &str) -> Option<Value> {
        self.documents
            .lock()
            .get(&(index.to_string(), id.to_string()))
            .cloned()
    }

    fn apply(&self, body: &[u8]) -> Result<BulkResponse, ClientError> {
        let text =
            std::str::from_utf8(body).map_err(|e| ClientError::InvalidResponse(e.to_string()))?;
        let mut lines = text.lines();
        let mut items = Vec::new();
        let mut documents = self.documents.lock();
        let rejected_ids = self.rejected_ids.lock();

        while let Some(action_line) = lines.next() {
            let document_line = lines
                .next()
                .ok_or_else(|| ClientError::HttpError {
                    status: 400,
                    message: "action line without document".to_string(),
                })?;

            let action: Value = serde_json::from_str(action_line).map_err(|e| {
                ClientError::HttpError {
                    status: 400,
                    message: e.to_string(),
                }
            })?;
            let (op, meta) = action
                .as_object()
                .and_then(|m| m.iter().next())
                .ok_or_else(|| ClientError::HttpError {
                    status: 400,
                    message: "empty action line".to_string(),
                })?;
            let index = meta["_index"].as_str().unwrap_or_default().to_string();
            let id = meta["_id"].as_str().unwrap_or_default().to_string();

            let Ok(document) = serde_json::from_str::<Value>(document_line) else {
                items.push(BulkItemResult::rejected(
                    id,
                    400,
                    "mapper_parsing_exception",
                    "failed to parse document",
                ));
                continue;
            };

            if rejected_ids.contains(&id) {
                items.push(BulkItemResult::rejected(
                    id,
                    400,
                    "mapper_parsing_exception",
                    "rejected by test backend",
                ));
                continue;
            }

            let key = (index, id.clone());
            let item = match op.as_str() {
                "create" if documents.contains_key(&key) => BulkItemResult::rejected(
                    id,
                    409,
                    "version_conflict_engine_exception",
                    "document already exists",
                ),
                "create" => {
                    documents.insert(key, document);
                    BulkItemResult::accepted(id, 201)
                }
                "index" => {
                    let status = if documents.insert(key, document).is_some() {
                        200
                    } else {
                        201
                    };
                    BulkItemResult::accepted(id, status)
                }
                other => BulkItemResult::rejected(
                    id,
                    400,
                    "illegal_argument_exception",
                    format!("unknown bulk operation {other}"),
                ),
            };
            items.push(item);
        }

        Ok(BulkResponse { items })
    }
}

impl BulkClient for InMemoryBackend {
    fn bulk(
        &self,
        body: Bytes,
    ) -> Pin<Box<dyn Future<Output = Result<BulkResponse, ClientError>> + Send + '_>> {
        Box::pin(async move {
            self.bulk_calls.fetch_add(1, Ordering::SeqCst);

            let delay = *self.bulk_delay.lock();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            let inject_failure = self
                .failing_bulk_calls
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if inject_failure {
                return Err(ClientError::ConnectionFailed(
                    "injected bulk failure".to_string(),
                ));
            }

            self.apply(&body)
        })
    }

    fn health_check(&self) -> Pin<Box<dyn Future<Output = Result<(), ClientError>> + Send + '_>> {
        Box::pin(async move {
            self.health_checks.fetch_add(1, Ordering::SeqCst);
            if self.healthy.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(ClientError::ConnectionFailed(
                    "backend unavailable".to_string(),
                ))
            }
        })
    }
}

/// What a `RecordingSink` answers to every push.
#[derive(Debug, Clone)]
pub enum SinkBehavior {
    Accept,
    /// Report the given number of documents as rejected.
    Reject(usize),
    Unavailable,
}

/// `TraceBatchSink` that records pushed spans.
pub struct RecordingSink {
    behavior: Mutex<SinkBehavior>,
    pushes: AtomicUsize,
    spans: AtomicUsize,
}

impl Default for RecordingSink {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingSink {
    pub fn new() -> Self {
        Self {
            behavior: Mutex::new(SinkBehavior::Accept),
            pushes: AtomicUsize::new(0),
            spans: AtomicUsize::new(0),
        }
    }

    pub fn set_behavior(&self, behavior: SinkBehavior) {
        *self.behavior.lock() = behavior;
    }

    pub fn pushes(&self) -> usize {
        self.pushes.load(Ordering::SeqCst)
    }

    pub fn spans(&self) -> usize {
        self.spans.load(Ordering::SeqCst)
    }
}

impl TraceBatchSink for RecordingSink {
    fn push_batch<'a>(
        &'a self,
        batch: &'a ExportTraceServiceRequest,
    ) -> Pin<Box<dyn Future<Output = Result<(), ExportError>> + Send + 'a>> {
        let behavior = self.behavior.lock().clone();
        Box::pin(async move {
            self.pushes.fetch_add(1, Ordering::SeqCst);
            self.spans.fetch_add(span_count(batch), Ordering::SeqCst);
            match behavior {
                SinkBehavior::Accept => Ok(()),
                SinkBehavior::Reject(documents) => {
                    let errors = (0..documents)
                        .map(|i| IndexError::DocumentRejected {
                            id: format!("doc-{i}"),
                            status: 409,
                            kind: "version_conflict_engine_exception".to_string(),
                            reason: "document already exists".to_string(),
                        })
                        .collect();
                    match JoinedError::from_errors(errors) {
                        Some(joined) => Err(ExportError::Indexing(joined)),
                        None => Ok(()),
                    }
                }
                SinkBehavior::Unavailable => {
                    Err(ExportError::Connection("backend unavailable".to_string()))
                }
            }
        })
    }
}

/// Settings pointing at a local endpoint, with defaults otherwise.
pub fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.client.endpoint = "http://localhost:9200".to_string();
    settings
}

pub fn string_kv(key: &str, value: &str) -> KeyValue {
    KeyValue {
        key: key.to_string(),
        value: Some(AnyValue {
            value: Some(any_value::Value::StringValue(value.to_string())),
        }),
    }
}

/// A valid server span whose trace id and span id are unique per `n`.
pub fn test_span(n: u64) -> Span {
    let mut trace_id = vec![0xab; 16];
    trace_id[8..].copy_from_slice(&n.to_be_bytes());

    Span {
        trace_id,
        span_id: (n + 1).to_be_bytes().to_vec(),
        trace_state: String::new(),
        parent_span_id: vec![],
        flags: 0,
        name: format!("span-{n}"),
        kind: span::SpanKind::Server as i32,
        start_time_unix_nano: 1_700_000_000_000_000_000 + n,
        end_time_unix_nano: 1_700_000_000_100_000_000 + n,
        attributes: vec![string_kv("http.method", "GET")],
        dropped_attributes_count: 0,
        events: vec![],
        dropped_events_count: 0,
        links: vec![],
        dropped_links_count: 0,
        status: Some(Status {
            message: String::new(),
            code: status::StatusCode::Ok as i32,
        }),
    }
}

/// One resource and one scope holding `spans`.
pub fn batch(spans: Vec<Span>) -> ExportTraceServiceRequest {
    ExportTraceServiceRequest {
        resource_spans: vec![ResourceSpans {
            resource: Some(Resource {
                attributes: vec![string_kv("service.name", "test-service")],
                dropped_attributes_count: 0,
                entity_refs: vec![],
            }),
            scope_spans: vec![ScopeSpans {
                scope: Some(InstrumentationScope {
                    name: "test-scope".to_string(),
                    version: "1.0.0".to_string(),
                    attributes: vec![],
                    dropped_attributes_count: 0,
                }),
                spans,
                schema_url: String::new(),
            }],
            schema_url: String::new(),
        }],
    }
}

/// Batch of `count` distinct valid spans.
pub fn batch_of(count: u64) -> ExportTraceServiceRequest {
    batch((0..count).map(test_span).collect())
}
