//! Span → SS4O trace document encoding.
//!
//! Encoding is pure: the same span with the same resource and scope always
//! produces the same document id and byte-identical body.

mod attributes;
mod ids;

pub use attributes::flatten_attributes;
use attributes::string_attribute;
pub use ids::{document_id, parent_span_id_hex, span_id_hex, trace_id_hex};

use chrono::{DateTime, SecondsFormat};
use opentelemetry_proto::tonic::common::v1::InstrumentationScope;
use opentelemetry_proto::tonic::trace::v1::{ResourceSpans, ScopeSpans, Span, span, status};
use serde::Serialize;
use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::config::Settings;
use crate::domain::{SpanDocument, TimestampFormat};

const SERVICE_NAME_KEY: &str = "service.name";
const DATA_STREAM_KEY: &str = "data_stream";
const DATA_STREAM_TYPE: &str = "span";

/// Structural corruption that prevents a span from being encoded.
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("invalid trace id: {0}")]
    InvalidTraceId(String),

    #[error("invalid span id: {0}")]
    InvalidSpanId(String),

    #[error("invalid parent span id: {0}")]
    InvalidParentSpanId(String),

    #[error("failed to serialize document: {0}")]
    Json(#[from] serde_json::Error),
}

/// Resource-level fields shared by every span of one `ResourceSpans`.
#[derive(Debug, Clone, Default)]
pub struct ResourceContext {
    attributes: Map<String, Value>,
    service_name: Option<String>,
    schema_url: String,
}

impl ResourceContext {
    pub fn from_resource_spans(resource_spans: &ResourceSpans) -> Self {
        let attributes = resource_spans
            .resource
            .as_ref()
            .map(|r| flatten_attributes(&r.attributes))
            .unwrap_or_default();
        let service_name =
            string_attribute(&attributes, SERVICE_NAME_KEY).map(str::to_string);

        Self {
            attributes,
            service_name,
            schema_url: resource_spans.schema_url.clone(),
        }
    }

    pub fn service_name(&self) -> Option<&str> {
        self.service_name.as_deref()
    }
}

/// Instrumentation scope fields shared by every span of one `ScopeSpans`.
#[derive(Debug, Clone, Default)]
pub struct ScopeContext {
    name: String,
    version: String,
    attributes: Map<String, Value>,
    dropped_attributes_count: u32,
    schema_url: String,
}

impl ScopeContext {
    pub fn from_scope_spans(scope_spans: &ScopeSpans) -> Self {
        let mut ctx = scope_spans
            .scope
            .as_ref()
            .map(Self::from_scope)
            .unwrap_or_default();
        ctx.schema_url = scope_spans.schema_url.clone();
        ctx
    }

    fn from_scope(scope: &InstrumentationScope) -> Self {
        Self {
            name: scope.name.clone(),
            version: scope.version.clone(),
            attributes: flatten_attributes(&scope.attributes),
            dropped_attributes_count: scope.dropped_attributes_count,
            schema_url: String::new(),
        }
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum Timestamp {
    Millis(i64),
    Formatted(String),
}

#[derive(Serialize)]
struct StatusDoc<'a> {
    code: &'static str,
    #[serde(skip_serializing_if = "is_empty")]
    message: &'a str,
}

#[derive(Serialize)]
struct ScopeDoc<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "is_empty")]
    version: &'a str,
    #[serde(rename = "schemaUrl", skip_serializing_if = "is_empty")]
    schema_url: &'a str,
    #[serde(skip_serializing_if = "is_empty_map")]
    attributes: &'a Map<String, Value>,
    #[serde(rename = "droppedAttributesCount")]
    dropped_attributes_count: u32,
}

#[derive(Serialize)]
struct EventDoc<'a> {
    #[serde(rename = "@timestamp")]
    timestamp: Timestamp,
    name: &'a str,
    attributes: Map<String, Value>,
    #[serde(rename = "droppedAttributesCount")]
    dropped_attributes_count: u32,
}

#[derive(Serialize)]
struct LinkDoc<'a> {
    #[serde(rename = "traceId")]
    trace_id: String,
    #[serde(rename = "spanId")]
    span_id: String,
    #[serde(rename = "traceState")]
    trace_state: &'a str,
    attributes: Map<String, Value>,
    #[serde(rename = "droppedAttributesCount")]
    dropped_attributes_count: u32,
}

#[derive(Serialize)]
struct SpanDoc<'a> {
    #[serde(rename = "@timestamp")]
    timestamp: Timestamp,
    #[serde(rename = "startTime")]
    start_time: Timestamp,
    #[serde(rename = "endTime")]
    end_time: Timestamp,
    #[serde(rename = "durationInNanos")]
    duration_in_nanos: u64,
    #[serde(rename = "traceId")]
    trace_id: &'a str,
    #[serde(rename = "spanId")]
    span_id: &'a str,
    #[serde(rename = "parentSpanId")]
    parent_span_id: &'a str,
    #[serde(rename = "traceState")]
    trace_state: &'a str,
    name: &'a str,
    kind: &'static str,
    status: StatusDoc<'a>,
    attributes: Map<String, Value>,
    resource: &'a Map<String, Value>,
    #[serde(rename = "serviceName", skip_serializing_if = "Option::is_none")]
    service_name: Option<&'a str>,
    #[serde(rename = "instrumentationScope")]
    instrumentation_scope: ScopeDoc<'a>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    events: Vec<EventDoc<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    links: Vec<LinkDoc<'a>>,
    #[serde(rename = "droppedAttributesCount")]
    dropped_attributes_count: u32,
    #[serde(rename = "droppedEventsCount")]
    dropped_events_count: u32,
    #[serde(rename = "droppedLinksCount")]
    dropped_links_count: u32,
    #[serde(rename = "schemaUrl", skip_serializing_if = "is_empty")]
    schema_url: &'a str,
}

fn is_empty(s: &&str) -> bool {
    s.is_empty()
}

fn is_empty_map(map: &&Map<String, Value>) -> bool {
    map.is_empty()
}

/// Encodes spans into SS4O trace documents for one index.
#[derive(Debug, Clone)]
pub struct EncodeModel {
    index: String,
    dataset: String,
    namespace: String,
    timestamp_format: TimestampFormat,
}

impl EncodeModel {
    pub fn new(
        index: impl Into<String>,
        dataset: impl Into<String>,
        namespace: impl Into<String>,
        timestamp_format: TimestampFormat,
    ) -> Self {
        Self {
            index: index.into(),
            dataset: dataset.into(),
            namespace: namespace.into(),
            timestamp_format,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.index_name(),
            settings.dataset.clone(),
            settings.namespace.clone(),
            settings.timestamp_format(),
        )
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    pub fn encode_span(
        &self,
        span: &Span,
        resource: &ResourceContext,
        scope: &ScopeContext,
    ) -> Result<SpanDocument, EncodeError> {
        let trace_id = trace_id_hex(&span.trace_id)?;
        let span_id = span_id_hex(&span.span_id)?;
        let parent_span_id = parent_span_id_hex(&span.parent_span_id)?;

        let mut attributes = flatten_attributes(&span.attributes);
        attributes.insert(
            DATA_STREAM_KEY.to_string(),
            json!({
                "type": DATA_STREAM_TYPE,
                "dataset": self.dataset,
                "namespace": self.namespace,
            }),
        );

        let (status_code, status_message) = span
            .status
            .as_ref()
            .map_or((status_code_name(0), ""), |s| {
                (status_code_name(s.code), s.message.as_str())
            });

        let schema_url = if resource.schema_url.is_empty() {
            scope.schema_url.as_str()
        } else {
            resource.schema_url.as_str()
        };

        let doc = SpanDoc {
            timestamp: self.timestamp(span.start_time_unix_nano),
            start_time: self.timestamp(span.start_time_unix_nano),
            end_time: self.timestamp(span.end_time_unix_nano),
            duration_in_nanos: span
                .end_time_unix_nano
                .saturating_sub(span.start_time_unix_nano),
            trace_id: &trace_id,
            span_id: &span_id,
            parent_span_id: &parent_span_id,
            trace_state: &span.trace_state,
            name: &span.name,
            kind: span_kind_name(span.kind),
            status: StatusDoc {
                code: status_code,
                message: status_message,
            },
            attributes,
            resource: &resource.attributes,
            service_name: resource.service_name(),
            instrumentation_scope: ScopeDoc {
                name: &scope.name,
                version: &scope.version,
                schema_url: &scope.schema_url,
                attributes: &scope.attributes,
                dropped_attributes_count: scope.dropped_attributes_count,
            },
            events: span
                .events
                .iter()
                .map(|event| EventDoc {
                    timestamp: self.timestamp(event.time_unix_nano),
                    name: &event.name,
                    attributes: flatten_attributes(&event.attributes),
                    dropped_attributes_count: event.dropped_attributes_count,
                })
                .collect(),
            links: span
                .links
                .iter()
                .map(|link| LinkDoc {
                    trace_id: hex::encode(&link.trace_id),
                    span_id: hex::encode(&link.span_id),
                    trace_state: &link.trace_state,
                    attributes: flatten_attributes(&link.attributes),
                    dropped_attributes_count: link.dropped_attributes_count,
                })
                .collect(),
            dropped_attributes_count: span.dropped_attributes_count,
            dropped_events_count: span.dropped_events_count,
            dropped_links_count: span.dropped_links_count,
            schema_url,
        };

        let body = serde_json::to_vec(&doc)?;

        Ok(SpanDocument {
            index: self.index.clone(),
            id: document_id(&trace_id, &span_id),
            body,
        })
    }

    fn timestamp(&self, unix_nanos: u64) -> Timestamp {
        match self.timestamp_format {
            TimestampFormat::UnixMillis => {
                Timestamp::Millis(i64::try_from(unix_nanos / 1_000_000).unwrap_or(i64::MAX))
            }
            TimestampFormat::Rfc3339 => {
                let nanos = i64::try_from(unix_nanos).unwrap_or(i64::MAX);
                Timestamp::Formatted(
                    DateTime::from_timestamp_nanos(nanos).to_rfc3339_opts(SecondsFormat::Nanos, true),
                )
            }
        }
    }
}

fn span_kind_name(kind: i32) -> &'static str {
    match span::SpanKind::try_from(kind) {
        Ok(span::SpanKind::Internal) => "Internal",
        Ok(span::SpanKind::Server) => "Server",
        Ok(span::SpanKind::Client) => "Client",
        Ok(span::SpanKind::Producer) => "Producer",
        Ok(span::SpanKind::Consumer) => "Consumer",
        Ok(span::SpanKind::Unspecified) | Err(_) => "Unspecified",
    }
}

fn status_code_name(code: i32) -> &'static str {
    match status::StatusCode::try_from(code) {
        Ok(status::StatusCode::Ok) => "Ok",
        Ok(status::StatusCode::Error) => "Error",
        Ok(status::StatusCode::Unset) | Err(_) => "Unset",
    }
}
