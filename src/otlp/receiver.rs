//! OTLP HTTP traces receiver
//!
//! Accepts `POST /v1/traces` (application/x-protobuf) and pushes the decoded
//! batch to a `TraceBatchSink`.

use std::sync::Arc;

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
    routing::post,
};
use opentelemetry_proto::tonic::collector::trace::v1::{
    ExportTracePartialSuccess, ExportTraceServiceRequest, ExportTraceServiceResponse,
};
use prost::Message;
use tracing::{error, info, instrument, warn};

use crate::error::ExportError;
use crate::exporter::span_count;
use crate::port::TraceBatchSink;

const PROTOBUF_CONTENT_TYPE: &str = "application/x-protobuf";

/// Application state for OTLP handlers
#[derive(Clone)]
pub struct OTLPState {
    pub sink: Arc<dyn TraceBatchSink>,
}

/// Create Axum router for the OTLP HTTP traces endpoint
pub fn otlp_routes(state: OTLPState) -> Router {
    Router::new()
        .route("/v1/traces", post(receive_traces_http))
        .with_state(state)
}

fn protobuf_response(status: StatusCode, body: Bytes) -> impl IntoResponse {
    (status, [(header::CONTENT_TYPE, PROTOBUF_CONTENT_TYPE)], body)
}

fn encode_response(response: &ExportTraceServiceResponse) -> Bytes {
    Bytes::from(response.encode_to_vec())
}

#[instrument(skip(state, body), fields(body_size = body.len()))]
async fn receive_traces_http(State(state): State<OTLPState>, body: Bytes) -> impl IntoResponse {
    let request = match ExportTraceServiceRequest::decode(body) {
        Ok(req) => req,
        Err(e) => {
            error!(error = %e, "Failed to decode OTLP traces request");
            return protobuf_response(StatusCode::BAD_REQUEST, Bytes::new());
        }
    };

    let spans = span_count(&request);
    if spans == 0 {
        return protobuf_response(
            StatusCode::OK,
            encode_response(&ExportTraceServiceResponse::default()),
        );
    }

    match state.sink.push_batch(&request).await {
        Ok(()) => {
            info!(count = spans, "Exported OTLP traces");
            protobuf_response(
                StatusCode::OK,
                encode_response(&ExportTraceServiceResponse::default()),
            )
        }
        Err(ExportError::Indexing(joined)) => {
            let rejected = joined.failed_documents();
            warn!(count = spans, rejected, "OTLP traces partially exported");
            let response = ExportTraceServiceResponse {
                partial_success: Some(ExportTracePartialSuccess {
                    rejected_spans: i64::try_from(rejected).unwrap_or(i64::MAX),
                    error_message: joined.to_string(),
                }),
            };
            protobuf_response(StatusCode::OK, encode_response(&response))
        }
        Err(e @ (ExportError::Connection(_) | ExportError::Config(_))) => {
            error!(error = %e, "Trace backend unavailable");
            protobuf_response(StatusCode::SERVICE_UNAVAILABLE, Bytes::new())
        }
        Err(e) => {
            error!(error = %e, "Failed to export traces");
            protobuf_response(StatusCode::INTERNAL_SERVER_ERROR, Bytes::new())
        }
    }
}
