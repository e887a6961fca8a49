use crate::handler::health::health_handler;
use crate::otlp::{OTLPState, otlp_routes};
use crate::port::TraceBatchSink;
use axum::Router;
use axum::routing::get;
use std::sync::Arc;

/// Build the HTTP router: health check plus OTLP traces intake.
pub fn router(sink: Arc<dyn TraceBatchSink>) -> Router {
    let v1_health_router = Router::new().route("/v1/health", get(health_handler));

    Router::new()
        .merge(v1_health_router)
        .merge(otlp_routes(OTLPState { sink }))
}
