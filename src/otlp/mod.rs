//! OpenTelemetry Protocol (OTLP) HTTP intake

pub mod receiver;

pub use receiver::{OTLPState, otlp_routes};
