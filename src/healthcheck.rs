//! `ss4o-trace-exporter healthcheck`: probe the local receiver from inside a
//! distroless container, where no curl is available.

use std::time::Duration;
use thiserror::Error;

const DEFAULT_OTLP_HTTP_PORT: u16 = 4318;
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Error, Debug)]
pub enum HealthcheckError {
    #[error("Failed to build probe client: {0}")]
    Client(reqwest::Error),
    #[error("Health endpoint unreachable: {0}")]
    Unreachable(reqwest::Error),
    #[error("Health endpoint returned status: {0}")]
    Status(reqwest::StatusCode),
}

/// Probe the receiver on `OTLP_HTTP_PORT`, or 4318 when unset or invalid.
pub async fn healthcheck() -> Result<(), HealthcheckError> {
    let port = std::env::var("OTLP_HTTP_PORT")
        .ok()
        .and_then(|p| p.trim().parse().ok())
        .unwrap_or(DEFAULT_OTLP_HTTP_PORT);
    healthcheck_with_port(port).await
}

pub async fn healthcheck_with_port(port: u16) -> Result<(), HealthcheckError> {
    let client = reqwest::Client::builder()
        .timeout(PROBE_TIMEOUT)
        .build()
        .map_err(HealthcheckError::Client)?;

    let status = client
        .get(format!("http://127.0.0.1:{port}/v1/health"))
        .send()
        .await
        .map_err(HealthcheckError::Unreachable)?
        .status();

    if status.is_success() {
        Ok(())
    } else {
        Err(HealthcheckError::Status(status))
    }
}
