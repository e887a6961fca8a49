use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, ClientBuilder, RequestBuilder};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Level;
use url::Url;

use super::bulk::parse_bulk_response;
use super::logger::TracingClientLogger;
use super::stats::{ClientStats, ClientStatsSnapshot};
use crate::config::ClientSettings;
use crate::domain::BulkResponse;
use crate::error::ClientError;
use crate::port::{BulkClient, ClientLogger};

const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";
const USER_AGENT: &str = concat!("ss4o-trace-exporter/", env!("CARGO_PKG_VERSION"));
/// Longest error body kept in an `HttpError` message.
const MAX_ERROR_BODY: usize = 512;

/// reqwest-backed client for the OpenSearch `_bulk` API.
pub struct OpenSearchClient {
    client: Client,
    base_url: Url,
    bulk_url: Url,
    username: Option<String>,
    password: Option<String>,
    max_retries: u32,
    retry_backoff: Duration,
    stats: Option<Arc<ClientStats>>,
    logger: Option<Arc<dyn ClientLogger>>,
}

impl OpenSearchClient {
    pub fn new(settings: &ClientSettings) -> Result<Self, ClientError> {
        let mut base_url: Url = settings
            .endpoint
            .parse()
            .map_err(|e| ClientError::InvalidConfiguration(format!("Invalid endpoint URL: {e}")))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let bulk_url = base_url
            .join("_bulk")
            .map_err(|e| ClientError::InvalidConfiguration(format!("Invalid bulk URL: {e}")))?;

        let client = ClientBuilder::new()
            .timeout(settings.request_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| {
                ClientError::InvalidConfiguration(format!("Failed to build HTTP client: {e}"))
            })?;

        let stats = settings
            .enable_metrics
            .then(|| Arc::new(ClientStats::default()));
        let logger: Option<Arc<dyn ClientLogger>> = if settings.enable_debug_logger {
            Some(Arc::new(TracingClientLogger))
        } else {
            None
        };

        Ok(Self {
            client,
            base_url,
            bulk_url,
            username: settings.username.clone(),
            password: settings.password.clone(),
            max_retries: settings.max_retries,
            retry_backoff: settings.retry_backoff,
            stats,
            logger,
        })
    }

    /// Replace the client logger. Enables logging even when the debug logger
    /// is disabled in settings.
    #[must_use]
    pub fn with_logger(mut self, logger: Arc<dyn ClientLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn bulk_url(&self) -> &Url {
        &self.bulk_url
    }

    /// Request counters, when metrics are enabled.
    pub fn stats(&self) -> Option<ClientStatsSnapshot> {
        self.stats.as_ref().map(|s| s.snapshot())
    }

    fn log(&self, level: Level, message: impl FnOnce() -> String) {
        if let Some(logger) = &self.logger {
            logger.log(level, &message());
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.username {
            Some(username) => request.basic_auth(username, self.password.as_deref()),
            None => request,
        }
    }

    async fn send_bulk(&self, body: Bytes) -> Result<BulkResponse, ClientError> {
        let mut attempt: u32 = 0;
        loop {
            match self.send_bulk_once(body.clone()).await {
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let delay = self
                        .retry_backoff
                        .saturating_mul(2u32.saturating_pow(attempt));
                    self.log(Level::WARN, || {
                        format!(
                            "bulk request failed on attempt {}: {e}; retrying in {}ms",
                            attempt + 1,
                            delay.as_millis()
                        )
                    });
                    if let Some(stats) = &self.stats {
                        stats.record_retry();
                    }
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn send_bulk_once(&self, body: Bytes) -> Result<BulkResponse, ClientError> {
        let started = Instant::now();
        let bytes = body.len() as u64;

        let request = self
            .authorize(self.client.post(self.bulk_url.clone()))
            .header(CONTENT_TYPE, NDJSON_CONTENT_TYPE)
            .body(body);

        let result = async {
            let response = request.send().await.map_err(classify)?;
            let status = response.status();
            let payload = response.bytes().await.map_err(classify)?;

            if !status.is_success() {
                return Err(ClientError::HttpError {
                    status: status.as_u16(),
                    message: truncate(&String::from_utf8_lossy(&payload)),
                });
            }
            parse_bulk_response(&payload)
        }
        .await;

        let elapsed = started.elapsed();
        if let Some(stats) = &self.stats {
            stats.record_request(result.is_ok(), bytes, elapsed);
        }
        self.log(Level::DEBUG, || match &result {
            Ok(response) => format!(
                "POST {} sent {bytes} bytes, {} items in {}ms",
                self.bulk_url,
                response.items.len(),
                elapsed.as_millis()
            ),
            Err(e) => format!("POST {} failed after {}ms: {e}", self.bulk_url, elapsed.as_millis()),
        });

        result
    }

    async fn ping(&self) -> Result<(), ClientError> {
        let response = self
            .authorize(self.client.get(self.base_url.clone()))
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        self.log(Level::DEBUG, || format!("GET {} returned {status}", self.base_url));

        if status.is_success() {
            Ok(())
        } else {
            Err(ClientError::HttpError {
                status: status.as_u16(),
                message: format!("Health check failed: {status}"),
            })
        }
    }
}

impl BulkClient for OpenSearchClient {
    fn bulk(
        &self,
        body: Bytes,
    ) -> Pin<Box<dyn Future<Output = Result<BulkResponse, ClientError>> + Send + '_>> {
        Box::pin(self.send_bulk(body))
    }

    fn health_check(&self) -> Pin<Box<dyn Future<Output = Result<(), ClientError>> + Send + '_>> {
        Box::pin(self.ping())
    }
}

fn classify(e: reqwest::Error) -> ClientError {
    if e.is_timeout() {
        ClientError::RequestTimeout(e.to_string())
    } else if e.is_connect() {
        ClientError::ConnectionFailed(e.to_string())
    } else {
        ClientError::NetworkError(e)
    }
}

fn truncate(message: &str) -> String {
    match message.char_indices().nth(MAX_ERROR_BODY) {
        Some((end, _)) => format!("{}...", &message[..end]),
        None => message.to_string(),
    }
}
