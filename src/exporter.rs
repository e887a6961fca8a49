use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{info, instrument, warn};

use crate::adapter::opensearch::OpenSearchClient;
use crate::config::Settings;
use crate::driver::BatchDriver;
use crate::error::ExportError;
use crate::indexer::BulkIndexer;
use crate::model::EncodeModel;
use crate::port::{BulkClient, TraceBatchSink};

/// Writes OTLP trace batches to an SS4O trace index.
pub struct SsoTracesExporter {
    settings: Settings,
    model: EncodeModel,
    client: Option<Arc<dyn BulkClient>>,
}

impl SsoTracesExporter {
    /// Validate settings. No I/O happens until [`start`](Self::start).
    pub fn new(settings: Settings) -> Result<Self, ExportError> {
        settings.validate()?;
        let model = EncodeModel::from_settings(&settings);
        Ok(Self {
            settings,
            model,
            client: None,
        })
    }

    /// Build an exporter around an existing backend client. It is ready to
    /// push without calling `start`.
    pub fn with_client(settings: Settings, client: Arc<dyn BulkClient>) -> Result<Self, ExportError> {
        let mut exporter = Self::new(settings)?;
        exporter.client = Some(client);
        Ok(exporter)
    }

    /// Build the OpenSearch client. Calling it again keeps the existing client.
    pub fn start(&mut self) -> Result<(), ExportError> {
        if self.client.is_some() {
            return Ok(());
        }

        let client = OpenSearchClient::new(&self.settings.client)
            .map_err(|e| ExportError::Connection(e.to_string()))?;
        info!(
            endpoint = %self.settings.client.endpoint,
            index = %self.model.index(),
            action = %self.settings.bulk_action,
            "SS4O traces exporter started"
        );
        self.client = Some(Arc::new(client));
        Ok(())
    }

    pub fn index_name(&self) -> &str {
        self.model.index()
    }

    /// Push a batch with a deadline of `push_timeout` from now.
    pub async fn push_batch(&self, batch: &ExportTraceServiceRequest) -> Result<(), ExportError> {
        let deadline = Instant::now() + self.settings.push_timeout;
        self.push_batch_until(batch, deadline).await
    }

    /// Index every span of `batch` exactly once, finishing by `deadline`.
    #[instrument(skip_all, fields(index = %self.model.index()))]
    pub async fn push_batch_until(
        &self,
        batch: &ExportTraceServiceRequest,
        deadline: Instant,
    ) -> Result<(), ExportError> {
        let client = self.client.clone().ok_or(ExportError::InvalidState {
            operation: "push a batch",
            state: "not started",
        })?;

        let spans = span_count(batch);
        if spans == 0 {
            return Ok(());
        }

        let indexer = BulkIndexer::new(
            self.model.index(),
            self.settings.bulk_action,
            self.settings.indexer,
        );
        let result = BatchDriver::new(self.model.clone(), indexer)
            .run(client, batch, deadline)
            .await;

        match &result {
            Ok(()) => info!(spans, "Indexed trace batch"),
            Err(ExportError::Indexing(joined)) => warn!(
                spans,
                failed = joined.failed_documents(),
                error = %joined,
                "Trace batch partially indexed"
            ),
            Err(e) => warn!(spans, error = %e, "Trace batch push failed"),
        }
        result
    }
}

impl TraceBatchSink for SsoTracesExporter {
    fn push_batch<'a>(
        &'a self,
        batch: &'a ExportTraceServiceRequest,
    ) -> Pin<Box<dyn Future<Output = Result<(), ExportError>> + Send + 'a>> {
        Box::pin(SsoTracesExporter::push_batch(self, batch))
    }
}

/// Total number of spans in a batch.
pub fn span_count(batch: &ExportTraceServiceRequest) -> usize {
    batch
        .resource_spans
        .iter()
        .flat_map(|rs| &rs.scope_spans)
        .map(|ss| ss.spans.len())
        .sum()
}
