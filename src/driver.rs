//! Per-push state machine: start the indexer, submit every span once, close,
//! and report the joined outcome.

use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use std::fmt;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{ExportError, IndexError};
use crate::indexer::{BulkIndexer, IndexSummary, IndexerSession};
use crate::model::{EncodeModel, ResourceContext, ScopeContext};
use crate::port::BulkClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    Started,
    Submitting,
    Closing,
    Done,
}

impl DriverState {
    fn as_str(self) -> &'static str {
        match self {
            DriverState::Idle => "idle",
            DriverState::Started => "started",
            DriverState::Submitting => "submitting",
            DriverState::Closing => "closing",
            DriverState::Done => "done",
        }
    }
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Drives exactly one batch through an indexer session.
pub struct BatchDriver {
    state: DriverState,
    model: EncodeModel,
    indexer: BulkIndexer,
    session: Option<IndexerSession>,
    summary: IndexSummary,
}

impl BatchDriver {
    pub fn new(model: EncodeModel, indexer: BulkIndexer) -> Self {
        Self {
            state: DriverState::Idle,
            model,
            indexer,
            session: None,
            summary: IndexSummary::default(),
        }
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Counts of the session, final once the driver is done.
    pub fn summary(&self) -> IndexSummary {
        self.session
            .as_ref()
            .map_or(self.summary, IndexerSession::summary)
    }

    /// Run the whole push: start, submit, close, finish.
    pub async fn run(
        mut self,
        client: Arc<dyn BulkClient>,
        batch: &ExportTraceServiceRequest,
        deadline: Instant,
    ) -> Result<(), ExportError> {
        self.start(client).await?;
        self.submit(batch, deadline).await?;
        self.close(deadline).await?;
        self.finish()
    }

    /// `Idle -> Started`. A failed start ends the driver without writes.
    pub async fn start(&mut self, client: Arc<dyn BulkClient>) -> Result<(), ExportError> {
        self.expect_state("start", &[DriverState::Idle])?;

        match self.indexer.start(client).await {
            Ok(session) => {
                self.session = Some(session);
                self.state = DriverState::Started;
                Ok(())
            }
            Err(e) => {
                self.state = DriverState::Done;
                Err(e)
            }
        }
    }

    /// `Started -> Submitting`. Encodes and adds every span of the batch once.
    /// Encoding failures are recorded and do not stop the iteration. Waiting
    /// for a bulk worker never extends past `deadline`.
    pub async fn submit(
        &mut self,
        batch: &ExportTraceServiceRequest,
        deadline: Instant,
    ) -> Result<usize, ExportError> {
        self.expect_state("submit", &[DriverState::Started])?;
        self.state = DriverState::Submitting;

        let session = self.session.as_mut().ok_or(ExportError::InvalidState {
            operation: "submit",
            state: DriverState::Submitting.as_str(),
        })?;

        let mut spans = 0;
        for resource_spans in &batch.resource_spans {
            let resource = ResourceContext::from_resource_spans(resource_spans);
            for scope_spans in &resource_spans.scope_spans {
                let scope = ScopeContext::from_scope_spans(scope_spans);
                for span in &scope_spans.spans {
                    spans += 1;
                    match self.model.encode_span(span, &resource, &scope) {
                        Ok(document) => session.add(document, deadline).await,
                        Err(e) => {
                            warn!(error = %e, span_name = %span.name, "Failed to encode span");
                            session.record_failure(IndexError::Encoding {
                                trace_id: hex::encode(&span.trace_id),
                                span_id: hex::encode(&span.span_id),
                                reason: e.to_string(),
                            });
                        }
                    }
                }
            }
        }

        debug!(spans, "Batch submitted");
        Ok(spans)
    }

    /// `Started | Submitting -> Closing -> Done`. A close timeout is part of
    /// the joined outcome, not an error of this call.
    pub async fn close(&mut self, deadline: Instant) -> Result<(), ExportError> {
        self.expect_state("close", &[DriverState::Started, DriverState::Submitting])?;
        self.state = DriverState::Closing;

        if let Some(session) = self.session.as_mut() {
            match session.close(deadline).await {
                Err(e) if e.documents() > 0 => {
                    warn!(error = %e, "Indexer session did not drain before the deadline");
                }
                _ => {}
            }
        }

        self.state = DriverState::Done;
        Ok(())
    }

    /// Report the joined outcome. Consumes the session; a second call fails.
    pub fn finish(&mut self) -> Result<(), ExportError> {
        self.expect_state("finish", &[DriverState::Done])?;

        let session = self.session.take().ok_or(ExportError::InvalidState {
            operation: "finish",
            state: "finished",
        })?;
        self.summary = session.summary();
        session.joined_error().map_err(ExportError::from)
    }

    fn expect_state(
        &self,
        operation: &'static str,
        allowed: &[DriverState],
    ) -> Result<(), ExportError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(ExportError::InvalidState {
                operation,
                state: self.state.as_str(),
            })
        }
    }
}
