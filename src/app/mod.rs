mod router;
pub mod server;
pub mod tracing;

use crate::config;
use crate::error::AppError;
use crate::exporter::SsoTracesExporter;
use crate::port::TraceBatchSink;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub use router::router;

/// Application entry point. Initializes tracing and configuration, starts the
/// exporter and serves the OTLP receiver.
pub async fn run() -> Result<(), AppError> {
    // Handle healthcheck subcommand (for Docker healthcheck in distroless image)
    if std::env::args().nth(1).as_deref() == Some("healthcheck") {
        match crate::healthcheck().await {
            Ok(()) => std::process::exit(0),
            Err(e) => {
                eprintln!("Healthcheck failed: {e}");
                std::process::exit(1)
            }
        }
    }

    tracing::init_tracing();

    let settings = config::get_configuration()?;
    ::tracing::info!(
        index = %settings.index_name(),
        action = %settings.bulk_action,
        "Loaded settings"
    );

    let mut exporter = SsoTracesExporter::new(settings.clone())?;
    exporter.start()?;
    let sink: Arc<dyn TraceBatchSink> = Arc::new(exporter);

    server::serve(router(sink), settings.otlp_http_port, CancellationToken::new()).await
}
