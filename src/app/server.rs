use std::net::SocketAddr;

use axum::Router;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::AppError;

/// Serve the OTLP receiver until a shutdown signal arrives or `shutdown_token`
/// is cancelled. In-flight pushes finish before this returns.
pub async fn serve(
    app: Router,
    otlp_http_port: u16,
    shutdown_token: CancellationToken,
) -> Result<(), AppError> {
    let address = SocketAddr::from(([0, 0, 0, 0], otlp_http_port));
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .map_err(|source| AppError::Bind {
            address: address.to_string(),
            source,
        })?;
    info!(address = %listener.local_addr()?, "OTLP HTTP receiver listening");

    let token = shutdown_token.clone();
    tokio::spawn(async move {
        tokio::select! {
            signal = shutdown_signal() => {
                info!(signal, "Shutdown signal received");
                token.cancel();
            }
            () = token.cancelled() => {}
        }
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_token.cancelled_owned())
        .await?;

    info!("OTLP HTTP receiver stopped");
    Ok(())
}

/// Resolves with the name of the first SIGINT/SIGTERM received.
async fn shutdown_signal() -> &'static str {
    tokio::select! {
        () = interrupt() => "SIGINT",
        () = terminate() => "SIGTERM",
    }
}

async fn interrupt() {
    if let Err(e) = signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for SIGINT");
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn terminate() {
    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(e) => {
            warn!(error = %e, "Failed to listen for SIGTERM");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingSink;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_serve_stops_when_token_is_cancelled() {
        let token = CancellationToken::new();
        let app = crate::app::router(Arc::new(RecordingSink::new()));

        let server = tokio::spawn(serve(app, 0, token.clone()));
        token.cancel();

        let result = tokio::time::timeout(std::time::Duration::from_secs(5), server)
            .await
            .expect("server should stop")
            .expect("server task should not panic");
        assert!(result.is_ok());
    }
}
