use tracing::Level;

use crate::port::ClientLogger;

/// Forwards backend client log lines to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingClientLogger;

impl ClientLogger for TracingClientLogger {
    fn log(&self, level: Level, message: &str) {
        match level {
            Level::ERROR => tracing::error!("{message}"),
            Level::WARN => tracing::warn!("{message}"),
            Level::INFO => tracing::info!("{message}"),
            Level::DEBUG => tracing::debug!("{message}"),
            _ => tracing::trace!("{message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[traced_test]
    #[test]
    fn test_forwards_to_tracing() {
        TracingClientLogger.log(Level::WARN, "bulk request retried");
        TracingClientLogger.log(Level::DEBUG, "bulk request sent");

        assert!(logs_contain("bulk request retried"));
        assert!(logs_contain("bulk request sent"));
    }
}
