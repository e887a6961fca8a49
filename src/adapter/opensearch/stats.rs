//! Lock-free request counters for the OpenSearch client.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct ClientStats {
    total_requests: AtomicU64,
    successful_requests: AtomicU64,
    failed_requests: AtomicU64,
    retried_requests: AtomicU64,
    bytes_sent: AtomicU64,
    total_response_time_ms: AtomicU64,
}

/// Point-in-time copy of [`ClientStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClientStatsSnapshot {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub retried_requests: u64,
    pub bytes_sent: u64,
    pub average_response_time: Duration,
}

impl ClientStats {
    pub fn record_request(&self, success: bool, bytes: u64, response_time: Duration) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
        self.total_response_time_ms.fetch_add(
            u64::try_from(response_time.as_millis()).unwrap_or(u64::MAX),
            Ordering::Relaxed,
        );

        if success {
            self.successful_requests.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_retry(&self) {
        self.retried_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ClientStatsSnapshot {
        let total_requests = self.total_requests.load(Ordering::Relaxed);
        let total_response_time = self.total_response_time_ms.load(Ordering::Relaxed);

        let average_response_time = if total_requests > 0 {
            Duration::from_millis(total_response_time / total_requests)
        } else {
            Duration::ZERO
        };

        ClientStatsSnapshot {
            total_requests,
            successful_requests: self.successful_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            retried_requests: self.retried_requests.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            average_response_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_aggregates_requests() {
        let stats = ClientStats::default();
        stats.record_request(true, 100, Duration::from_millis(10));
        stats.record_request(false, 50, Duration::from_millis(30));
        stats.record_retry();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total_requests, 2);
        assert_eq!(snapshot.successful_requests, 1);
        assert_eq!(snapshot.failed_requests, 1);
        assert_eq!(snapshot.retried_requests, 1);
        assert_eq!(snapshot.bytes_sent, 150);
        assert_eq!(snapshot.average_response_time, Duration::from_millis(20));
    }

    #[test]
    fn test_empty_snapshot() {
        assert_eq!(ClientStats::default().snapshot(), ClientStatsSnapshot::default());
    }
}
