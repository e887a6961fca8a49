pub mod bulk;
pub mod client;
pub mod logger;
pub mod stats;

pub use bulk::parse_bulk_response;
pub use client::OpenSearchClient;
pub use logger::TracingClientLogger;
pub use stats::{ClientStats, ClientStatsSnapshot};
